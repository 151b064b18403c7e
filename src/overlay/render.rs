use super::store::{BoxStore, DetectionStatus};
use super::surface::{Color, DrawOp, OverlaySurface};
use crate::Rect;

/// Per-tick interpolation factor while smoothing is on.
pub const SMOOTHING_FACTOR: f32 = 0.2;

const LINE_WIDTH: f32 = 3.0;
const CORNER_RADIUS: f32 = 10.0;
const LABEL_FONT_PX: f32 = 14.0;
const LABEL_HEIGHT: f32 = 20.0;
const LABEL_PAD: f32 = 8.0;
const LABEL_ALPHA: f32 = 0.95;
const LABEL_MIN_BASELINE: f32 = 20.0;
const TEXT_COLOR: Color = Color::rgb(255, 255, 255);

/// Stroke and fill for one detection status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxStyle {
    pub stroke: Color,
    pub fill: Color,
}

pub fn style_for(status: DetectionStatus) -> BoxStyle {
    match status {
        DetectionStatus::Marked | DetectionStatus::Existing => BoxStyle {
            stroke: Color::rgb(22, 163, 74),
            fill: Color::rgba(16, 163, 127, 20),
        },
        DetectionStatus::LivenessFailed => BoxStyle {
            stroke: Color::rgb(245, 158, 11),
            fill: Color::rgba(245, 158, 11, 20),
        },
        DetectionStatus::Unknown => BoxStyle {
            stroke: Color::rgb(239, 68, 68),
            fill: Color::rgba(239, 68, 68, 31),
        },
    }
}

/// Where a label pill and its text go.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelLayout {
    pub pill: Rect,
    pub text_origin: (f32, f32),
}

/// Place the label above the box, kept inside a surface `surface_width` wide.
///
/// The pill never rises above the top edge and is shifted left when it would
/// run past the right edge.
pub fn label_layout(rect: &Rect, text_width: f32, surface_width: f32) -> LabelLayout {
    let label_x = rect.x + 6.0;
    let baseline = (rect.y - 10.0).max(LABEL_MIN_BASELINE);
    let mut pill = Rect::new(
        label_x - 4.0,
        baseline - LABEL_HEIGHT + 6.0,
        text_width + LABEL_PAD * 2.0,
        LABEL_HEIGHT,
    );
    let mut text_x = label_x + LABEL_PAD;

    let overflow = pill.x + pill.w - surface_width;
    let shift = if overflow > 0.0 { overflow.min(pill.x.max(0.0)) } else { 0.0 };
    let underflow = if pill.x - shift < 0.0 { -(pill.x - shift) } else { 0.0 };
    pill.x += underflow - shift;
    text_x += underflow - shift;

    LabelLayout {
        pill,
        text_origin: (text_x, baseline + 2.0),
    }
}

/// Per-display-frame painter for the box store.
///
/// Each tick interpolates every box toward its target and repaints the
/// surface from scratch. A missing surface (for instance while the video is
/// still negotiating its size) only skips painting.
#[derive(Debug)]
pub struct OverlayRenderer {
    smoothing: bool,
    ticks: u64,
}

impl OverlayRenderer {
    pub fn new(smoothing: bool) -> Self {
        Self { smoothing, ticks: 0 }
    }

    pub fn smoothing(&self) -> bool {
        self.smoothing
    }

    pub fn set_smoothing(&mut self, smoothing: bool) {
        self.smoothing = smoothing;
    }

    pub fn factor(&self) -> f32 {
        if self.smoothing {
            SMOOTHING_FACTOR
        } else {
            1.0
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// One render tick. Returns the number of boxes painted.
    pub fn tick(&mut self, store: &mut BoxStore, surface: Option<&mut dyn OverlaySurface>) -> usize {
        self.ticks += 1;
        store.interpolate(self.factor());

        let Some(surface) = surface else {
            return 0;
        };
        surface.clear();
        let (width, _) = surface.size();
        let mut painted = 0;
        for b in store.iter() {
            let rect = b.current();
            let style = style_for(b.status());
            surface.draw(DrawOp::RoundedRect {
                rect,
                radius: CORNER_RADIUS,
                fill: Some(style.fill),
                stroke: Some((style.stroke, LINE_WIDTH)),
            });

            let text = if b.name().is_empty() { "Unknown" } else { b.name() };
            let text_width = surface.measure_text(text, LABEL_FONT_PX);
            let layout = label_layout(&rect, text_width, width as f32);
            surface.draw(DrawOp::RoundedRect {
                rect: layout.pill,
                radius: CORNER_RADIUS,
                fill: Some(style.stroke.with_alpha(LABEL_ALPHA)),
                stroke: None,
            });
            surface.draw(DrawOp::Text {
                origin: layout.text_origin,
                text: text.to_string(),
                font_px: LABEL_FONT_PX,
                color: TEXT_COLOR,
            });
            painted += 1;
        }
        painted
    }
}
