use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use std::path::Path;

use super::glyphs;
use crate::Rect;

/// 8-bit RGBA colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same colour with its alpha scaled by `alpha` (0..=1).
    pub fn with_alpha(self, alpha: f32) -> Self {
        let a = (self.a as f32 * alpha.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

/// One drawing instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    RoundedRect {
        rect: Rect,
        radius: f32,
        fill: Option<Color>,
        stroke: Option<(Color, f32)>,
    },
    Text {
        origin: (f32, f32),
        text: String,
        font_px: f32,
        color: Color,
    },
}

/// Anything the overlay can be painted onto.
pub trait OverlaySurface {
    /// Surface size in display pixels.
    fn size(&self) -> (u32, u32);

    /// Match the surface to the video source resolution.
    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    fn draw(&mut self, op: DrawOp);

    /// Advance width of `text`. The default approximates a semibold UI font.
    fn measure_text(&self, text: &str, font_px: f32) -> f32 {
        text.chars().count() as f32 * font_px * 0.58
    }
}

/// Records draw operations; cleared on every `clear`.
#[derive(Debug, Default)]
pub struct DrawList {
    width: u32,
    height: u32,
    ops: Vec<DrawOp>,
    clears: u64,
}

impl DrawList {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
            clears: 0,
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// How many times the surface has been cleared (one per render tick).
    pub fn clears(&self) -> u64 {
        self.clears
    }

    pub fn rounded_rects(&self) -> impl Iterator<Item = &Rect> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::RoundedRect { rect, .. } => Some(rect),
            DrawOp::Text { .. } => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            DrawOp::RoundedRect { .. } => None,
        })
    }
}

impl OverlaySurface for DrawList {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.clears += 1;
    }

    fn draw(&mut self, op: DrawOp) {
        self.ops.push(op);
    }
}

/// Software rasteriser producing a transparent RGBA overlay image.
///
/// Boxes and label pills are rasterised with alpha blending. Labels use the
/// built-in 5x7 bitmap font, scaled to the nearest whole multiple of the
/// requested size.
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write overlay snapshot {}", path.display()))
    }

    fn fill_rounded(&mut self, rect: Rect, radius: f32, color: Color) {
        self.paint(rect, radius, color, |_, _| true);
    }

    fn stroke_rounded(&mut self, rect: Rect, radius: f32, color: Color, width: f32) {
        let half = width / 2.0;
        let outer = Rect::new(rect.x - half, rect.y - half, rect.w + width, rect.h + width);
        let inner = Rect::new(rect.x + half, rect.y + half, rect.w - width, rect.h - width);
        let inner_radius = (radius - half).max(0.0);
        self.paint(outer, radius + half, color, |px, py| {
            inner.w <= 0.0 || inner.h <= 0.0 || !inside_rounded(&inner, inner_radius, px, py)
        });
    }

    /// `origin` is the left end of the text baseline.
    fn draw_text(&mut self, origin: (f32, f32), text: &str, font_px: f32, color: Color) {
        let scale = glyphs::scale_for(font_px);
        let top = origin.1 - (glyphs::GLYPH_HEIGHT * scale) as f32;
        for (i, ch) in text.chars().enumerate() {
            let left = origin.0 + (i as u32 * glyphs::GLYPH_ADVANCE * scale) as f32;
            for (row, bits) in glyphs::glyph(ch).iter().enumerate() {
                for col in 0..glyphs::GLYPH_WIDTH {
                    if (bits >> (glyphs::GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    let cell = Rect::new(
                        left + (col * scale) as f32,
                        top + (row as u32 * scale) as f32,
                        scale as f32,
                        scale as f32,
                    );
                    self.paint(cell, 0.0, color, |_, _| true);
                }
            }
        }
    }

    fn paint(&mut self, rect: Rect, radius: f32, color: Color, keep: impl Fn(f32, f32) -> bool) {
        if rect.w <= 0.0 || rect.h <= 0.0 || color.a == 0 {
            return;
        }
        let (width, height) = self.image.dimensions();
        let x0 = rect.x.floor().max(0.0) as u32;
        let y0 = rect.y.floor().max(0.0) as u32;
        let x1 = ((rect.x + rect.w).ceil().max(0.0) as u32).min(width);
        let y1 = ((rect.y + rect.h).ceil().max(0.0) as u32).min(height);
        for y in y0..y1 {
            for x in x0..x1 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                if inside_rounded(&rect, radius, px, py) && keep(px, py) {
                    blend(self.image.get_pixel_mut(x, y), color);
                }
            }
        }
    }
}

impl OverlaySurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::new(width, height);
        }
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw(&mut self, op: DrawOp) {
        match op {
            DrawOp::RoundedRect {
                rect,
                radius,
                fill,
                stroke,
            } => {
                if let Some(fill) = fill {
                    self.fill_rounded(rect, radius, fill);
                }
                if let Some((color, width)) = stroke {
                    self.stroke_rounded(rect, radius, color, width);
                }
            }
            DrawOp::Text {
                origin,
                text,
                font_px,
                color,
            } => self.draw_text(origin, &text, font_px, color),
        }
    }

    fn measure_text(&self, text: &str, font_px: f32) -> f32 {
        let scale = glyphs::scale_for(font_px);
        (text.chars().count() as u32 * glyphs::GLYPH_ADVANCE * scale) as f32
    }
}

fn inside_rounded(rect: &Rect, radius: f32, px: f32, py: f32) -> bool {
    if px < rect.x || py < rect.y || px > rect.x + rect.w || py > rect.y + rect.h {
        return false;
    }
    let r = radius.min(rect.w / 2.0).min(rect.h / 2.0).max(0.0);
    let cx = px.clamp(rect.x + r, rect.x + rect.w - r);
    let cy = py.clamp(rect.y + r, rect.y + rect.h - r);
    let (dx, dy) = (px - cx, py - cy);
    dx * dx + dy * dy <= r * r
}

/// Source-over compositing onto a straight-alpha pixel.
fn blend(dst: &mut Rgba<u8>, src: Color) {
    let sa = src.a as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    let mix = |s: u8, d: u8| {
        ((s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    *dst = Rgba([
        mix(src.r, dst[0]),
        mix(src.g, dst[1]),
        mix(src.b, dst[2]),
        (out_a * 255.0).round() as u8,
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_list_resets_on_clear() {
        let mut list = DrawList::new(640, 480);
        list.draw(DrawOp::Text {
            origin: (0.0, 0.0),
            text: "Alice".into(),
            font_px: 14.0,
            color: Color::rgb(255, 255, 255),
        });
        assert_eq!(list.texts().collect::<Vec<_>>(), vec!["Alice"]);
        list.clear();
        assert!(list.ops().is_empty());
        assert_eq!(list.clears(), 1);
    }

    #[test]
    fn raster_fill_respects_rounded_corners() {
        let mut surface = RasterSurface::new(40, 40);
        surface.draw(DrawOp::RoundedRect {
            rect: Rect::new(0.0, 0.0, 40.0, 40.0),
            radius: 10.0,
            fill: Some(Color::rgb(22, 163, 74)),
            stroke: None,
        });
        assert_eq!(surface.image().get_pixel(0, 0)[3], 0);
        assert_eq!(*surface.image().get_pixel(20, 20), Rgba([22, 163, 74, 255]));
    }

    #[test]
    fn raster_stroke_leaves_interior_untouched() {
        let mut surface = RasterSurface::new(60, 60);
        surface.draw(DrawOp::RoundedRect {
            rect: Rect::new(10.0, 10.0, 40.0, 40.0),
            radius: 4.0,
            fill: None,
            stroke: Some((Color::rgb(239, 68, 68), 3.0)),
        });
        assert_eq!(surface.image().get_pixel(30, 30)[3], 0);
        assert_eq!(surface.image().get_pixel(30, 10)[3], 255);
    }

    #[test]
    fn raster_paints_label_glyphs() {
        let mut surface = RasterSurface::new(40, 20);
        surface.draw(DrawOp::Text {
            origin: (2.0, 16.0),
            text: "I".into(),
            font_px: 14.0,
            color: Color::rgb(255, 255, 255),
        });
        // Scale 2: the glyph spans rows 2..16. The stem of "I" is column 2,
        // i.e. pixels 6..8.
        assert_eq!(*surface.image().get_pixel(6, 8), Rgba([255, 255, 255, 255]));
        assert_eq!(surface.image().get_pixel(3, 8)[3], 0);
        assert_eq!(surface.image().get_pixel(6, 17)[3], 0);
        assert_eq!(surface.measure_text("Alice", 14.0), 60.0);
    }

    #[test]
    fn raster_clear_is_transparent() {
        let mut surface = RasterSurface::new(8, 8);
        surface.draw(DrawOp::RoundedRect {
            rect: Rect::new(0.0, 0.0, 8.0, 8.0),
            radius: 0.0,
            fill: Some(Color::rgb(1, 2, 3)),
            stroke: None,
        });
        surface.clear();
        assert!(surface.image().pixels().all(|p| p[3] == 0));
    }
}
