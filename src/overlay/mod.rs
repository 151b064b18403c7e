//! Live detection overlay.
//!
//! `store` tracks the boxes returned by the recognizer, `render` smooths and
//! paints them once per display frame, and `surface` provides the targets they
//! are painted onto.

mod glyphs;
mod render;
mod store;
mod surface;

pub use render::{label_layout, style_for, BoxStyle, LabelLayout, OverlayRenderer, SMOOTHING_FACTOR};
pub use store::{box_id, BoxStore, DetectionBox, DetectionStatus, ReconcileStats};
pub use surface::{Color, DrawList, DrawOp, OverlaySurface, RasterSurface};
