//! Camera sources.
//!
//! A camera hands the kiosk its most recent decoded frame and reports loss of
//! the video track as an event. Opening never blocks the UI loop: sources that
//! need network I/O decode on their own thread and report `None` from
//! [`Camera::frame`] until the first frame arrives.

mod http;
mod synthetic;

use anyhow::{anyhow, Result};
use std::sync::Arc;
use thiserror::Error;

use crate::config::CameraSettings;

pub use http::HttpCamera;
pub use synthetic::SyntheticCamera;

/// One decoded RGB8 video frame.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrame {
    pixels: Arc<Vec<u8>>,
    width: u32,
    height: u32,
}

impl VideoFrame {
    /// Wrap `pixels` (row-major RGB8). Returns `None` when the buffer does not
    /// match the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(3)?;
        if pixels.len() != expected {
            return None;
        }
        Some(Self {
            pixels: Arc::new(pixels),
            width,
            height,
        })
    }

    /// Solid-colour frame, handy for synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            pixels: Arc::new(pixels),
            width,
            height,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Non-zero dimensions, so the frame can be captured.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Asynchronous notification from a camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraEvent {
    /// The video track stopped (device unplugged, stream closed).
    TrackEnded,
    /// The source failed while playing.
    Error(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera access requires https or localhost (origin {0})")]
    InsecureContext(String),
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    Device(String),
}

pub trait Camera: Send {
    /// Begin acquiring the video stream.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Stop every track and release the device. Idempotent.
    fn close(&mut self);

    fn is_active(&self) -> bool;

    /// Latest decoded frame, or `None` while the stream is not ready to play.
    fn frame(&self) -> Option<VideoFrame>;

    /// Pop the next pending event.
    fn take_event(&mut self) -> Option<CameraEvent>;

    fn describe(&self) -> String;
}

/// Build the camera named by `settings.url`.
///
/// `stub://` yields a synthetic camera, `http(s)://` an MJPEG or snapshot
/// reader.
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn Camera>> {
    let url = url::Url::parse(&settings.url)
        .map_err(|e| anyhow!("invalid camera url '{}': {}", settings.url, e))?;
    match url.scheme() {
        "stub" => Ok(Box::new(SyntheticCamera::new(
            &settings.url,
            settings.width,
            settings.height,
        ))),
        "http" | "https" => Ok(Box::new(HttpCamera::new(url))),
        other => Err(anyhow!(
            "unsupported camera scheme '{}'; expected stub or http(s)",
            other
        )),
    }
}
