//! Attendance Kiosk
//!
//! Client-side core of the attendance station: it drives a camera, polls the
//! remote face-recognition endpoint, keeps a smoothed overlay of the returned
//! detections and manages the class session lifecycle.
//!
//! # Architecture
//!
//! Everything runs on one cooperative loop. Each display frame:
//!
//! 1. Completed network jobs are applied (recognition results, session acks).
//! 2. Camera events and pending restarts are serviced.
//! 3. The overlay renderer interpolates every tracked box toward its target.
//! 4. The recognition poller decides whether to capture and submit a frame.
//!
//! The poller is the only writer of box targets, status and staleness; the
//! renderer is the only writer of the rendered geometry. Recognition,
//! persistence and authorization are remote services reached through
//! [`api::AttendanceApi`].
//!
//! # Module Structure
//!
//! - `overlay`: box store, renderer, drawing surfaces
//! - `recognition`: frame capture/encoding, poller state machine, result handling
//! - `session`: lifecycle state machine, countdown, camera stream recovery
//! - `camera`: camera sources (synthetic, HTTP MJPEG/snapshot)
//! - `api`: endpoint contracts and the HTTP client
//! - `reports`: report filters, table rendering, export URLs
//! - `runtime`: the kiosk context tying the loops together

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod api;
pub mod camera;
pub mod config;
pub mod overlay;
pub mod recognition;
pub mod reports;
pub mod runtime;
pub mod session;
pub mod ui;
pub mod view;

pub use api::{ApiError, AttendanceApi, CsrfToken, HttpApi, SessionId};
pub use camera::{Camera, CameraError, CameraEvent, VideoFrame};
pub use config::KioskConfig;
pub use overlay::{BoxStore, DetectionBox, DetectionStatus, OverlayRenderer, OverlaySurface};
pub use recognition::{MarkedSet, RecognitionPoller};
pub use reports::{ExportFormat, ReportFilter};
pub use runtime::Kiosk;
pub use session::{Effect, SessionForm, SessionManager, SessionState, StreamManager};
pub use view::{Badge, LogEntry, Notice, NoticeKind, ViewModel};

/// Input rejected before any request is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select class and subject first")]
    MissingSelection,
    #[error("a session is already running")]
    SessionActive,
    #[error("no active session")]
    NoActiveSession,
    #[error("only an ended session can be reopened")]
    NotEnded,
    #[error("a session request is already in progress")]
    RequestPending,
    #[error("invalid date '{0}'; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Start date must be before end date")]
    DateOrder,
}

/// Axis-aligned rectangle in display (unscaled video) coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Build a rectangle from a `[top, right, bottom, left]` location,
    /// dividing every edge by `scale` to return to unscaled space.
    pub fn from_location(location: [f32; 4], scale: f32) -> Self {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let [top, right, bottom, left] = location.map(|v| v / scale);
        Self {
            x: left,
            y: top,
            w: right - left,
            h: bottom - top,
        }
    }

    /// Move `self` toward `target` by `factor` (0 = stay, 1 = snap), componentwise.
    pub fn lerp_toward(&mut self, target: &Rect, factor: f32) {
        self.x += (target.x - self.x) * factor;
        self.y += (target.y - self.y) * factor;
        self.w += (target.w - self.w) * factor;
        self.h += (target.h - self.h) * factor;
    }
}

/// Secure-context rule for camera access: https origins, or loopback hosts.
pub fn is_secure_origin(origin: &url::Url) -> bool {
    if origin.scheme() == "https" {
        return true;
    }
    matches!(
        origin.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}
