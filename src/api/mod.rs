//! Remote attendance server endpoints.
//!
//! Recognition, persistence and authorization are opaque server-side services.
//! This module only describes their contracts (`types`), the way failures are
//! classified (`error`), the anti-forgery token (`csrf`) and a blocking HTTP
//! client (`http`). The kiosk never calls the client from its frame loop
//! directly; jobs are handed to a dispatcher (see `runtime::dispatch`).

mod csrf;
mod error;
mod http;
mod types;

pub use csrf::{CsrfToken, SessionCookie};
pub use error::ApiError;
pub use http::{HttpApi, LOGIN_PATH};
pub use types::{
    AckResponse, AttendanceRecord, AttendanceReport, RecognitionResult, RecognizeRequest,
    RecognizeResponse, SessionId, SessionStatus, StartSessionRequest, StartSessionResponse,
};

use crate::reports::ReportFilter;

/// The endpoints consumed by the kiosk.
///
/// Implementations must be callable from a worker thread. Every method maps
/// authentication failures (401/403, login redirects) to
/// [`ApiError::Unauthenticated`].
pub trait AttendanceApi: Send + Sync {
    /// `GET /api/session_status`. Non-JSON answers mean "inactive".
    fn session_status(&self) -> Result<SessionStatus, ApiError>;

    /// `POST /api/start_session`.
    fn start_session(&self, request: &StartSessionRequest)
        -> Result<StartSessionResponse, ApiError>;

    /// `POST /api/end_session`.
    fn end_session(&self, session_id: &SessionId) -> Result<AckResponse, ApiError>;

    /// `POST /api/reopen_session`.
    fn reopen_session(&self, session_id: &SessionId) -> Result<AckResponse, ApiError>;

    /// `POST /api/recognize_face`.
    fn recognize_face(&self, request: &RecognizeRequest) -> Result<RecognizeResponse, ApiError>;

    /// `GET /api/get_attendance`.
    fn get_attendance(&self, filter: &ReportFilter) -> Result<AttendanceReport, ApiError>;
}
