use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::csrf::{CsrfToken, SessionCookie};
use super::error::ApiError;
use super::types::{
    AckResponse, AttendanceReport, RecognizeRequest, RecognizeResponse, SessionId, SessionRef,
    SessionStatus, StartSessionRequest, StartSessionResponse,
};
use super::AttendanceApi;
use crate::config::KioskConfig;
use crate::reports::{ExportFormat, ReportFilter};

/// Path the server redirects unauthenticated requests to.
pub const LOGIN_PATH: &str = "/login";

const CSRF_HEADER: &str = "X-CSRFToken";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_EXPORT_BYTES: u64 = 64 * 1024 * 1024;

/// Blocking HTTP client for the attendance server.
///
/// Calls block for up to the request timeout, so the kiosk runs them on a
/// dispatcher thread; the one-shot CLI commands call them directly.
pub struct HttpApi {
    agent: ureq::Agent,
    base: Url,
    page_path: String,
    csrf: Option<CsrfToken>,
    cookie: Option<SessionCookie>,
}

impl HttpApi {
    pub fn new(config: &KioskConfig) -> Result<Self, ApiError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url: {}", e)))?;
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self {
            agent,
            base,
            page_path: config.page_path.clone(),
            csrf: config.csrf_token.clone().map(CsrfToken::new),
            cookie: config.session_cookie.clone().map(SessionCookie::new),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn has_csrf_token(&self) -> bool {
        self.csrf.is_some()
    }

    /// Scrape the anti-forgery token from the attendance page unless one was
    /// configured explicitly. A page without a token leaves requests untokened.
    pub fn ensure_csrf_token(&mut self) -> Result<(), ApiError> {
        if self.csrf.is_some() {
            return Ok(());
        }
        let url = self.endpoint(&self.page_path)?;
        let response = self.send(self.request("GET", &url).call())?;
        let html = response
            .into_string()
            .map_err(|e| ApiError::Decode(format!("read page: {}", e)))?;
        self.csrf = CsrfToken::from_page(&html);
        if self.csrf.is_none() {
            log::warn!("no anti-forgery token found on {}", url);
        }
        Ok(())
    }

    /// URL of the report export download for `filter` in `format`.
    pub fn export_url(&self, filter: &ReportFilter, format: ExportFormat) -> Result<Url, ApiError> {
        let mut url = self.endpoint("/api/export_attendance")?;
        filter.append_query(&mut url);
        url.query_pairs_mut().append_pair("format", format.as_query());
        Ok(url)
    }

    /// Download the export file to `dest`. Returns the number of bytes written.
    pub fn download_export(
        &self,
        filter: &ReportFilter,
        format: ExportFormat,
        dest: &Path,
    ) -> Result<u64, ApiError> {
        let url = self.export_url(filter, format)?;
        let response = self.send(self.request("GET", &url).call())?;
        if is_html(&response) {
            return Err(ApiError::Unauthenticated);
        }
        save_limited(response.into_reader(), dest, MAX_EXPORT_BYTES)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let mut request = self.agent.request_url(method, url);
        if let Some(cookie) = &self.cookie {
            request = request.set("Cookie", cookie.as_str());
        }
        request
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let payload =
            serde_json::to_string(body).map_err(|e| ApiError::Decode(format!("encode body: {}", e)))?;
        let mut request = self
            .request("POST", &url)
            .set("Content-Type", "application/json");
        if let Some(token) = &self.csrf {
            request = request.set(CSRF_HEADER, token.as_str());
        }
        let response = self.send(request.send_string(&payload))?;
        read_json(response)
    }

    fn send(
        &self,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response, ApiError> {
        match result {
            Ok(response) => {
                if redirected_to_login(response.get_url()) {
                    log::warn!("request redirected to login page");
                    return Err(ApiError::Unauthenticated);
                }
                Ok(response)
            }
            Err(ureq::Error::Status(status, response)) => {
                if status == 401 || status == 403 {
                    return Err(ApiError::Unauthenticated);
                }
                let body = response.into_string().unwrap_or_default();
                Err(ApiError::server(status, &body))
            }
            Err(ureq::Error::Transport(transport)) => Err(ApiError::Transport(transport.to_string())),
        }
    }
}

impl AttendanceApi for HttpApi {
    fn session_status(&self) -> Result<SessionStatus, ApiError> {
        let url = self.endpoint("/api/session_status")?;
        let response = match self.send(self.request("GET", &url).call()) {
            Ok(response) => response,
            Err(ApiError::Unauthenticated) => return Ok(SessionStatus::inactive()),
            Err(e) => return Err(e),
        };
        if is_html(&response) {
            log::debug!("session status returned html; treating as inactive");
            return Ok(SessionStatus::inactive());
        }
        let body = response
            .into_string()
            .map_err(|e| ApiError::Decode(format!("read body: {}", e)))?;
        Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
            log::debug!("session status was not json ({}); treating as inactive", e);
            SessionStatus::inactive()
        }))
    }

    fn start_session(&self, request: &StartSessionRequest) -> Result<StartSessionResponse, ApiError> {
        self.post_json("/api/start_session", request)
    }

    fn end_session(&self, session_id: &SessionId) -> Result<AckResponse, ApiError> {
        self.post_json("/api/end_session", &SessionRef { session_id })
    }

    fn reopen_session(&self, session_id: &SessionId) -> Result<AckResponse, ApiError> {
        self.post_json("/api/reopen_session", &SessionRef { session_id })
    }

    fn recognize_face(&self, request: &RecognizeRequest) -> Result<RecognizeResponse, ApiError> {
        self.post_json("/api/recognize_face", request)
    }

    fn get_attendance(&self, filter: &ReportFilter) -> Result<AttendanceReport, ApiError> {
        let mut url = self.endpoint("/api/get_attendance")?;
        filter.append_query(&mut url);
        let response = self.send(self.request("GET", &url).call())?;
        read_json(response)
    }
}

fn is_html(response: &ureq::Response) -> bool {
    response.content_type().to_ascii_lowercase().contains("text/html")
}

fn redirected_to_login(final_url: &str) -> bool {
    Url::parse(final_url)
        .map(|url| url.path().starts_with(LOGIN_PATH))
        .unwrap_or_else(|_| final_url.contains(LOGIN_PATH))
}

/// An HTML page where JSON was expected is a login page served after a redirect.
fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T, ApiError> {
    if is_html(&response) {
        return Err(ApiError::Unauthenticated);
    }
    let body = response
        .into_string()
        .map_err(|e| ApiError::Decode(format!("read body: {}", e)))?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Copy at most `limit` bytes into `dest`. A longer body or a failed copy
/// removes the partial file.
fn save_limited(reader: impl Read, dest: &Path, limit: u64) -> Result<u64, ApiError> {
    let mut file = std::fs::File::create(dest)
        .map_err(|e| ApiError::Transport(format!("create {}: {}", dest.display(), e)))?;
    let result = std::io::copy(&mut reader.take(limit + 1), &mut file)
        .map_err(|e| ApiError::Transport(format!("write {}: {}", dest.display(), e)))
        .and_then(|written| {
            if written > limit {
                Err(ApiError::Transport(format!(
                    "export exceeds {} bytes",
                    limit
                )))
            } else {
                Ok(written)
            }
        });
    if result.is_err() {
        drop(file);
        if let Err(err) = std::fs::remove_file(dest) {
            log::warn!("could not remove partial export {}: {}", dest.display(), err);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_within_the_limit_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("attendance.csv");
        let written = save_limited(&b"date,name\n"[..], &dest, 10).unwrap();
        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"date,name\n");
    }

    #[test]
    fn oversized_export_fails_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("attendance.csv");
        let err = save_limited(&b"date,name\nx"[..], &dest, 10).unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn login_redirect_is_detected_by_path() {
        assert!(redirected_to_login("http://127.0.0.1:5000/login?next=%2Fattendance"));
        assert!(!redirected_to_login("http://127.0.0.1:5000/api/session_status"));
    }

    #[test]
    fn export_url_carries_filter_and_format() {
        let config = KioskConfig::default();
        let api = HttpApi::new(&config).unwrap();
        let filter = ReportFilter {
            start_date: Some("2026-10-01".into()),
            end_date: None,
            class_name: Some("CS A".into()),
        };
        let url = api.export_url(&filter, ExportFormat::Excel).unwrap();
        assert_eq!(url.path(), "/api/export_attendance");
        assert_eq!(
            url.query(),
            Some("start_date=2026-10-01&class_name=CS+A&format=excel")
        );
    }
}
