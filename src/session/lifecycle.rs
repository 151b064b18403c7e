use std::time::Duration;

use crate::api::{
    AckResponse, ApiError, AttendanceApi, SessionId, SessionStatus, StartSessionRequest,
    StartSessionResponse,
};
use crate::recognition::RecognitionContext;
use crate::view::{Badge, NoticeKind, ViewModel};
use crate::ValidationError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    NoSession,
    Active,
    /// Ended session accepting late marks.
    Reopened,
    Ended,
}

/// Side effects a confirmed transition asks the runtime to carry out.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    AcquireCamera,
    StopCamera,
    StartPoller,
    StopPoller,
    StartTimer(Duration),
    StopTimer,
    ClearOverlay,
    /// Credentials were rejected; stop everything until the operator logs in.
    RequireLogin,
}

/// Start-session form input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionForm {
    pub class_name: String,
    pub subject_id: String,
    pub duration_minutes: Option<u32>,
}

impl SessionForm {
    pub fn new(class_name: &str, subject_id: &str, duration_minutes: Option<u32>) -> Self {
        Self {
            class_name: class_name.to_string(),
            subject_id: subject_id.to_string(),
            duration_minutes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingRequest {
    Start { duration_minutes: u32 },
    End,
    Reopen,
    Status,
}

/// Session lifecycle: `NoSession → Active → Ended`, then either
/// `Ended → Reopened` for late marking or a fresh start.
///
/// Every transition waits for the server. `begin_*` validates and returns
/// the request to send; `on_*` applies the answer, updates the view and
/// returns the effects for the runtime.
#[derive(Debug)]
pub struct SessionManager {
    state: SessionState,
    session_id: Option<SessionId>,
    ended_id: Option<SessionId>,
    context: Option<RecognitionContext>,
    requested_context: Option<RecognitionContext>,
    pending: Option<PendingRequest>,
    default_duration_minutes: u32,
}

impl SessionManager {
    pub fn new(default_duration_minutes: u32) -> Self {
        Self {
            state: SessionState::NoSession,
            session_id: None,
            ended_id: None,
            context: None,
            requested_context: None,
            pending: None,
            default_duration_minutes,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the running session; cleared on end.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Id of the last ended session, which `reopen` addresses.
    pub fn ended_session_id(&self) -> Option<&SessionId> {
        self.ended_id.as_ref()
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// Active or reopened, with an id to recognize against.
    pub fn is_live(&self) -> bool {
        self.session_id.is_some()
            && matches!(self.state, SessionState::Active | SessionState::Reopened)
    }

    /// Detections now count as late.
    pub fn is_late(&self) -> bool {
        self.state == SessionState::Reopened
    }

    /// Class/subject for recognition requests while live.
    pub fn recognition_context(&self) -> Option<&RecognitionContext> {
        if self.is_live() {
            self.context.as_ref()
        } else {
            None
        }
    }

    pub fn begin_start(
        &mut self,
        form: &SessionForm,
        view: &mut ViewModel,
    ) -> Result<StartSessionRequest, ValidationError> {
        self.ensure_idle()?;
        if matches!(self.state, SessionState::Active | SessionState::Reopened) {
            return Err(ValidationError::SessionActive);
        }
        let class_name = form.class_name.trim();
        let subject_id = form.subject_id.trim();
        if class_name.is_empty() || subject_id.is_empty() {
            view.alert(ValidationError::MissingSelection.to_string());
            return Err(ValidationError::MissingSelection);
        }
        let duration_minutes = form
            .duration_minutes
            .filter(|m| *m > 0)
            .unwrap_or(self.default_duration_minutes);
        self.requested_context = Some(RecognitionContext {
            class_name: class_name.to_string(),
            subject_id: subject_id.to_string(),
        });
        self.pending = Some(PendingRequest::Start { duration_minutes });
        view.show(NoticeKind::Info, "Starting session...");
        log::info!(
            "session: starting {} / {} for {} min",
            class_name,
            subject_id,
            duration_minutes
        );
        Ok(StartSessionRequest::new(class_name, subject_id, duration_minutes))
    }

    pub fn on_start_response(
        &mut self,
        result: Result<StartSessionResponse, ApiError>,
        view: &mut ViewModel,
    ) -> Vec<Effect> {
        let duration_minutes = match self.pending.take() {
            Some(PendingRequest::Start { duration_minutes }) => duration_minutes,
            other => {
                log::warn!("session: unexpected start response (pending {:?})", other);
                self.pending = other;
                return Vec::new();
            }
        };
        let requested_context = self.requested_context.take();
        match result {
            Ok(response) if response.success => {
                let Some(session_id) = response.session_id.filter(|id| !id.is_empty()) else {
                    view.clear_notice();
                    view.alert("Error starting session: server returned no session id");
                    return Vec::new();
                };
                log::info!("session: {} started", session_id);
                self.session_id = Some(session_id);
                self.context = requested_context;
                self.ended_id = None;
                self.state = SessionState::Active;
                view.set_badge(Badge::Active);
                view.set_form_locked(true);
                view.show(NoticeKind::Success, "Session Started");
                vec![
                    Effect::StartTimer(Duration::from_secs(u64::from(duration_minutes) * 60)),
                    Effect::AcquireCamera,
                    Effect::StartPoller,
                ]
            }
            Ok(response) => {
                let message = response.message.unwrap_or_default();
                log::warn!("session: start refused: {}", message);
                view.clear_notice();
                view.alert(format!("Error starting session: {}", message));
                Vec::new()
            }
            Err(err) => {
                view.clear_notice();
                self.request_failed("start", err, "Failed to connect to server", view)
            }
        }
    }

    pub fn begin_end(&mut self) -> Result<SessionId, ValidationError> {
        self.ensure_idle()?;
        let session_id = match (&self.session_id, self.state) {
            (Some(id), SessionState::Active | SessionState::Reopened) => id.clone(),
            _ => return Err(ValidationError::NoActiveSession),
        };
        self.pending = Some(PendingRequest::End);
        log::info!("session: ending {}", session_id);
        Ok(session_id)
    }

    pub fn on_end_response(
        &mut self,
        result: Result<AckResponse, ApiError>,
        view: &mut ViewModel,
    ) -> Vec<Effect> {
        if !self.take_pending(PendingRequest::End) {
            return Vec::new();
        }
        match result {
            Ok(response) if response.success => {
                self.ended_id = self.session_id.take();
                self.state = SessionState::Ended;
                log::info!("session: ended");
                view.set_badge(Badge::Ended);
                view.set_form_locked(false);
                view.show(NoticeKind::Info, "Session Ended. Absentees Marked.");
                vec![
                    Effect::StopTimer,
                    Effect::StopPoller,
                    Effect::StopCamera,
                    Effect::ClearOverlay,
                ]
            }
            Ok(response) => {
                let message = response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Failed to end session".to_string());
                log::warn!("session: end refused: {}", message);
                view.alert(message);
                Vec::new()
            }
            Err(err) => self.request_failed("end", err, "Error connecting to server", view),
        }
    }

    pub fn begin_reopen(&mut self) -> Result<SessionId, ValidationError> {
        self.ensure_idle()?;
        let session_id = match (&self.ended_id, self.state) {
            (Some(id), SessionState::Ended) => id.clone(),
            _ => return Err(ValidationError::NotEnded),
        };
        self.pending = Some(PendingRequest::Reopen);
        log::info!("session: reopening {}", session_id);
        Ok(session_id)
    }

    pub fn on_reopen_response(
        &mut self,
        result: Result<AckResponse, ApiError>,
        view: &mut ViewModel,
    ) -> Vec<Effect> {
        if !self.take_pending(PendingRequest::Reopen) {
            return Vec::new();
        }
        match result {
            Ok(response) if response.success => {
                self.session_id = self.ended_id.clone();
                self.state = SessionState::Reopened;
                log::info!("session: reopened for late marking");
                self.show_reopened(view);
                view.show(NoticeKind::Warning, "Session Reopened. Marking as Late.");
                vec![Effect::StopTimer, Effect::AcquireCamera, Effect::StartPoller]
            }
            Ok(response) => {
                let message = response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Failed to reopen session".to_string());
                log::warn!("session: reopen refused: {}", message);
                view.alert(message);
                Vec::new()
            }
            Err(err) => self.request_failed("reopen", err, "Error connecting to server", view),
        }
    }

    /// Status checks may run in any state but not alongside another request.
    pub fn begin_status(&mut self) -> Result<(), ValidationError> {
        self.ensure_idle()?;
        self.pending = Some(PendingRequest::Status);
        Ok(())
    }

    /// Adopt a session the server reports as running (e.g. after a restart
    /// of the kiosk). An inactive report leaves local state alone.
    pub fn on_status(
        &mut self,
        result: Result<SessionStatus, ApiError>,
        view: &mut ViewModel,
    ) -> Vec<Effect> {
        if !self.take_pending(PendingRequest::Status) {
            return Vec::new();
        }
        let status = match result {
            Ok(status) => status,
            Err(err) if err.is_auth() => {
                return self.request_failed("status check", err, "", view);
            }
            Err(err) => {
                log::warn!("session: status check failed: {}", err);
                view.show(
                    NoticeKind::Warning,
                    format!("Could not check session status: {}", err),
                );
                return Vec::new();
            }
        };
        let Some(session_id) = status.session_id.filter(|id| status.active && !id.is_empty())
        else {
            log::debug!("session: no active session on server");
            return Vec::new();
        };

        let previous = self.state;
        self.session_id = Some(session_id);
        self.ended_id = None;
        self.context = Some(RecognitionContext {
            class_name: status.class_name.unwrap_or_default(),
            subject_id: status.subject_id.unwrap_or_default(),
        });
        view.set_form_locked(true);

        if status.status.as_deref() == Some("Reopened") {
            self.state = SessionState::Reopened;
            log::info!("session: resumed reopened session");
            self.show_reopened(view);
            vec![Effect::StopTimer, Effect::AcquireCamera, Effect::StartPoller]
        } else {
            self.state = SessionState::Active;
            log::info!(
                "session: resumed active session ({:.1} min left)",
                status.remaining_minutes
            );
            view.set_badge(Badge::Active);
            let remaining = Duration::from_secs_f64((status.remaining_minutes * 60.0).max(0.0));
            let mut effects = vec![Effect::StartTimer(remaining)];
            if previous != SessionState::Active && previous != SessionState::Reopened {
                effects.push(Effect::AcquireCamera);
                effects.push(Effect::StartPoller);
            }
            effects
        }
    }

    /// Blocking start, for one-shot callers.
    pub fn start_with(
        &mut self,
        api: &dyn AttendanceApi,
        form: &SessionForm,
        view: &mut ViewModel,
    ) -> Result<Vec<Effect>, ValidationError> {
        let request = self.begin_start(form, view)?;
        Ok(self.on_start_response(api.start_session(&request), view))
    }

    /// Blocking end, for one-shot callers.
    pub fn end_with(
        &mut self,
        api: &dyn AttendanceApi,
        view: &mut ViewModel,
    ) -> Result<Vec<Effect>, ValidationError> {
        let session_id = self.begin_end()?;
        Ok(self.on_end_response(api.end_session(&session_id), view))
    }

    /// Blocking reopen, for one-shot callers.
    pub fn reopen_with(
        &mut self,
        api: &dyn AttendanceApi,
        view: &mut ViewModel,
    ) -> Result<Vec<Effect>, ValidationError> {
        let session_id = self.begin_reopen()?;
        Ok(self.on_reopen_response(api.reopen_session(&session_id), view))
    }

    /// Blocking status check, for one-shot callers.
    pub fn status_with(
        &mut self,
        api: &dyn AttendanceApi,
        view: &mut ViewModel,
    ) -> Result<Vec<Effect>, ValidationError> {
        self.begin_status()?;
        Ok(self.on_status(api.session_status(), view))
    }

    /// Treat `session_id` as ended so it can be reopened (one-shot callers
    /// that know the id out of band).
    pub fn assume_ended(&mut self, session_id: SessionId) {
        self.session_id = None;
        self.ended_id = Some(session_id);
        self.state = SessionState::Ended;
    }

    fn show_reopened(&self, view: &mut ViewModel) {
        view.set_badge(Badge::Reopened);
        view.set_form_locked(true);
        view.set_timer(Some("--:--".to_string()), false);
    }

    fn ensure_idle(&self) -> Result<(), ValidationError> {
        if self.pending.is_some() {
            return Err(ValidationError::RequestPending);
        }
        Ok(())
    }

    fn take_pending(&mut self, expected: PendingRequest) -> bool {
        if self.pending == Some(expected) {
            self.pending = None;
            true
        } else {
            log::warn!(
                "session: unexpected {:?} response (pending {:?})",
                expected,
                self.pending
            );
            false
        }
    }

    fn request_failed(
        &mut self,
        operation: &str,
        err: ApiError,
        connect_prefix: &str,
        view: &mut ViewModel,
    ) -> Vec<Effect> {
        if err.is_auth() {
            log::warn!("session: {} rejected, login required", operation);
            view.alert("Session expired. Please log in again.");
            view.require_auth();
            return vec![Effect::RequireLogin];
        }
        log::warn!("session: {} failed: {}", operation, err);
        view.alert(format!("{}: {}", connect_prefix, err));
        Vec::new()
    }
}
