//! The kiosk context: one cooperative frame loop tying the overlay, the
//! recognition poller and the session lifecycle together.

mod dispatch;

pub use dispatch::{execute, ApiCompletion, ApiJob, Dispatch, InlineDispatcher, ThreadDispatcher};

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use url::Url;

use crate::camera::Camera;
use crate::config::KioskConfig;
use crate::overlay::{BoxStore, DrawList, OverlayRenderer, OverlaySurface};
use crate::recognition::{
    MarkedSet, PollAction, PollOutcome, RecognitionPoller, ResultSink, SkipReason,
};
use crate::session::{
    Countdown, CountdownTick, Effect, RetryPolicy, SessionForm, SessionManager, StreamManager,
};
use crate::view::{NoticeKind, ViewModel};
use crate::ValidationError;

/// What happened during one call to [`Kiosk::frame`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Network completions applied at the start of the frame.
    pub completions: usize,
    /// Recognition answers and how they were handled.
    pub outcomes: Vec<PollOutcome>,
    /// Boxes painted by the render task.
    pub painted: usize,
    /// Sequence number of a recognition request submitted this frame.
    pub submitted: Option<u64>,
    pub skipped: Option<SkipReason>,
    pub restart_requested: bool,
}

/// Shared context of the attendance station.
///
/// The render task and the poll task both run from [`Kiosk::frame`], so the
/// box store never sees concurrent access. Network calls leave the loop
/// through a [`Dispatch`] and come back as completions on a later frame.
pub struct Kiosk {
    config: KioskConfig,
    store: BoxStore,
    renderer: OverlayRenderer,
    poller: RecognitionPoller,
    session: SessionManager,
    stream: StreamManager,
    marked: MarkedSet,
    view: ViewModel,
    dispatch: Box<dyn Dispatch>,
    countdown: Option<Countdown>,
    surface: Box<dyn OverlaySurface>,
    surface_ready: bool,
}

impl Kiosk {
    pub fn new(
        config: KioskConfig,
        camera: Box<dyn Camera>,
        dispatch: Box<dyn Dispatch>,
    ) -> Result<Self> {
        let origin = Url::parse(&config.base_url)
            .with_context(|| format!("invalid base url '{}'", config.base_url))?;
        let stream = StreamManager::new(
            camera,
            origin,
            RetryPolicy {
                max_attempts: config.camera.retry_attempts,
            },
        );
        Ok(Self {
            store: BoxStore::new(config.overlay.stale_after),
            renderer: OverlayRenderer::new(config.overlay.smoothing),
            poller: RecognitionPoller::new(config.recognition.clone()),
            session: SessionManager::new(config.default_duration_minutes),
            stream,
            marked: MarkedSet::default(),
            view: ViewModel::new(),
            dispatch,
            countdown: None,
            surface: Box::new(DrawList::default()),
            surface_ready: false,
            config,
        })
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewModel {
        &mut self.view
    }

    pub fn store(&self) -> &BoxStore {
        &self.store
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn stream(&self) -> &StreamManager {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut StreamManager {
        &mut self.stream
    }

    pub fn poller(&self) -> &RecognitionPoller {
        &self.poller
    }

    pub fn marked(&self) -> &MarkedSet {
        &self.marked
    }

    pub fn surface(&self) -> &dyn OverlaySurface {
        self.surface.as_ref()
    }

    /// Replace the overlay surface. It is sized to the video on the next
    /// frame that has one.
    pub fn set_surface(&mut self, surface: Box<dyn OverlaySurface>) {
        self.surface = surface;
        self.surface_ready = false;
    }

    /// Time left on the session countdown, if one is running.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        self.countdown.as_ref().map(|c| c.remaining(now))
    }

    /// Network jobs not yet applied.
    pub fn jobs_in_flight(&self) -> usize {
        self.dispatch.in_flight()
    }

    pub fn start_session(&mut self, form: &SessionForm) -> Result<(), ValidationError> {
        let request = self.session.begin_start(form, &mut self.view)?;
        self.dispatch.submit(ApiJob::Start(request));
        Ok(())
    }

    pub fn end_session(&mut self) -> Result<(), ValidationError> {
        let session_id = self.session.begin_end()?;
        self.dispatch.submit(ApiJob::End(session_id));
        Ok(())
    }

    pub fn reopen_session(&mut self) -> Result<(), ValidationError> {
        let session_id = self.session.begin_reopen()?;
        self.dispatch.submit(ApiJob::Reopen(session_id));
        Ok(())
    }

    /// Ask the server whether a session is already running (page load).
    pub fn check_session_status(&mut self) -> Result<(), ValidationError> {
        self.session.begin_status()?;
        self.dispatch.submit(ApiJob::Status);
        Ok(())
    }

    /// One display-refresh tick.
    pub fn frame(&mut self, now: Instant) -> FrameReport {
        let mut report = FrameReport::default();

        for completion in self.dispatch.poll() {
            report.completions += 1;
            self.apply_completion(completion, now, &mut report);
        }

        let live = self.session.is_live();
        self.stream.service(now, live, &mut self.view);
        let frame = self.stream.frame();
        if !self.surface_ready {
            if let Some(frame) = &frame {
                self.surface.resize(frame.width(), frame.height());
                self.surface_ready = true;
            }
        }

        self.tick_countdown(now);

        let surface: Option<&mut dyn OverlaySurface> = if self.surface_ready {
            Some(self.surface.as_mut())
        } else {
            None
        };
        report.painted = self.renderer.tick(&mut self.store, surface);

        let action = self.poller.tick(
            now,
            self.session.recognition_context(),
            self.stream.is_active(),
            frame.as_ref(),
        );
        match action {
            PollAction::Submit { seq, request } => {
                self.dispatch.submit(ApiJob::Recognize { seq, request });
                report.submitted = Some(seq);
            }
            PollAction::RestartCamera => {
                self.stream.request_restart(now, &mut self.view);
                report.restart_requested = true;
            }
            PollAction::Skipped(reason) => report.skipped = Some(reason),
            PollAction::Halt => {}
        }

        report
    }

    /// Paint the current targets onto `surface` without touching the live
    /// overlay.
    pub fn paint_snapshot(&self, surface: &mut dyn OverlaySurface) -> usize {
        let (width, height) = self.surface.size();
        if width > 0 && height > 0 {
            surface.resize(width, height);
        }
        let mut store = self.store.clone();
        OverlayRenderer::new(false).tick(&mut store, Some(surface))
    }

    /// Stop polling, the countdown and the camera.
    pub fn shutdown(&mut self) {
        self.poller.stop();
        self.countdown = None;
        self.stream.release();
        log::info!("kiosk: stopped");
    }

    fn apply_completion(
        &mut self,
        completion: ApiCompletion,
        now: Instant,
        report: &mut FrameReport,
    ) {
        let effects = match completion {
            ApiCompletion::Start(result) => self.session.on_start_response(result, &mut self.view),
            ApiCompletion::End(result) => self.session.on_end_response(result, &mut self.view),
            ApiCompletion::Reopen(result) => self.session.on_reopen_response(result, &mut self.view),
            ApiCompletion::Status(result) => self.session.on_status(result, &mut self.view),
            ApiCompletion::Recognize { seq, result } => {
                let sink = ResultSink {
                    store: &mut self.store,
                    marked: &mut self.marked,
                    view: &mut self.view,
                    late: self.session.is_late(),
                };
                let outcome = self.poller.complete(seq, result, now, sink);
                let effects = if outcome == PollOutcome::AuthFailed {
                    vec![Effect::RequireLogin]
                } else {
                    Vec::new()
                };
                report.outcomes.push(outcome);
                effects
            }
        };
        for effect in effects {
            self.run_effect(effect, now);
        }
    }

    fn run_effect(&mut self, effect: Effect, now: Instant) {
        log::debug!("kiosk: {:?}", effect);
        match effect {
            Effect::AcquireCamera => {
                let live = self.session.is_live();
                // Failures are surfaced on the view and retried by the stream.
                let _ = self.stream.acquire_for_session(now, live, &mut self.view);
            }
            Effect::StopCamera => self.stream.release(),
            Effect::StartPoller => self.poller.start(),
            Effect::StopPoller => self.poller.stop(),
            Effect::StartTimer(duration) => {
                let countdown = Countdown::start(now, duration);
                self.view.set_timer(Some(countdown.display(now)), false);
                self.countdown = Some(countdown);
            }
            Effect::StopTimer => self.countdown = None,
            Effect::ClearOverlay => self.store.clear(),
            Effect::RequireLogin => {
                log::warn!("kiosk: login required, stopping");
                self.poller.stop();
                self.countdown = None;
                self.stream.release();
            }
        }
    }

    fn tick_countdown(&mut self, now: Instant) {
        let Some(countdown) = self.countdown.as_mut() else {
            return;
        };
        match countdown.poll(now) {
            Some(CountdownTick::Remaining(display)) => self.view.set_timer(Some(display), false),
            Some(CountdownTick::Expired) => {
                log::info!("session: time expired");
                self.view.set_timer(Some("00:00".to_string()), true);
                self.view.show(NoticeKind::Error, "Time Expired. Please End Session.");
                self.countdown = None;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        AckResponse, ApiError, AttendanceApi, AttendanceReport, RecognizeRequest,
        RecognizeResponse, SessionId, SessionStatus, StartSessionRequest, StartSessionResponse,
    };
    use crate::camera::SyntheticCamera;
    use crate::reports::ReportFilter;
    use crate::session::SessionState;
    use std::sync::Arc;

    struct Server;

    impl AttendanceApi for Server {
        fn session_status(&self) -> Result<SessionStatus, ApiError> {
            Ok(SessionStatus::inactive())
        }
        fn start_session(&self, _: &StartSessionRequest) -> Result<StartSessionResponse, ApiError> {
            Ok(StartSessionResponse {
                success: true,
                session_id: Some(SessionId::new("5")),
                message: None,
            })
        }
        fn end_session(&self, _: &SessionId) -> Result<AckResponse, ApiError> {
            Ok(AckResponse {
                success: true,
                message: None,
            })
        }
        fn reopen_session(&self, _: &SessionId) -> Result<AckResponse, ApiError> {
            Ok(AckResponse {
                success: true,
                message: None,
            })
        }
        fn recognize_face(&self, _: &RecognizeRequest) -> Result<RecognizeResponse, ApiError> {
            Ok(RecognizeResponse {
                success: true,
                ..Default::default()
            })
        }
        fn get_attendance(&self, _: &ReportFilter) -> Result<AttendanceReport, ApiError> {
            Ok(AttendanceReport::default())
        }
    }

    fn kiosk() -> Kiosk {
        let config = KioskConfig::default();
        let camera = SyntheticCamera::new("stub://classroom", 64, 48);
        let dispatch = InlineDispatcher::new(Arc::new(Server));
        Kiosk::new(config, Box::new(camera), Box::new(dispatch)).unwrap()
    }

    #[test]
    fn start_waits_for_the_server() {
        let mut kiosk = kiosk();
        let t0 = Instant::now();
        kiosk.start_session(&SessionForm::new("CS-A", "1", Some(1))).unwrap();
        assert_eq!(kiosk.session().state(), SessionState::NoSession);

        let report = kiosk.frame(t0);
        assert_eq!(report.completions, 1);
        assert_eq!(kiosk.session().state(), SessionState::Active);
        assert!(kiosk.stream().is_active());
        assert!(kiosk.poller().is_running());
        assert_eq!(kiosk.view().timer(), Some("01:00"));
    }

    #[test]
    fn countdown_expiry_is_reported_once() {
        let mut kiosk = kiosk();
        let t0 = Instant::now();
        kiosk.start_session(&SessionForm::new("CS-A", "1", Some(1))).unwrap();
        kiosk.frame(t0);
        kiosk.frame(t0 + Duration::from_secs(61));
        assert_eq!(kiosk.view().timer(), Some("00:00"));
        assert!(kiosk.view().timer_expired());
        assert_eq!(
            kiosk.view().notice().unwrap().text,
            "Time Expired. Please End Session."
        );
        assert!(kiosk.time_remaining(t0).is_none());
        // Expiry does not end the session.
        assert_eq!(kiosk.session().state(), SessionState::Active);
    }

    #[test]
    fn surface_follows_the_video_size() {
        let mut kiosk = kiosk();
        let t0 = Instant::now();
        kiosk.start_session(&SessionForm::new("CS-A", "1", None)).unwrap();
        kiosk.frame(t0);
        kiosk.frame(t0 + Duration::from_millis(16));
        assert_eq!(kiosk.surface().size(), (64, 48));
    }

    #[test]
    fn shutdown_releases_the_camera() {
        let mut kiosk = kiosk();
        kiosk.start_session(&SessionForm::new("CS-A", "1", None)).unwrap();
        kiosk.frame(Instant::now());
        kiosk.shutdown();
        assert!(!kiosk.stream().is_active());
        assert!(!kiosk.poller().is_running());
    }
}
