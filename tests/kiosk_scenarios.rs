use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use attendance_kiosk::api::{
    AckResponse, ApiError, AttendanceApi, AttendanceReport, RecognizeRequest, RecognizeResponse,
    SessionId, SessionStatus, StartSessionRequest, StartSessionResponse,
};
use attendance_kiosk::camera::SyntheticCamera;
use attendance_kiosk::recognition::PollOutcome;
use attendance_kiosk::runtime::InlineDispatcher;
use attendance_kiosk::{
    Kiosk, KioskConfig, NoticeKind, Rect, ReportFilter, SessionForm, SessionState,
};

/// Attendance server double with scripted recognition answers.
struct FakeApi {
    start: Mutex<StartSessionResponse>,
    status: Mutex<SessionStatus>,
    recognitions: Mutex<VecDeque<Result<RecognizeResponse, ApiError>>>,
    recognize_calls: AtomicUsize,
    requests: Mutex<Vec<RecognizeRequest>>,
}

impl FakeApi {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Mutex::new(StartSessionResponse {
                success: true,
                session_id: Some(SessionId::new("11")),
                message: None,
            }),
            status: Mutex::new(SessionStatus::inactive()),
            recognitions: Mutex::new(VecDeque::new()),
            recognize_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn answer(&self, json: &str) {
        let response: RecognizeResponse = serde_json::from_str(json).unwrap();
        self.recognitions.lock().unwrap().push_back(Ok(response));
    }

    fn fail(&self, err: ApiError) {
        self.recognitions.lock().unwrap().push_back(Err(err));
    }

    fn calls(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }
}

impl AttendanceApi for FakeApi {
    fn session_status(&self) -> Result<SessionStatus, ApiError> {
        Ok(self.status.lock().unwrap().clone())
    }

    fn start_session(&self, _: &StartSessionRequest) -> Result<StartSessionResponse, ApiError> {
        Ok(self.start.lock().unwrap().clone())
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

    fn recognize_face(&self, request: &RecognizeRequest) -> Result<RecognizeResponse, ApiError> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.recognitions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(RecognizeResponse {
                    success: true,
                    ..Default::default()
                })
            })
    }

    fn get_attendance(&self, _: &ReportFilter) -> Result<AttendanceReport, ApiError> {
        Ok(AttendanceReport::default())
    }
}

const ALICE: &str = r#"{"success": true, "results": [
    {"enrollment": "E1", "name": "Alice", "status": "marked",
     "message": "Marked Present", "location": [100, 200, 150, 120]}
]}"#;

/// Drives the kiosk one 16ms frame at a time.
struct Harness {
    kiosk: Kiosk,
    now: Instant,
}

impl Harness {
    fn new(api: &Arc<FakeApi>) -> Self {
        // 1600px wide video is sent at 800px, i.e. scale 0.5.
        let camera = SyntheticCamera::new("stub://classroom", 1600, 400);
        Self::with(api, KioskConfig::default(), camera)
    }

    fn with(api: &Arc<FakeApi>, config: KioskConfig, camera: SyntheticCamera) -> Self {
        let dispatch = InlineDispatcher::new(api.clone());
        let kiosk = Kiosk::new(config, Box::new(camera), Box::new(dispatch)).expect("kiosk");
        Self {
            kiosk,
            now: Instant::now(),
        }
    }

    fn frame(&mut self) -> attendance_kiosk::runtime::FrameReport {
        self.now += Duration::from_millis(16);
        self.kiosk.frame(self.now)
    }

    fn frames(&mut self, n: usize) {
        for _ in 0..n {
            self.frame();
        }
    }

    fn start(&mut self) {
        self.kiosk
            .start_session(&SessionForm::new("CS-A", "12", Some(15)))
            .unwrap();
        self.frame();
        assert_eq!(self.kiosk.session().state(), SessionState::Active);
    }
}

#[test]
fn credited_student_is_logged_once_with_scaled_box() {
    let api = FakeApi::new();
    api.answer(ALICE);
    api.answer(ALICE);
    let mut h = Harness::new(&api);
    h.start();

    // Frame skip 2: one capture every other frame, answered the frame after.
    h.frames(2);
    assert_eq!(api.calls(), 1);
    assert_eq!(h.kiosk.view().notice().unwrap().text, "Alice ✓");
    h.frames(2);
    assert_eq!(api.calls(), 2);

    let tracked: Vec<_> = h.kiosk.store().iter().collect();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].target(), Rect::new(240.0, 200.0, 160.0, 100.0));
    assert_eq!(tracked[0].name(), "Alice");

    let log: Vec<_> = h.kiosk.view().log().collect();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].headline(), "Alice (E1)");
    assert!(!log[0].late);

    let requests = api.requests.lock().unwrap();
    assert!(requests[0].image.starts_with("data:image/jpeg;base64,"));
    assert_eq!(requests[0].class_name, "CS-A");
    assert_eq!(requests[0].subject_id, "12");
}

#[test]
fn ending_clears_the_overlay_and_halts_recognition() {
    let api = FakeApi::new();
    api.answer(
        r#"{"success": true, "results": [
            {"enrollment": "E1", "name": "Alice", "status": "marked", "location": [0, 50, 50, 0]},
            {"enrollment": "E2", "name": "Bob", "status": "existing", "location": [0, 150, 50, 100]},
            {"status": "unknown", "location": [0, 250, 50, 200]}
        ]}"#,
    );
    let mut h = Harness::new(&api);
    h.start();
    h.frames(2);
    assert_eq!(h.kiosk.store().len(), 3);

    h.kiosk.end_session().unwrap();
    let report = h.frame();
    assert_eq!(h.kiosk.session().state(), SessionState::Ended);
    assert!(h.kiosk.store().is_empty());
    assert_eq!(report.painted, 0);
    assert_eq!(
        h.kiosk.view().notice().unwrap().text,
        "Session Ended. Absentees Marked."
    );
    assert!(!h.kiosk.stream().is_active());

    let calls = api.calls();
    for _ in 0..20 {
        assert_eq!(h.frame().submitted, None);
    }
    assert_eq!(api.calls(), calls);
}

#[test]
fn refused_start_changes_nothing() {
    let api = FakeApi::new();
    *api.start.lock().unwrap() = StartSessionResponse {
        success: false,
        session_id: None,
        message: Some("Subject is not assigned to you".into()),
    };
    let mut h = Harness::new(&api);
    h.kiosk
        .start_session(&SessionForm::new("CS-A", "12", None))
        .unwrap();
    h.frames(5);

    assert_eq!(h.kiosk.session().state(), SessionState::NoSession);
    assert!(!h.kiosk.stream().is_active());
    assert!(h.kiosk.view().timer().is_none());
    assert!(h.kiosk.time_remaining(h.now).is_none());
    assert_eq!(
        h.kiosk.view_mut().take_alerts(),
        vec!["Error starting session: Subject is not assigned to you"]
    );
    assert_eq!(api.calls(), 0);
}

#[test]
fn expired_login_stops_everything() {
    let api = FakeApi::new();
    api.fail(ApiError::Unauthenticated);
    let mut h = Harness::new(&api);
    h.start();
    h.frame();
    let report = h.frame();

    assert_eq!(report.outcomes, vec![PollOutcome::AuthFailed]);
    assert!(h.kiosk.view().auth_required());
    assert!(!h.kiosk.poller().is_running());
    assert!(!h.kiosk.stream().is_active());
    h.frames(10);
    assert_eq!(api.calls(), 1);
}

#[test]
fn transient_failure_backs_off() {
    let api = FakeApi::new();
    api.fail(ApiError::Transport("connection reset".into()));
    let mut h = Harness::new(&api);
    h.start();
    h.frames(2);
    let notice = h.kiosk.view().notice().unwrap();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.text, "Connection error. Retrying...");

    // 500ms backoff: nothing is sent for the next ~30 frames.
    h.frames(25);
    assert_eq!(api.calls(), 1);
    h.frames(10);
    assert_eq!(api.calls(), 2);
    assert!(h.kiosk.poller().is_running());
}

#[test]
fn reopened_session_logs_late_marks_only_for_new_students() {
    let api = FakeApi::new();
    api.answer(ALICE);
    let mut h = Harness::new(&api);
    h.start();
    h.frames(2);
    assert_eq!(h.kiosk.view().log_len(), 1);

    h.kiosk.end_session().unwrap();
    h.frame();
    h.kiosk.reopen_session().unwrap();
    h.frame();
    assert_eq!(h.kiosk.session().state(), SessionState::Reopened);
    assert_eq!(h.kiosk.view().timer(), Some("--:--"));
    assert!(h.kiosk.stream().is_active());

    api.answer(
        r#"{"success": true, "results": [
            {"enrollment": "E1", "name": "Alice", "status": "existing", "location": [0, 50, 50, 0]},
            {"enrollment": "E2", "name": "Bob", "status": "marked", "location": [0, 150, 50, 100]}
        ]}"#,
    );
    h.frames(4);
    let log: Vec<_> = h.kiosk.view().log().collect();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].headline(), "Bob (E2)");
    assert!(log[0].late);
}

#[test]
fn running_session_is_adopted_at_startup() {
    let api = FakeApi::new();
    *api.status.lock().unwrap() = serde_json::from_str(
        r#"{"active": true, "session_id": 21, "class_name": "CS-B",
            "subject_id": 4, "status": "Active", "remaining_minutes": 2}"#,
    )
    .unwrap();
    let mut h = Harness::new(&api);
    h.kiosk.check_session_status().unwrap();
    h.frame();

    assert_eq!(h.kiosk.session().state(), SessionState::Active);
    assert_eq!(h.kiosk.session().session_id().unwrap().as_str(), "21");
    assert!(h.kiosk.poller().is_running());
    assert_eq!(h.kiosk.view().timer(), Some("02:00"));
    h.frames(2);
    assert_eq!(api.requests.lock().unwrap()[0].class_name, "CS-B");
}

#[test]
fn denied_camera_is_retried_a_bounded_number_of_times() {
    let api = FakeApi::new();
    let mut config = KioskConfig::default();
    config.camera.retry_attempts = 2;
    let camera = SyntheticCamera::new("stub://denied", 640, 480);
    let mut h = Harness::with(&api, config, camera);
    h.kiosk
        .start_session(&SessionForm::new("CS-A", "12", Some(15)))
        .unwrap();

    // Thirty seconds of frames.
    let mut restart_requests = 0;
    for _ in 0..1800 {
        if h.frame().restart_requested {
            restart_requests += 1;
        }
    }

    assert_eq!(h.kiosk.session().state(), SessionState::Active);
    assert!(restart_requests > 0);
    assert!(h.kiosk.stream().gave_up());
    assert_eq!(h.kiosk.stream().restart_attempts(), 2);
    let gave_up: Vec<_> = h
        .kiosk
        .view_mut()
        .take_alerts()
        .into_iter()
        .filter(|a| a.starts_with("Camera could not be restarted"))
        .collect();
    assert_eq!(gave_up.len(), 1);
    assert_eq!(api.calls(), 0);
}
