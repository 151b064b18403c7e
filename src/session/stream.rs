use std::time::Instant;
use url::Url;

use super::retry::{RestartCause, RetryPolicy, RetrySchedule};
use crate::camera::{Camera, CameraError, CameraEvent, VideoFrame};
use crate::is_secure_origin;
use crate::view::{NoticeKind, ViewModel};

/// Owns the camera and keeps it alive while a session is live.
///
/// Loss of the stream schedules a bounded restart with the delay of its
/// cause; releasing the camera cancels any pending restart.
pub struct StreamManager {
    camera: Box<dyn Camera>,
    origin: Url,
    retry: RetrySchedule,
    frame_seen: bool,
}

impl StreamManager {
    pub fn new(camera: Box<dyn Camera>, origin: Url, policy: RetryPolicy) -> Self {
        Self {
            camera,
            origin,
            retry: RetrySchedule::new(policy),
            frame_seen: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.camera.is_active()
    }

    pub fn frame(&self) -> Option<VideoFrame> {
        self.camera.frame()
    }

    pub fn restart_pending(&self) -> bool {
        self.retry.is_pending()
    }

    pub fn restart_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    /// The restart budget ran out; only a new session or a frame from the
    /// camera re-arms it.
    pub fn gave_up(&self) -> bool {
        self.retry.is_exhausted()
    }

    pub fn camera(&self) -> &dyn Camera {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> &mut dyn Camera {
        self.camera.as_mut()
    }

    /// Request the camera. `session_live` enables the automatic retry when
    /// acquisition fails; an insecure origin is never retried.
    pub fn acquire(
        &mut self,
        now: Instant,
        session_live: bool,
        view: &mut ViewModel,
    ) -> Result<(), CameraError> {
        if !is_secure_origin(&self.origin) {
            let err = CameraError::InsecureContext(self.origin.to_string());
            log::error!("camera: {}", err);
            self.retry.give_up();
            view.alert("Camera requires Secure Context (HTTPS) or Localhost.");
            return Err(err);
        }
        if self.camera.is_active() {
            return Ok(());
        }
        self.retry.cancel();
        self.frame_seen = false;
        match self.camera.open() {
            Ok(()) => {
                log::info!("camera: acquired {}", self.camera.describe());
                Ok(())
            }
            Err(err) => {
                log::warn!("camera: acquisition failed: {}", err);
                view.show(NoticeKind::Error, format!("Could not access camera: {}", err));
                if session_live {
                    self.schedule(now, RestartCause::AcquisitionFailed, view);
                }
                Err(err)
            }
        }
    }

    /// Acquire for a newly live session with a full restart budget.
    pub fn acquire_for_session(
        &mut self,
        now: Instant,
        session_live: bool,
        view: &mut ViewModel,
    ) -> Result<(), CameraError> {
        self.retry.reset();
        self.acquire(now, session_live, view)
    }

    /// Stop the camera and forget any pending restart.
    pub fn release(&mut self) {
        self.retry.cancel();
        self.retry.reset();
        self.camera.close();
        self.frame_seen = false;
    }

    /// Handle camera events and due restarts. Called once per frame.
    pub fn service(&mut self, now: Instant, session_live: bool, view: &mut ViewModel) {
        while let Some(event) = self.camera.take_event() {
            match event {
                CameraEvent::TrackEnded => {
                    log::warn!("camera: track ended");
                    self.camera.close();
                    if session_live {
                        self.schedule(now, RestartCause::TrackEnded, view);
                    }
                }
                CameraEvent::Error(message) => {
                    log::warn!("camera: device error: {}", message);
                    self.camera.close();
                    if session_live {
                        view.show(NoticeKind::Error, "Camera error. Attempting to restart...");
                        self.schedule(now, RestartCause::DeviceError, view);
                    }
                }
            }
        }

        if !session_live {
            self.retry.cancel();
            return;
        }

        if !self.frame_seen && self.camera.frame().is_some() {
            self.frame_seen = true;
            self.retry.reset();
        }

        if let Some(cause) = self.retry.take_due(now) {
            if !self.camera.is_active() {
                log::info!(
                    "camera: restart attempt {} after {:?}",
                    self.retry.attempts(),
                    cause
                );
                // Failures are surfaced and rescheduled inside `acquire`.
                let _ = self.acquire(now, true, view);
            }
        }
    }

    /// The poller found no stream while a session is live. Restart now unless
    /// a delayed restart is already pending or the budget is spent.
    pub fn request_restart(&mut self, now: Instant, view: &mut ViewModel) {
        if self.camera.is_active() || self.retry.is_pending() || self.retry.is_exhausted() {
            return;
        }
        log::info!("camera: stream lost, restarting");
        let _ = self.acquire(now, true, view);
    }

    fn schedule(&mut self, now: Instant, cause: RestartCause, view: &mut ViewModel) {
        match self.retry.schedule(now, cause) {
            Some(_) => log::info!("camera: restart in {:?}", cause.backoff()),
            None => {
                log::error!("camera: giving up after {} restarts", self.retry.attempts());
                view.alert("Camera could not be restarted. Check the device and start the camera again.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticCamera;
    use std::time::Duration;

    fn manager(url: &str, origin: &str) -> StreamManager {
        StreamManager::new(
            Box::new(SyntheticCamera::new(url, 64, 48)),
            Url::parse(origin).unwrap(),
            RetryPolicy { max_attempts: 2 },
        )
    }

    #[test]
    fn insecure_origin_is_refused_without_retry() {
        let mut stream = manager("stub://classroom", "http://192.168.1.20:5000");
        let mut view = ViewModel::new();
        let err = stream.acquire(Instant::now(), true, &mut view).unwrap_err();
        assert!(matches!(err, CameraError::InsecureContext(_)));
        assert!(!stream.restart_pending());
        stream.request_restart(Instant::now(), &mut view);
        assert_eq!(view.take_alerts().len(), 1);
    }

    #[test]
    fn failed_acquisition_retries_after_three_seconds() {
        let mut stream = manager("stub://denied", "http://localhost:5000");
        let mut view = ViewModel::new();
        let t0 = Instant::now();
        assert!(stream.acquire(t0, true, &mut view).is_err());
        assert!(view.notice().unwrap().text.starts_with("Could not access camera"));
        assert!(stream.restart_pending());
        stream.service(t0 + Duration::from_millis(2999), true, &mut view);
        assert_eq!(stream.restart_attempts(), 1);
        stream.service(t0 + Duration::from_secs(3), true, &mut view);
        assert_eq!(stream.restart_attempts(), 2);
        // Third failure exhausts the budget and alerts.
        stream.service(t0 + Duration::from_secs(6), true, &mut view);
        assert!(!stream.restart_pending());
        assert_eq!(view.take_alerts().len(), 1);
    }

    #[test]
    fn track_end_restarts_after_one_second() {
        let mut view = ViewModel::new();
        let t0 = Instant::now();
        let mut camera = SyntheticCamera::new("stub://classroom", 8, 8);
        camera.open().unwrap();
        camera.inject(CameraEvent::TrackEnded);
        let mut stream = StreamManager::new(
            Box::new(camera),
            Url::parse("https://school.example").unwrap(),
            RetryPolicy { max_attempts: 2 },
        );
        stream.service(t0, true, &mut view);
        assert!(stream.restart_pending());
        stream.service(t0 + Duration::from_secs(1), true, &mut view);
        assert!(stream.is_active());
    }

    #[test]
    fn poller_restarts_stop_once_the_budget_is_spent() {
        let mut stream = manager("stub://denied", "http://localhost:5000");
        let mut view = ViewModel::new();
        let mut now = Instant::now();
        let _ = stream.acquire(now, true, &mut view);
        for _ in 0..40 {
            now += Duration::from_millis(500);
            stream.service(now, true, &mut view);
            stream.request_restart(now, &mut view);
        }
        assert!(stream.gave_up());
        assert_eq!(stream.restart_attempts(), 2);
        assert_eq!(view.take_alerts().len(), 1);

        // A new session starts with a fresh budget.
        let _ = stream.acquire_for_session(now, true, &mut view);
        assert!(!stream.gave_up());
        assert!(stream.restart_pending());
    }

    #[test]
    fn release_cancels_pending_restart() {
        let mut stream = manager("stub://denied", "http://127.0.0.1:5000");
        let mut view = ViewModel::new();
        let t0 = Instant::now();
        let _ = stream.acquire(t0, true, &mut view);
        stream.release();
        assert!(!stream.restart_pending());
    }

    #[test]
    fn no_restart_without_a_live_session() {
        let mut camera = SyntheticCamera::new("stub://classroom", 8, 8);
        camera.open().unwrap();
        camera.inject(CameraEvent::Error("unplugged".into()));
        let mut stream = StreamManager::new(
            Box::new(camera),
            Url::parse("https://school.example").unwrap(),
            RetryPolicy { max_attempts: 2 },
        );
        let mut view = ViewModel::new();
        stream.service(Instant::now(), false, &mut view);
        assert!(!stream.restart_pending());
        assert!(view.notice().is_none());
    }
}
