use std::time::{Duration, Instant};

use super::capture::encode_frame;
use super::results::{apply_results, BatchSummary, MarkedSet};
use crate::api::{ApiError, RecognizeRequest, RecognizeResponse};
use crate::camera::VideoFrame;
use crate::config::RecognitionSettings;
use crate::overlay::BoxStore;
use crate::view::{NoticeKind, ViewModel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Capturing,
    AwaitingResponse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// A recognition request is still outstanding.
    InFlight,
    /// Not the Nth tick.
    FrameSkip,
    /// Waiting out the backoff after a failed request or camera restart.
    Backoff,
    /// The video has no decoded frame yet.
    NotReady,
    /// The frame could not be encoded.
    Encode,
}

/// What the poll task should do after one tick.
#[derive(Clone, Debug, PartialEq)]
pub enum PollAction {
    /// Not running; nothing is rescheduled.
    Halt,
    Skipped(SkipReason),
    /// The session is live but the stream is gone.
    RestartCamera,
    /// Send this request; report the answer to `complete` with `seq`.
    Submit { seq: u64, request: RecognizeRequest },
}

/// Class/subject the kiosk is recognizing for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionContext {
    pub class_name: String,
    pub subject_id: String,
}

/// Where a completed batch is applied.
pub struct ResultSink<'a> {
    pub store: &'a mut BoxStore,
    pub marked: &'a mut MarkedSet,
    pub view: &'a mut ViewModel,
    /// Detections belong to a reopened (late-marking) session.
    pub late: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// Response for a request that is no longer wanted (stopped or superseded).
    Discarded,
    Applied(BatchSummary),
    /// The server answered but refused the frame.
    Rejected(String),
    /// The poller stopped; the operator must log in again.
    AuthFailed,
    /// Transient failure; polling resumes after the backoff.
    Retrying,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Capture/request loop with frame skipping and single-flight backpressure.
///
/// Sans-IO: `tick` decides whether to capture and returns the request to
/// send; the caller performs the request and hands the answer to `complete`.
#[derive(Debug)]
pub struct RecognitionPoller {
    settings: RecognitionSettings,
    state: PollerState,
    running: bool,
    counter: u32,
    resume_at: Option<Instant>,
    in_flight: Option<InFlight>,
    next_seq: u64,
    stats: PollerStats,
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    seq: u64,
    scale: f32,
}

impl RecognitionPoller {
    pub fn new(settings: RecognitionSettings) -> Self {
        Self {
            settings,
            state: PollerState::Idle,
            running: false,
            counter: 0,
            resume_at: None,
            in_flight: None,
            next_seq: 0,
            stats: PollerStats::default(),
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> PollerStats {
        self.stats
    }

    pub fn start(&mut self) {
        if !self.running {
            log::debug!("poller: started");
        }
        self.running = true;
        self.state = PollerState::Idle;
        self.counter = 0;
        self.resume_at = None;
        self.in_flight = None;
    }

    /// Stop polling. A response still in flight will be discarded.
    pub fn stop(&mut self) {
        if self.running {
            log::debug!("poller: stopped");
        }
        self.running = false;
        self.state = PollerState::Idle;
        self.resume_at = None;
        self.in_flight = None;
    }

    /// One poll tick.
    ///
    /// `context` is `None` once the session id has been cleared, which halts
    /// the loop. `stream_active` says whether the camera holds a stream;
    /// `frame` is its latest decoded frame, if any.
    pub fn tick(
        &mut self,
        now: Instant,
        context: Option<&RecognitionContext>,
        stream_active: bool,
        frame: Option<&VideoFrame>,
    ) -> PollAction {
        if !self.running {
            return PollAction::Halt;
        }
        let Some(context) = context else {
            self.stop();
            return PollAction::Halt;
        };
        if self.state == PollerState::AwaitingResponse {
            return self.skip(SkipReason::InFlight);
        }
        if let Some(resume_at) = self.resume_at {
            if now < resume_at {
                return self.skip(SkipReason::Backoff);
            }
            self.resume_at = None;
        }
        if !stream_active {
            self.resume_at = Some(now + self.settings.error_backoff);
            log::info!("poller: stream lost, requesting camera restart");
            return PollAction::RestartCamera;
        }

        self.counter = (self.counter + 1) % self.settings.frame_skip.max(1);
        if self.counter != 0 {
            return self.skip(SkipReason::FrameSkip);
        }
        let Some(frame) = frame.filter(|f| f.is_ready()) else {
            return self.skip(SkipReason::NotReady);
        };

        self.state = PollerState::Capturing;
        let encoded = match encode_frame(frame, self.settings.max_width, self.settings.jpeg_quality) {
            Ok(encoded) => encoded,
            Err(err) => {
                log::warn!("poller: could not encode frame: {:#}", err);
                self.state = PollerState::Idle;
                return self.skip(SkipReason::Encode);
            }
        };

        self.next_seq += 1;
        let seq = self.next_seq;
        self.in_flight = Some(InFlight {
            seq,
            scale: encoded.scale,
        });
        self.state = PollerState::AwaitingResponse;
        self.stats.submitted += 1;
        log::trace!(
            "poller: submitting frame #{} ({}x{}, scale {:.3})",
            seq,
            encoded.width,
            encoded.height,
            encoded.scale
        );
        PollAction::Submit {
            seq,
            request: RecognizeRequest {
                image: encoded.data_url,
                class_name: context.class_name.clone(),
                subject_id: context.subject_id.clone(),
            },
        }
    }

    /// Apply the answer to request `seq`.
    pub fn complete(
        &mut self,
        seq: u64,
        outcome: Result<RecognizeResponse, ApiError>,
        now: Instant,
        sink: ResultSink<'_>,
    ) -> PollOutcome {
        let in_flight = match self.in_flight {
            Some(in_flight) if self.running && in_flight.seq == seq => in_flight,
            _ => {
                log::debug!("poller: discarding response #{}", seq);
                return PollOutcome::Discarded;
            }
        };
        self.in_flight = None;
        self.state = PollerState::Idle;
        self.stats.completed += 1;

        match outcome {
            Ok(response) if response.success => {
                let stats = sink.store.reconcile(&response.results, in_flight.scale, now);
                if stats.pruned > 0 {
                    log::debug!("overlay: pruned {} stale boxes", stats.pruned);
                }
                let summary = apply_results(&response.results, sink.marked, sink.view, sink.late);
                PollOutcome::Applied(summary)
            }
            Ok(response) => {
                let message = response
                    .error
                    .or(response.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Recognition Error".to_string());
                log::warn!("recognition refused: {}", message);
                sink.view.show(NoticeKind::Error, message.clone());
                PollOutcome::Rejected(message)
            }
            Err(ApiError::Unauthenticated) => {
                log::warn!("recognition: session expired, stopping");
                self.stats.failed += 1;
                self.stop();
                sink.view.require_auth();
                sink.view.alert("Session expired. Please log in again.");
                PollOutcome::AuthFailed
            }
            Err(err) => {
                log::warn!("recognition failed: {}", err);
                self.stats.failed += 1;
                self.resume_at = Some(now + self.settings.error_backoff);
                sink.view.show(NoticeKind::Error, "Connection error. Retrying...");
                PollOutcome::Retrying
            }
        }
    }

    /// Time until the backoff window closes, if one is open.
    pub fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.resume_at
            .map(|at| at.saturating_duration_since(now))
            .filter(|d| !d.is_zero())
    }

    fn skip(&self, reason: SkipReason) -> PollAction {
        log::trace!("poller: skipped tick ({:?})", reason);
        PollAction::Skipped(reason)
    }
}
