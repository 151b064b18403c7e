use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::api::{
    AckResponse, ApiError, AttendanceApi, RecognizeRequest, RecognizeResponse, SessionId,
    SessionStatus, StartSessionRequest, StartSessionResponse,
};

/// A network call the frame loop wants made.
#[derive(Clone, Debug)]
pub enum ApiJob {
    Status,
    Start(StartSessionRequest),
    End(SessionId),
    Reopen(SessionId),
    Recognize { seq: u64, request: RecognizeRequest },
}

/// The answer to an [`ApiJob`].
#[derive(Clone, Debug)]
pub enum ApiCompletion {
    Status(Result<SessionStatus, ApiError>),
    Start(Result<StartSessionResponse, ApiError>),
    End(Result<AckResponse, ApiError>),
    Reopen(Result<AckResponse, ApiError>),
    Recognize {
        seq: u64,
        result: Result<RecognizeResponse, ApiError>,
    },
}

/// Runs API jobs off the frame loop.
///
/// Completions are collected with `poll` at the start of each frame; a job
/// never completes inside the frame that submitted it.
pub trait Dispatch {
    fn submit(&mut self, job: ApiJob);

    fn poll(&mut self) -> Vec<ApiCompletion>;

    /// Jobs submitted and not yet returned by `poll`.
    fn in_flight(&self) -> usize;
}

pub fn execute(api: &dyn AttendanceApi, job: ApiJob) -> ApiCompletion {
    match job {
        ApiJob::Status => ApiCompletion::Status(api.session_status()),
        ApiJob::Start(request) => ApiCompletion::Start(api.start_session(&request)),
        ApiJob::End(id) => ApiCompletion::End(api.end_session(&id)),
        ApiJob::Reopen(id) => ApiCompletion::Reopen(api.reopen_session(&id)),
        ApiJob::Recognize { seq, request } => ApiCompletion::Recognize {
            seq,
            result: api.recognize_face(&request),
        },
    }
}

/// Executes jobs on a background worker thread, in submission order.
pub struct ThreadDispatcher {
    jobs: Option<Sender<ApiJob>>,
    done: Receiver<ApiCompletion>,
    worker: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl ThreadDispatcher {
    pub fn spawn(api: Arc<dyn AttendanceApi>) -> std::io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<ApiJob>();
        let (done_tx, done_rx) = mpsc::channel::<ApiCompletion>();
        let worker = std::thread::Builder::new()
            .name("kiosk-api".to_string())
            .spawn(move || {
                for job in job_rx {
                    if done_tx.send(execute(api.as_ref(), job)).is_err() {
                        break;
                    }
                }
                log::debug!("api worker stopped");
            })?;
        Ok(Self {
            jobs: Some(job_tx),
            done: done_rx,
            worker: Some(worker),
            in_flight: 0,
        })
    }
}

impl Dispatch for ThreadDispatcher {
    fn submit(&mut self, job: ApiJob) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        if jobs.send(job).is_err() {
            log::error!("api worker is gone; job dropped");
            return;
        }
        self.in_flight += 1;
    }

    fn poll(&mut self) -> Vec<ApiCompletion> {
        let mut out = Vec::new();
        loop {
            match self.done.try_recv() {
                Ok(completion) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    out.push(completion);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.in_flight = 0;
                    break;
                }
            }
        }
        out
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        // Closing the job channel ends the worker after its current call.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

/// Executes jobs synchronously at submission; results surface on the next
/// `poll`. Deterministic, for tests and one-shot tools.
pub struct InlineDispatcher {
    api: Arc<dyn AttendanceApi>,
    ready: VecDeque<ApiCompletion>,
}

impl InlineDispatcher {
    pub fn new(api: Arc<dyn AttendanceApi>) -> Self {
        Self {
            api,
            ready: VecDeque::new(),
        }
    }
}

impl Dispatch for InlineDispatcher {
    fn submit(&mut self, job: ApiJob) {
        self.ready.push_back(execute(self.api.as_ref(), job));
    }

    fn poll(&mut self) -> Vec<ApiCompletion> {
        self.ready.drain(..).collect()
    }

    fn in_flight(&self) -> usize {
        self.ready.len()
    }
}
