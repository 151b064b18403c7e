use std::time::{Duration, Instant};

/// Why a camera restart was scheduled. Each cause has its own fixed delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartCause {
    TrackEnded,
    DeviceError,
    AcquisitionFailed,
}

impl RestartCause {
    pub fn backoff(&self) -> Duration {
        match self {
            RestartCause::TrackEnded => Duration::from_secs(1),
            RestartCause::DeviceError => Duration::from_secs(2),
            RestartCause::AcquisitionFailed => Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Restarts allowed before giving up; `0` disables automatic restarts.
    pub max_attempts: u32,
}

/// A single cancellable pending retry plus the attempt budget.
#[derive(Debug)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts: u32,
    pending: Option<(Instant, RestartCause)>,
    exhausted: bool,
}

impl RetrySchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            pending: None,
            exhausted: false,
        }
    }

    /// Schedule a retry, replacing any pending one. Returns the due time, or
    /// `None` once the attempt budget is spent.
    pub fn schedule(&mut self, now: Instant, cause: RestartCause) -> Option<Instant> {
        self.pending = None;
        if self.attempts >= self.policy.max_attempts {
            self.exhausted = true;
            return None;
        }
        self.attempts += 1;
        let at = now + cause.backoff();
        self.pending = Some((at, cause));
        Some(at)
    }

    /// Pop the pending retry if it is due.
    pub fn take_due(&mut self, now: Instant) -> Option<RestartCause> {
        match self.pending {
            Some((at, cause)) if now >= at => {
                self.pending = None;
                Some(cause)
            }
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Refuse further retries until `reset`.
    pub fn give_up(&mut self) {
        self.pending = None;
        self.exhausted = true;
    }

    /// True once a retry was refused for lack of budget, until `reset`.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The stream recovered; the full budget is available again.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_the_cause_backoff() {
        let mut retry = RetrySchedule::new(RetryPolicy { max_attempts: 3 });
        let t0 = Instant::now();
        retry.schedule(t0, RestartCause::DeviceError);
        assert_eq!(retry.take_due(t0 + Duration::from_millis(1999)), None);
        assert_eq!(
            retry.take_due(t0 + Duration::from_secs(2)),
            Some(RestartCause::DeviceError)
        );
        assert!(!retry.is_pending());
    }

    #[test]
    fn rescheduling_replaces_the_pending_retry() {
        let mut retry = RetrySchedule::new(RetryPolicy { max_attempts: 5 });
        let t0 = Instant::now();
        retry.schedule(t0, RestartCause::AcquisitionFailed);
        retry.schedule(t0, RestartCause::TrackEnded);
        assert_eq!(
            retry.take_due(t0 + Duration::from_secs(1)),
            Some(RestartCause::TrackEnded)
        );
        assert_eq!(retry.take_due(t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn budget_is_bounded_until_reset() {
        let mut retry = RetrySchedule::new(RetryPolicy { max_attempts: 2 });
        let t0 = Instant::now();
        assert!(retry.schedule(t0, RestartCause::TrackEnded).is_some());
        assert!(retry.schedule(t0, RestartCause::TrackEnded).is_some());
        assert!(!retry.is_exhausted());
        assert!(retry.schedule(t0, RestartCause::TrackEnded).is_none());
        assert!(retry.is_exhausted());
        retry.reset();
        assert!(!retry.is_exhausted());
        assert!(retry.schedule(t0, RestartCause::TrackEnded).is_some());
    }

    #[test]
    fn cancel_drops_the_pending_retry() {
        let mut retry = RetrySchedule::new(RetryPolicy { max_attempts: 2 });
        let t0 = Instant::now();
        retry.schedule(t0, RestartCause::TrackEnded);
        retry.cancel();
        assert_eq!(retry.take_due(t0 + Duration::from_secs(10)), None);
    }
}
