use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_secs(1);

/// Result of a due countdown tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountdownTick {
    /// Time left, formatted `MM:SS`.
    Remaining(String),
    /// The countdown passed zero. Reported once.
    Expired,
}

/// Per-second session countdown.
///
/// Expiry only reports; ending the session stays an explicit action.
#[derive(Clone, Debug)]
pub struct Countdown {
    ends_at: Instant,
    next_tick: Instant,
    expired: bool,
}

impl Countdown {
    pub fn start(now: Instant, duration: Duration) -> Self {
        Self {
            ends_at: now + duration,
            next_tick: now + TICK,
            expired: false,
        }
    }

    /// Start from a server-reported remaining time in (possibly fractional)
    /// minutes. Negative values count as zero.
    pub fn from_minutes(now: Instant, minutes: f64) -> Self {
        let secs = if minutes.is_finite() { (minutes * 60.0).max(0.0) } else { 0.0 };
        Self::start(now, Duration::from_secs_f64(secs))
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.ends_at.saturating_duration_since(now)
    }

    pub fn display(&self, now: Instant) -> String {
        format_mm_ss(self.remaining(now))
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Advance the countdown. Returns `None` until a full second has passed
    /// since the previous tick, and for ever after expiry was reported.
    pub fn poll(&mut self, now: Instant) -> Option<CountdownTick> {
        if self.expired || now < self.next_tick {
            return None;
        }
        while self.next_tick <= now {
            self.next_tick += TICK;
        }
        if now > self.ends_at {
            self.expired = true;
            return Some(CountdownTick::Expired);
        }
        Some(CountdownTick::Remaining(self.display(now)))
    }
}

/// `MM:SS`, with minutes counting past 59 for long sessions.
pub fn format_mm_ss(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
