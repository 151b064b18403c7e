//! Session lifecycle, countdown and camera stream recovery.

mod lifecycle;
mod retry;
mod stream;
mod timer;

pub use lifecycle::{Effect, PendingRequest, SessionForm, SessionManager, SessionState};
pub use retry::{RestartCause, RetryPolicy, RetrySchedule};
pub use stream::StreamManager;
pub use timer::{format_mm_ss, Countdown, CountdownTick};
