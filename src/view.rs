//! Typed view model.
//!
//! The core components write user-facing state here; the console adapter in
//! `ui` (or any other front end) reflects it. Every mutation bumps
//! `revision` so adapters can redraw only on change.

use std::collections::VecDeque;
use std::time::SystemTime;

use crate::overlay::DetectionStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
    Warning,
}

/// Transient status line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

/// One attendance log line.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub name: String,
    pub enrollment: String,
    /// Server message for the detection, e.g. "Marked Present".
    pub message: String,
    /// `Marked` for a fresh mark, `Existing` for an earlier one.
    pub status: DetectionStatus,
    /// Captured while the session was reopened for late marking.
    pub late: bool,
    pub recorded_at: SystemTime,
}

impl LogEntry {
    /// `Alice (E1)`
    pub fn headline(&self) -> String {
        format!("{} ({})", self.name, self.enrollment)
    }
}

/// Session badge shown next to the timer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Badge {
    #[default]
    Hidden,
    Active,
    Reopened,
    Ended,
}

impl Badge {
    pub fn label(&self) -> &'static str {
        match self {
            Badge::Hidden => "",
            Badge::Active => "Active",
            Badge::Reopened => "Reopened (Late Marking)",
            Badge::Ended => "Ended",
        }
    }
}

#[derive(Debug, Default)]
pub struct ViewModel {
    notice: Option<Notice>,
    alerts: VecDeque<String>,
    log: VecDeque<LogEntry>,
    timer: Option<String>,
    timer_expired: bool,
    badge: Badge,
    form_locked: bool,
    auth_required: bool,
    revision: u64,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn show(&mut self, kind: NoticeKind, text: impl Into<String>) {
        let text = text.into();
        let next = Notice { kind, text };
        if self.notice.as_ref() != Some(&next) {
            self.notice = Some(next);
            self.bump();
        }
    }

    pub fn clear_notice(&mut self) {
        if self.notice.take().is_some() {
            self.bump();
        }
    }

    /// Blocking message the operator must acknowledge.
    pub fn alert(&mut self, text: impl Into<String>) {
        self.alerts.push_back(text.into());
        self.bump();
    }

    pub fn pending_alerts(&self) -> impl Iterator<Item = &String> {
        self.alerts.iter()
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        self.alerts.drain(..).collect()
    }

    /// Newest entry first.
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.log.push_front(entry);
        self.bump();
    }

    /// `MM:SS`, `--:--` while reopened, or `None` with no countdown.
    pub fn timer(&self) -> Option<&str> {
        self.timer.as_deref()
    }

    pub fn timer_expired(&self) -> bool {
        self.timer_expired
    }

    pub fn set_timer(&mut self, display: Option<String>, expired: bool) {
        if self.timer != display || self.timer_expired != expired {
            self.timer = display;
            self.timer_expired = expired;
            self.bump();
        }
    }

    pub fn badge(&self) -> Badge {
        self.badge
    }

    pub fn set_badge(&mut self, badge: Badge) {
        if self.badge != badge {
            self.badge = badge;
            self.bump();
        }
    }

    /// Class/subject/duration inputs are read-only while a session runs.
    pub fn form_locked(&self) -> bool {
        self.form_locked
    }

    pub fn set_form_locked(&mut self, locked: bool) {
        if self.form_locked != locked {
            self.form_locked = locked;
            self.bump();
        }
    }

    /// The server rejected our credentials; the operator must log in again.
    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    pub fn require_auth(&mut self) {
        if !self.auth_required {
            self.auth_required = true;
            self.bump();
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> LogEntry {
        LogEntry {
            name: name.to_string(),
            enrollment: "E1".to_string(),
            message: "Marked Present".to_string(),
            status: DetectionStatus::Marked,
            late: false,
            recorded_at: SystemTime::now(),
        }
    }

    #[test]
    fn log_is_newest_first() {
        let mut view = ViewModel::new();
        view.push_log(entry("Alice"));
        view.push_log(entry("Bob"));
        let names: Vec<_> = view.log().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Alice"]);
        assert_eq!(view.log().last().unwrap().headline(), "Alice (E1)");
    }

    #[test]
    fn revision_only_moves_on_change() {
        let mut view = ViewModel::new();
        view.show(NoticeKind::Info, "hello");
        let rev = view.revision();
        view.show(NoticeKind::Info, "hello");
        assert_eq!(view.revision(), rev);
        view.clear_notice();
        assert!(view.revision() > rev);
    }

    #[test]
    fn alerts_drain_in_order() {
        let mut view = ViewModel::new();
        view.alert("one");
        view.alert("two");
        assert_eq!(view.take_alerts(), vec!["one", "two"]);
        assert_eq!(view.pending_alerts().count(), 0);
    }
}
