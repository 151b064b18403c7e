//! Console front end: stage spinners for one-shot commands and a line-based
//! reflection of the [`ViewModel`] for the kiosk loop.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::view::{Badge, NoticeKind, ViewModel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    /// Spinner (or a plain `==>` line) for one blocking step such as
    /// "Checking session" or "Downloading export".
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Prints what changed in a [`ViewModel`] since the last call.
///
/// Alerts are consumed; everything else is compared with what was printed
/// before, so calling this every frame only writes on change.
#[derive(Debug, Default)]
pub struct ConsoleView {
    revision: Option<u64>,
    notice: Option<String>,
    timer: Option<String>,
    badge: Badge,
    logged: usize,
    auth_reported: bool,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render<W: Write>(&mut self, view: &mut ViewModel, out: &mut W) -> io::Result<()> {
        for alert in view.take_alerts() {
            writeln!(out, "!! {}", alert)?;
        }
        if self.revision == Some(view.revision()) {
            return Ok(());
        }
        self.revision = Some(view.revision());

        let notice = view
            .notice()
            .map(|n| format!("[{}] {}", notice_tag(n.kind), n.text));
        if notice != self.notice {
            if let Some(line) = &notice {
                writeln!(out, "{}", line)?;
            }
            self.notice = notice;
        }

        if view.badge() != self.badge {
            self.badge = view.badge();
            if self.badge != Badge::Hidden {
                writeln!(out, "session: {}", self.badge.label())?;
            }
        }

        let timer = view.timer().map(str::to_string);
        if timer != self.timer {
            if let Some(display) = &timer {
                let suffix = if view.timer_expired() { " (expired)" } else { "" };
                writeln!(out, "timer: {}{}", display, suffix)?;
            }
            self.timer = timer;
        }

        // The log is newest first; print what was added oldest first.
        let total = view.log_len();
        if total > self.logged {
            let fresh: Vec<_> = view.log().take(total - self.logged).collect();
            for entry in fresh.into_iter().rev() {
                let late = if entry.late { " [late]" } else { "" };
                writeln!(out, "+ {} {}{}", entry.headline(), entry.message, late)?;
            }
        }
        self.logged = total;

        if view.auth_required() && !self.auth_reported {
            self.auth_reported = true;
            writeln!(out, "login required; restart the kiosk after signing in")?;
        }
        Ok(())
    }
}

fn notice_tag(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Success => "ok",
        NoticeKind::Error => "error",
        NoticeKind::Info => "info",
        NoticeKind::Warning => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::DetectionStatus;
    use crate::view::LogEntry;
    use std::time::SystemTime;

    fn entry(name: &str, enrollment: &str) -> LogEntry {
        LogEntry {
            name: name.into(),
            enrollment: enrollment.into(),
            message: "Marked Present".into(),
            status: DetectionStatus::Marked,
            late: false,
            recorded_at: SystemTime::now(),
        }
    }

    fn rendered(console: &mut ConsoleView, view: &mut ViewModel) -> String {
        let mut out = Vec::new();
        console.render(view, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_only_changes() {
        let mut console = ConsoleView::new();
        let mut view = ViewModel::new();
        view.show(NoticeKind::Success, "Session Started");
        view.set_timer(Some("10:00".into()), false);
        let first = rendered(&mut console, &mut view);
        assert!(first.contains("[ok] Session Started"));
        assert!(first.contains("timer: 10:00"));
        assert_eq!(rendered(&mut console, &mut view), "");
    }

    #[test]
    fn log_entries_print_in_arrival_order() {
        let mut console = ConsoleView::new();
        let mut view = ViewModel::new();
        view.push_log(entry("Alice", "E1"));
        view.push_log(entry("Bob", "E2"));
        let out = rendered(&mut console, &mut view);
        let alice = out.find("Alice (E1)").unwrap();
        let bob = out.find("Bob (E2)").unwrap();
        assert!(alice < bob);
    }

    #[test]
    fn alerts_are_consumed() {
        let mut console = ConsoleView::new();
        let mut view = ViewModel::new();
        view.alert("Please select class and subject first");
        assert!(rendered(&mut console, &mut view).contains("!! Please select"));
        assert!(view.take_alerts().is_empty());
    }

    #[test]
    fn plain_mode_never_spins() {
        let ui = Ui::from_args(Some("plain"), true, false);
        assert!(!ui.pretty());
        let ui = Ui::from_args(None, true, true);
        assert!(!ui.pretty());
        assert!(Ui::from_args(Some("pretty"), true, true).pretty());
    }
}
