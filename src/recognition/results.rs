use std::collections::HashSet;
use std::time::SystemTime;

use crate::api::RecognitionResult;
use crate::overlay::DetectionStatus;
use crate::view::{LogEntry, NoticeKind, ViewModel};

/// Enrollment ids already credited in this kiosk's lifetime.
///
/// Deliberately not reset when a session ends or is reopened, so a student
/// credited before a reopen is not logged twice.
#[derive(Debug, Default)]
pub struct MarkedSet {
    ids: HashSet<String>,
}

impl MarkedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `id` was not yet present.
    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// What one result batch produced for the operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub newly_credited: Vec<String>,
    pub liveness_failed: usize,
    pub unknown: usize,
}

/// Log new credits and set the status line for one batch.
///
/// A `marked`/`existing` face is logged once per enrollment id; a liveness
/// failure asks the student to try again; unknown faces are only counted when
/// nothing else happened.
pub fn apply_results(
    results: &[RecognitionResult],
    marked: &mut MarkedSet,
    view: &mut ViewModel,
    late: bool,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    if results.is_empty() {
        view.clear_notice();
        return summary;
    }

    let mut parts: Vec<String> = Vec::new();
    for result in results {
        match result.detection_status() {
            Some(status @ (DetectionStatus::Marked | DetectionStatus::Existing)) => {
                let Some(key) = result.enrollment().or_else(|| result.name()) else {
                    log::debug!("credited face without enrollment or name; not logged");
                    continue;
                };
                if !marked.insert(key) {
                    continue;
                }
                let name = result.name().unwrap_or("Unknown");
                log::info!("attendance: {} ({}) {}", name, key, status.as_str());
                view.push_log(LogEntry {
                    name: name.to_string(),
                    enrollment: result.enrollment().unwrap_or("-").to_string(),
                    message: result.message.clone().unwrap_or_default(),
                    status,
                    late,
                    recorded_at: SystemTime::now(),
                });
                parts.push(format!("{} ✓", name));
                summary.newly_credited.push(key.to_string());
            }
            Some(DetectionStatus::LivenessFailed) => {
                summary.liveness_failed += 1;
                parts.push("Please Smile".to_string());
            }
            _ => {
                if result.status.as_deref() == Some("unknown") {
                    summary.unknown += 1;
                }
            }
        }
    }

    if !parts.is_empty() {
        view.show(NoticeKind::Success, parts.join(", "));
    } else if summary.unknown > 0 {
        view.show(
            NoticeKind::Error,
            format!("{} Face(s) Detected (Unknown)", summary.unknown),
        );
    } else {
        view.clear_notice();
    }
    summary
}
