use std::time::{Duration, Instant};

use crate::api::RecognitionResult;
use crate::Rect;

/// Classification last reported for a face.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectionStatus {
    #[default]
    Unknown,
    Marked,
    Existing,
    LivenessFailed,
}

impl DetectionStatus {
    /// Unrecognised wire values (e.g. `error`) render like `unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "marked" => DetectionStatus::Marked,
            "existing" => DetectionStatus::Existing,
            "liveness_failed" => DetectionStatus::LivenessFailed,
            _ => DetectionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStatus::Unknown => "unknown",
            DetectionStatus::Marked => "marked",
            DetectionStatus::Existing => "existing",
            DetectionStatus::LivenessFailed => "liveness_failed",
        }
    }

    /// Marked now, or already marked earlier in the session.
    pub fn is_credited(&self) -> bool {
        matches!(self, DetectionStatus::Marked | DetectionStatus::Existing)
    }
}

/// One tracked face region.
///
/// `target`, `name`, `status` and `last_seen` are written by the recognition
/// side (`upsert`/`reconcile`); `current` is written only by the renderer
/// (`interpolate`).
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    id: String,
    target: Rect,
    current: Rect,
    name: String,
    status: DetectionStatus,
    last_seen: Instant,
}

impl DetectionBox {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> Rect {
        self.target
    }

    pub fn current(&self) -> Rect {
        self.current
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> DetectionStatus {
        self.status
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Outcome of folding one result batch into the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub upserted: usize,
    pub pruned: usize,
    pub tracked: usize,
}

/// The set of currently tracked boxes, at most one per id.
#[derive(Clone, Debug)]
pub struct BoxStore {
    boxes: Vec<DetectionBox>,
    stale_after: Duration,
}

impl BoxStore {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            boxes: Vec::new(),
            stale_after,
        }
    }

    /// Insert a box, or retarget an existing one.
    ///
    /// New boxes start with `current == target`. Existing boxes keep
    /// `current` so the renderer can glide from it; empty names/statuses do
    /// not overwrite known ones.
    pub fn upsert(
        &mut self,
        id: &str,
        rect: Rect,
        name: Option<&str>,
        status: Option<DetectionStatus>,
        now: Instant,
    ) {
        let name = name.filter(|n| !n.is_empty());
        if let Some(existing) = self.boxes.iter_mut().find(|b| b.id == id) {
            existing.target = rect;
            if let Some(name) = name {
                existing.name = name.to_string();
            }
            if let Some(status) = status {
                existing.status = status;
            }
            existing.last_seen = now;
            return;
        }
        self.boxes.push(DetectionBox {
            id: id.to_string(),
            target: rect,
            current: rect,
            name: name.unwrap_or_default().to_string(),
            status: status.unwrap_or_default(),
            last_seen: now,
        });
    }

    /// Fold a recognition batch into the store.
    ///
    /// Every result with a location is upserted (geometry divided by `scale`),
    /// then boxes older than the staleness window are pruned unless they were
    /// part of this batch.
    pub fn reconcile(
        &mut self,
        results: &[RecognitionResult],
        scale: f32,
        now: Instant,
    ) -> ReconcileStats {
        let mut present: Vec<String> = Vec::with_capacity(results.len());
        for result in results {
            let Some(location) = result.location else {
                continue;
            };
            let rect = Rect::from_location(location, scale);
            let id = box_id(result, &rect);
            self.upsert(&id, rect, result.name(), result.detection_status(), now);
            present.push(id);
        }

        let before = self.boxes.len();
        let stale_after = self.stale_after;
        self.boxes.retain(|b| {
            now.saturating_duration_since(b.last_seen) <= stale_after
                || present.iter().any(|id| id == &b.id)
        });
        let stats = ReconcileStats {
            upserted: present.len(),
            pruned: before - self.boxes.len(),
            tracked: self.boxes.len(),
        };
        log::trace!(
            "overlay reconcile: upserted={} pruned={} tracked={}",
            stats.upserted,
            stats.pruned,
            stats.tracked
        );
        stats
    }

    /// Advance every box's rendered geometry toward its target.
    pub fn interpolate(&mut self, factor: f32) {
        for b in &mut self.boxes {
            b.current.lerp_toward(&b.target, factor);
        }
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    pub fn get(&self, id: &str) -> Option<&DetectionBox> {
        self.boxes.iter().find(|b| b.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectionBox> {
        self.boxes.iter()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// Stable identity for a result: the enrollment number, or name and position
/// when the recognizer did not identify the face.
pub fn box_id(result: &RecognitionResult, rect: &Rect) -> String {
    match result.enrollment() {
        Some(enrollment) => enrollment.to_string(),
        None => format!(
            "{}_{}_{}",
            result.name().unwrap_or("unknown"),
            rect.x,
            rect.y
        ),
    }
}
