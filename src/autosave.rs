use std::time::{Duration, Instant};

/// Debounced-save scheduler for the routine editor. Edits mark the
/// scheduler dirty and re-arm a deadline; a flush is owed once the deadline
/// passes with no further edits, so bursts coalesce into one save. The
/// component is clock-agnostic: callers pass `now`, which keeps it
/// testable without sleeping.
#[derive(Debug)]
pub struct SaveScheduler {
    delay: Duration,
    deadline: Option<Instant>,
}

pub const AUTOSAVE_DELAY: Duration = Duration::from_secs(2);

impl SaveScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn mark_dirty(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_dirty(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline.map(|d| now >= d).unwrap_or(false)
    }

    /// Clear the pending deadline after a successful save.
    pub fn flush(&mut self) {
        self.deadline = None;
    }
}
