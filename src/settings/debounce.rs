use log::{debug, error};
use tokio::time::{Duration, Instant};

use crate::error::ExplorerResult;

use super::{SettingsDocument, SettingsSink};

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(500);

/// A single cancellable, re-armable deadline.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arms the timer for `now + delay`, replacing any pending deadline.
    /// Returns true when a pending deadline was cancelled.
    pub fn schedule(&mut self, now: Instant) -> bool {
        self.deadline.replace(now + self.delay).is_some()
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarms and returns true once the deadline has passed.
    pub fn take_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Coalesces bursts of settings changes into one write after a quiet period.
pub struct SettingsPersister<S: SettingsSink> {
    sink: S,
    timer: Debouncer,
}

impl<S: SettingsSink> SettingsPersister<S> {
    pub fn new(sink: S, delay: Duration) -> Self {
        Self {
            sink,
            timer: Debouncer::new(delay),
        }
    }

    pub fn schedule_save(&mut self, now: Instant) {
        if self.timer.schedule(now) {
            debug!("Settings save re-armed");
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }

    /// Writes the snapshot if the quiet period is over.
    ///
    /// The snapshot is only taken when a write actually happens. Returns
    /// whether a write was attempted. Failures are logged; the next
    /// [`schedule_save`](Self::schedule_save) retries.
    pub fn poll<F>(&mut self, now: Instant, snapshot: F) -> bool
    where
        F: FnOnce() -> SettingsDocument,
    {
        if !self.timer.take_if_due(now) {
            return false;
        }
        if let Err(err) = self.sink.write(&snapshot()) {
            error!("{err}; will retry on the next change");
        }
        true
    }

    /// Bypasses the timer, cancelling any pending save.
    pub fn save_now(&mut self, document: &SettingsDocument) -> ExplorerResult<()> {
        self.timer.cancel();
        self.sink.write(document)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
