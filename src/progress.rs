//! Progress reporting for long write passes.
//!
//! Reporters are injected (`Arc<dyn ProgressReporter>`); [`NoProgress`] is the
//! default and does nothing.
//!
//! ```
//! use ironshard::progress::{CountingProgress, LogProgress, ProgressReporter};
//!
//! let progress = LogProgress::new(1000);
//! progress.start("train", Some(2500));
//! progress.advance(2500);
//! progress.finish();
//! assert_eq!(progress.reports(), 2);
//!
//! let counting = CountingProgress::new();
//! counting.advance(3);
//! assert_eq!(counting.snapshot().advanced, 3);
//! ```

use log::info;
use std::sync::{Arc, Mutex};

/// Receives progress of one unit of work at a time.
pub trait ProgressReporter: Send + Sync {
    /// A task with an optional known total starts.
    fn start(&self, label: &str, total: Option<u64>);
    /// `n` more items are done.
    fn advance(&self, n: u64);
    /// The current task is complete.
    fn finish(&self);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _label: &str, _total: Option<u64>) {}
    fn advance(&self, _n: u64) {}
    fn finish(&self) {}
}

/// Logs progress at `info` level every `stride` items.
pub struct LogProgress {
    stride: u64,
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    label: String,
    total: Option<u64>,
    done: u64,
    next_report: u64,
    reports: u64,
}

impl LogProgress {
    #[must_use]
    pub fn new(stride: u64) -> Self {
        Self {
            stride: stride.max(1),
            state: Mutex::new(LogState::default()),
        }
    }

    /// Items done in the current task.
    ///
    /// # Panics
    /// If the internal lock is poisoned.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.state.lock().unwrap().done
    }

    /// Lines logged for the current task, the final `done` line included.
    ///
    /// # Panics
    /// If the internal lock is poisoned.
    #[must_use]
    pub fn reports(&self) -> u64 {
        self.state.lock().unwrap().reports
    }
}

impl ProgressReporter for LogProgress {
    fn start(&self, label: &str, total: Option<u64>) {
        let mut s = self.state.lock().unwrap();
        *s = LogState {
            label: label.to_string(),
            total,
            done: 0,
            next_report: self.stride,
            reports: 0,
        };
    }

    fn advance(&self, n: u64) {
        let mut s = self.state.lock().unwrap();
        s.done += n;
        if s.done >= s.next_report {
            match s.total {
                Some(total) => info!("{}: {}/{total}", s.label, s.done),
                None => info!("{}: {}", s.label, s.done),
            }
            s.next_report = (s.done / self.stride + 1) * self.stride;
            s.reports += 1;
        }
    }

    fn finish(&self) {
        let mut s = self.state.lock().unwrap();
        info!("{}: done ({} items)", s.label, s.done);
        s.reports += 1;
    }
}

/// Thread-safe tallies of everything reported, mostly for tests.
#[derive(Clone, Default)]
pub struct CountingProgress {
    inner: Arc<Mutex<CountingState>>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct CountingState {
    pub started: Vec<(String, Option<u64>)>,
    pub advanced: u64,
    pub finished: usize,
}

impl CountingProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current tallies.
    ///
    /// # Panics
    /// If the internal lock is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> CountingState {
        self.inner.lock().unwrap().clone()
    }
}

impl ProgressReporter for CountingProgress {
    fn start(&self, label: &str, total: Option<u64>) {
        self.inner.lock().unwrap().started.push((label.to_string(), total));
    }

    fn advance(&self, n: u64) {
        self.inner.lock().unwrap().advanced += n;
    }

    fn finish(&self) {
        self.inner.lock().unwrap().finished += 1;
    }
}
