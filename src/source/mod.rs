//! Multi-channel sample sources: stdin rows, recording replay, synthetic.

pub mod replay;
pub mod stream;
pub mod synthetic;

use std::time::Duration;

use crate::eeg::ring::Sample;
use crate::error::Result;
use crate::pacer::{secs, SharedClock};

/// Samples pulled in one go, with their source timestamps in seconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    pub samples: Vec<Sample>,
    pub timestamps: Vec<f64>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the newest sample.
    pub fn last_time(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }
}

pub trait SampleSource {
    fn sample_rate(&self) -> f64;

    fn channel_names(&self) -> &[String];

    fn channel_count(&self) -> usize {
        self.channel_names().len()
    }

    /// Wait up to `timeout` for samples and return at most `max_samples`.
    /// An empty chunk means nothing arrived in time; `None` means the source
    /// is exhausted.
    fn pull_chunk(&mut self, timeout: Duration, max_samples: usize) -> Result<Option<Chunk>>;
}

/// Tracks how many samples of a fixed-rate signal are due on a clock.
/// Time starts at the first pull.
pub(crate) struct Playhead {
    clock: SharedClock,
    sample_rate: f64,
    start: Option<Duration>,
    emitted: usize,
    total: Option<usize>,
}

impl Playhead {
    pub(crate) fn new(clock: SharedClock, sample_rate: f64, total: Option<usize>) -> Self {
        Self {
            clock,
            sample_rate,
            start: None,
            emitted: 0,
            total,
        }
    }

    pub(crate) fn emitted(&self) -> usize {
        self.emitted
    }

    pub(crate) fn is_done(&self) -> bool {
        self.total.is_some_and(|t| self.emitted >= t)
    }

    /// Claim the samples that are due now, waiting up to `timeout` for at
    /// least one. Returns how many were claimed.
    pub(crate) fn advance(&mut self, timeout: Duration, max_samples: usize) -> usize {
        let clock = self.clock.clone();
        let start = *self.start.get_or_insert_with(|| clock.now());
        let deadline = clock.now() + timeout;
        let max_samples = max_samples.max(1);

        loop {
            let now = clock.now();
            let elapsed = now.saturating_sub(start).as_secs_f64();
            // tolerance for Duration rounding at exact sample boundaries
            let mut due_total = (elapsed * self.sample_rate + 1e-6).floor() as usize;
            if let Some(total) = self.total {
                due_total = due_total.min(total);
            }
            let due = due_total.saturating_sub(self.emitted).min(max_samples);
            if due > 0 {
                self.emitted += due;
                return due;
            }
            if now >= deadline || self.is_done() {
                return 0;
            }
            let next = start + secs((self.emitted + 1) as f64 / self.sample_rate);
            let target = next.min(deadline).max(now + Duration::from_nanos(1));
            clock.sleep_until(target);
        }
    }
}
