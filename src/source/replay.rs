use std::time::Duration;

use super::{Chunk, Playhead, SampleSource};
use crate::eeg::recording::Recording;
use crate::error::Result;
use crate::pacer::SharedClock;

/// Plays a recording back at its own sample rate.
pub struct ReplaySource {
    recording: Recording,
    head: Playhead,
}

impl ReplaySource {
    pub fn new(recording: Recording, clock: SharedClock, limit_seconds: Option<f64>) -> Self {
        let mut total = recording.samples.len();
        if let Some(limit) = limit_seconds {
            total = total.min((limit.max(0.0) * recording.sample_rate).round() as usize);
        }
        let head = Playhead::new(clock, recording.sample_rate, Some(total));
        Self { recording, head }
    }
}

impl SampleSource for ReplaySource {
    fn sample_rate(&self) -> f64 {
        self.recording.sample_rate
    }

    fn channel_names(&self) -> &[String] {
        &self.recording.channel_names
    }

    fn pull_chunk(&mut self, timeout: Duration, max_samples: usize) -> Result<Option<Chunk>> {
        if self.head.is_done() {
            return Ok(None);
        }
        let n = self.head.advance(timeout, max_samples);
        let end = self.head.emitted();
        let start = end - n;
        let fs = self.recording.sample_rate;
        Ok(Some(Chunk {
            samples: self.recording.samples[start..end].to_vec(),
            timestamps: (start..end).map(|i| i as f64 / fs).collect(),
        }))
    }
}
