use std::f64::consts::TAU;
use std::time::Duration;

use super::{Chunk, Playhead, SampleSource};
use crate::eeg::ring::Sample;
use crate::error::Result;
use crate::pacer::SharedClock;

pub const DEFAULT_CHANNELS: [&str; 4] = ["TP9", "AF7", "AF8", "TP10"];

/// Deterministic EEG-like signal for runs without a headset: waxing and
/// waning alpha bursts over steady theta and beta, plus a little noise.
/// Sample `n` depends only on `n`, so runs are reproducible.
pub struct SyntheticSource {
    channel_names: Vec<String>,
    sample_rate: f64,
    head: Playhead,
}

impl SyntheticSource {
    pub fn new(
        channel_names: Vec<String>,
        sample_rate: f64,
        clock: SharedClock,
        limit_seconds: Option<f64>,
    ) -> Self {
        let total = limit_seconds.map(|s| (s.max(0.0) * sample_rate).round() as usize);
        log::info!(
            "Synthetic source: {} channels at {}Hz{}",
            channel_names.len(),
            sample_rate,
            match limit_seconds {
                Some(s) => format!(", {:.1}s", s),
                None => String::new(),
            }
        );
        Self {
            head: Playhead::new(clock, sample_rate, total),
            channel_names,
            sample_rate,
        }
    }

    pub fn sample_at(&self, index: usize) -> Sample {
        let t = index as f64 / self.sample_rate;
        (0..self.channel_names.len())
            .map(|ch| {
                let phase = ch as f64 * 0.7;
                // alpha envelope cycles every ~8 s, offset per channel
                let envelope = 0.5 + 0.5 * (TAU * 0.125 * t + phase).sin();
                let alpha = 20.0 * envelope * (TAU * 10.0 * t + phase).sin();
                let theta = 8.0 * (TAU * 6.0 * t + 2.0 * phase).sin();
                let beta = 4.0 * (TAU * 20.0 * t + 3.0 * phase).sin();
                alpha + theta + beta + 2.0 * noise(index as u64, ch as u64)
            })
            .collect()
    }
}

/// Uniform in [-1, 1), hashed from sample index and channel.
fn noise(index: u64, channel: u64) -> f64 {
    let mut x = index
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(channel.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 52) as f64 - 1.0
}

impl SampleSource for SyntheticSource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    fn pull_chunk(&mut self, timeout: Duration, max_samples: usize) -> Result<Option<Chunk>> {
        if self.head.is_done() {
            return Ok(None);
        }
        let n = self.head.advance(timeout, max_samples);
        let end = self.head.emitted();
        let start = end - n;
        Ok(Some(Chunk {
            samples: (start..end).map(|i| self.sample_at(i)).collect(),
            timestamps: (start..end).map(|i| i as f64 / self.sample_rate).collect(),
        }))
    }
}
