use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::interp;
use crate::error::{Error, Result};

/// Normalization strategy as written in config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Fixed input range mapped onto [0, 1]
    Static {
        #[serde(default)]
        low: f64,
        #[serde(default = "default_static_high")]
        high: f64,
    },
    /// Running min/max over the last `horizon_seconds` of values
    Rolling {
        #[serde(default = "default_horizon")]
        horizon_seconds: f64,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    /// z-score against a whole-recording baseline
    Zscore {
        #[serde(default = "default_sensitivity")]
        sensitivity: f64,
        #[serde(default = "default_span")]
        span: f64,
    },
    /// Min/max across lanes at each instant
    AcrossChannels,
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::Static {
            low: 0.0,
            high: default_static_high(),
        }
    }
}

fn default_static_high() -> f64 { 100.0 }
fn default_horizon() -> f64 { 5.0 }
fn default_epsilon() -> f64 { 1e-12 }
fn default_sensitivity() -> f64 { 5.0 }
fn default_span() -> f64 { 10.0 }

impl Normalization {
    pub fn needs_baseline(&self) -> bool {
        matches!(self, Normalization::Zscore { .. })
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Normalization::Static { low, high } if !(high > low) => Err(Error::InvalidConfig(
                format!("static normalization needs high > low (got {low}..{high})"),
            )),
            Normalization::Rolling { horizon_seconds, epsilon }
                if !(horizon_seconds > 0.0) || !(epsilon > 0.0) =>
            {
                Err(Error::InvalidConfig(
                    "rolling normalization needs positive horizon_seconds and epsilon".into(),
                ))
            }
            Normalization::Zscore { span, .. } if !(span > 0.0) => Err(Error::InvalidConfig(
                "zscore normalization needs a positive span".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Mean and population standard deviation of a power series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
}

impl Baseline {
    pub const MIN_STD: f64 = 1e-12;

    pub fn from_series(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: Self::MIN_STD };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            mean,
            std: var.sqrt().max(Self::MIN_STD),
        }
    }

    pub fn z(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Values seen within the last `horizon` seconds of source time.
#[derive(Clone, Debug)]
pub struct RollingRange {
    horizon: f64,
    epsilon: f64,
    history: VecDeque<(f64, f64)>,
}

impl RollingRange {
    pub fn new(horizon: f64, epsilon: f64) -> Self {
        Self {
            horizon,
            epsilon,
            history: VecDeque::new(),
        }
    }

    pub fn normalize(&mut self, value: f64, time: f64) -> f64 {
        self.history.push_back((time, value));
        // The newest entry always survives, even with a zero horizon.
        while self.history.len() > 1 {
            match self.history.front() {
                Some(&(t, _)) if time - t > self.horizon => {
                    self.history.pop_front();
                }
                _ => break,
            }
        }

        let (min, max) = self
            .history
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| {
                (lo.min(v), hi.max(v))
            });

        ((value - min) / self.epsilon.max(max - min)).clamp(0.0, 1.0)
    }
}

/// Turns a smoothed power value into a level in [0, 1].
#[derive(Clone, Debug)]
pub enum Normalizer {
    Static { low: f64, high: f64 },
    Rolling(RollingRange),
    ZScore {
        baseline: Baseline,
        sensitivity: f64,
        span: f64,
    },
}

impl Normalizer {
    /// Build the per-lane normalizer for `cfg`. z-score needs `baseline`;
    /// `across_channels` has no per-lane form.
    pub fn from_config(cfg: &Normalization, baseline: Option<Baseline>) -> Result<Self> {
        match *cfg {
            Normalization::Static { low, high } => Ok(Normalizer::Static { low, high }),
            Normalization::Rolling { horizon_seconds, epsilon } => {
                Ok(Normalizer::Rolling(RollingRange::new(horizon_seconds, epsilon)))
            }
            Normalization::Zscore { sensitivity, span } => {
                let baseline = baseline.ok_or_else(|| {
                    Error::InvalidConfig("zscore normalization needs a recorded baseline".into())
                })?;
                Ok(Normalizer::ZScore { baseline, sensitivity, span })
            }
            Normalization::AcrossChannels => Err(Error::InvalidConfig(
                "across_channels normalization works on all lanes at once".into(),
            )),
        }
    }

    pub fn normalize(&mut self, value: f64, time: f64) -> f64 {
        let level = match self {
            Normalizer::Static { low, high } => interp(value, (*low, *high), (0.0, 1.0)),
            Normalizer::Rolling(range) => range.normalize(value, time),
            Normalizer::ZScore { baseline, sensitivity, span } => {
                let scaled = (baseline.z(value) * *sensitivity + *span / 2.0).clamp(0.0, *span);
                scaled / *span
            }
        };
        if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Min-max normalize simultaneous values across lanes.
pub fn normalize_across(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() || max == 0.0 || !max.is_finite() {
        return vec![0.0; values.len()];
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let span = max - min;
    if span <= 1e-9 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| ((v - min) / span).clamp(0.0, 1.0)).collect()
}
