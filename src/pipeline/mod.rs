//! Drivers that carry samples from a source through analysis and shaping to
//! MIDI events.

pub mod recorded;
pub mod streaming;

use crate::config::Config;
use crate::eeg::analysis::BandPowerEstimator;
use crate::eeg::bands::Band;
use crate::error::Result;
use crate::midi::mapper::ValueMapper;
use crate::shaping::normalize::{Baseline, Normalization, Normalizer};
use crate::shaping::smoothing::Smoother;

/// Smoothing then normalization for one measured value.
#[derive(Clone, Debug)]
pub struct ShapingChain {
    smoother: Smoother,
    /// `None` when lanes are normalized against each other instead
    normalizer: Option<Normalizer>,
}

impl ShapingChain {
    pub fn new(smoothing: f64, normalization: &Normalization, baseline: Option<Baseline>) -> Result<Self> {
        let normalizer = match normalization {
            Normalization::AcrossChannels => None,
            other => Some(Normalizer::from_config(other, baseline)?),
        };
        Ok(Self {
            smoother: Smoother::new(smoothing),
            normalizer,
        })
    }

    pub fn smooth(&mut self, raw: f64) -> f64 {
        self.smoother.update(raw)
    }

    /// Level of an already smoothed value; identity clip without a normalizer.
    pub fn level(&mut self, smoothed: f64, time: f64) -> f64 {
        match self.normalizer.as_mut() {
            Some(n) => n.normalize(smoothed, time),
            None => smoothed.clamp(0.0, 1.0),
        }
    }

    pub fn apply(&mut self, raw: f64, time: f64) -> f64 {
        let smoothed = self.smooth(raw);
        self.level(smoothed, time)
    }
}

/// Analysis settings shared by both drivers, resolved once per run.
pub struct Analysis {
    pub estimator: BandPowerEstimator,
    pub bands: Vec<Band>,
    pub mapper: ValueMapper,
    pub slots: Vec<String>,
}

impl Analysis {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            estimator: cfg.estimator(),
            bands: cfg.bands(),
            mapper: cfg.mapper(),
            slots: cfg.slot_names(),
        }
    }
}
