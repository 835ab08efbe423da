use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::bands::Band;
use super::recording::Recording;
use super::ring::{mix, Sample};
use super::welch::welch;

/// Windows shorter than this carry no usable spectrum.
pub const MIN_WINDOW: usize = 4;

/// How PSD bins inside a band collapse to one number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Arithmetic mean of the selected bins
    #[default]
    Mean,
    /// Trapezoidal integral over the selected bins
    Integral,
}

/// What is measured per window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Welch band power, one value per configured band
    #[default]
    BandPower,
    /// Mean of squared readings across the selected channels, one value
    MeanSquare,
}

impl Measure {
    /// Names of the values produced per window.
    pub fn slot_names(self, bands: &[Band]) -> Vec<String> {
        match self {
            Measure::BandPower => bands.iter().map(|b| b.name.clone()).collect(),
            Measure::MeanSquare => vec!["power".to_string()],
        }
    }
}

#[derive(Clone, Debug)]
pub struct BandPowerEstimator {
    /// Subtract the window mean before the spectral step
    pub center: bool,
    pub reduction: Reduction,
    /// Upper bound on the Welch segment length
    pub max_segment: usize,
}

impl Default for BandPowerEstimator {
    fn default() -> Self {
        Self {
            center: false,
            reduction: Reduction::Mean,
            max_segment: 256,
        }
    }
}

impl BandPowerEstimator {
    pub fn new(center: bool, reduction: Reduction, max_segment: usize) -> Self {
        Self {
            center,
            reduction,
            max_segment: max_segment.max(1),
        }
    }

    /// Band power of one window. Degenerate input yields 0.0.
    pub fn estimate(&self, window: &[f64], sample_rate: f64, band: &Band) -> f64 {
        if window.len() < MIN_WINDOW {
            return 0.0;
        }

        let centered;
        let signal = if self.center {
            let mean = window.iter().sum::<f64>() / window.len() as f64;
            centered = window.iter().map(|x| x - mean).collect::<Vec<_>>();
            &centered[..]
        } else {
            window
        };

        let psd = welch(signal, sample_rate, self.max_segment);

        let (freqs, density): (Vec<f64>, Vec<f64>) = psd
            .freqs
            .iter()
            .zip(&psd.density)
            .filter(|(f, _)| band.contains(**f))
            .map(|(f, p)| (*f, *p))
            .unzip();

        if freqs.is_empty() {
            return 0.0;
        }

        let power = match self.reduction {
            Reduction::Mean => density.iter().sum::<f64>() / density.len() as f64,
            Reduction::Integral => trapezoid(&freqs, &density),
        };

        if power.is_finite() {
            power.max(0.0)
        } else {
            0.0
        }
    }

    /// Every value `measure` yields for one window of multi-channel samples.
    pub fn measure(
        &self,
        window: &[Sample],
        channels: &[usize],
        sample_rate: f64,
        bands: &[Band],
        measure: Measure,
    ) -> Vec<f64> {
        match measure {
            Measure::BandPower => {
                let lane: Vec<f64> = window.iter().map(|s| mix(s, channels)).collect();
                bands
                    .iter()
                    .map(|b| self.estimate(&lane, sample_rate, b))
                    .collect()
            }
            Measure::MeanSquare => vec![mean_square(window, channels)],
        }
    }
}

/// Mean of squared readings over every selected channel of the window.
pub fn mean_square(window: &[Sample], channels: &[usize]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for sample in window {
        for &ch in channels {
            if let Some(v) = sample.get(ch) {
                sum += v * v;
                n += 1;
            }
        }
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) * 0.5)
        .sum()
}

/// Start indices of the full, non-overlapping windows of a recording.
///
/// A recording whose length is an exact multiple of the window keeps its
/// last window; only a trailing partial window is dropped.
pub fn window_starts(total_samples: usize, window_samples: usize) -> Vec<usize> {
    if window_samples == 0 || total_samples < window_samples {
        return Vec::new();
    }
    (0..=total_samples - window_samples)
        .step_by(window_samples)
        .collect()
}

/// Pre-pass over a whole recording: one row of measured values per window.
///
/// Windows are independent, so they are computed in parallel.
pub fn power_series(
    recording: &Recording,
    starts: &[usize],
    window_samples: usize,
    channels: &[usize],
    bands: &[Band],
    measure: Measure,
    estimator: &BandPowerEstimator,
) -> Vec<Vec<f64>> {
    log::info!(
        "Pass 1: {} over {} windows of {} samples...",
        match measure {
            Measure::BandPower => "band power",
            Measure::MeanSquare => "mean-square power",
        },
        starts.len(),
        window_samples
    );

    starts
        .par_iter()
        .map(|&start| {
            let window = &recording.samples[start..start + window_samples];
            estimator.measure(window, channels, recording.sample_rate, bands, measure)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeg::bands::EegBand;
    use approx::assert_relative_eq;

    fn sine(freq: f64, amp: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * std::f64::consts::PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn short_windows_have_zero_power() {
        let est = BandPowerEstimator::default();
        let alpha = EegBand::Alpha.band();
        for n in 0..MIN_WINDOW {
            assert_eq!(est.estimate(&vec![5.0; n], 256.0, &alpha), 0.0);
        }
    }

    #[test]
    fn band_without_bins_has_zero_power() {
        let est = BandPowerEstimator::default();
        // 16 samples at 256 Hz -> 16 Hz resolution, nothing between 9 and 11 Hz
        let band = Band::new("narrow", 9.0, 11.0);
        assert_eq!(est.estimate(&sine(10.0, 1.0, 256.0, 16), 256.0, &band), 0.0);
        // above Nyquist
        let band = Band::new("ultra", 500.0, 600.0);
        assert_eq!(est.estimate(&sine(10.0, 1.0, 256.0, 256), 256.0, &band), 0.0);
    }

    #[test]
    fn zero_signal_has_zero_power() {
        for reduction in [Reduction::Mean, Reduction::Integral] {
            let est = BandPowerEstimator::new(true, reduction, 256);
            let p = est.estimate(&vec![0.0; 300], 256.0, &EegBand::Alpha.band());
            assert_eq!(p, 0.0);
        }
    }

    #[test]
    fn estimate_is_deterministic() {
        let est = BandPowerEstimator::new(false, Reduction::Integral, 256);
        let window = sine(10.0, 3.0, 256.0, 256);
        let band = EegBand::Alpha.band();
        let a = est.estimate(&window, 256.0, &band);
        let b = est.estimate(&window, 256.0, &band);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn alpha_sine_dominates_alpha_band() {
        let est = BandPowerEstimator::default();
        let window = sine(10.0, 1.0, 256.0, 256);
        let alpha = est.estimate(&window, 256.0, &EegBand::Alpha.band());
        let beta = est.estimate(&window, 256.0, &EegBand::Beta.band());
        assert!(alpha > 100.0 * beta);
    }

    #[test]
    fn integral_captures_sine_power() {
        // A sine of amplitude 2 carries mean square 2, nearly all inside 8-12 Hz.
        let est = BandPowerEstimator::new(false, Reduction::Integral, 256);
        let p = est.estimate(&sine(10.0, 2.0, 256.0, 256), 256.0, &EegBand::Alpha.band());
        assert_relative_eq!(p, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn centering_removes_offset_only() {
        let plain = BandPowerEstimator::new(false, Reduction::Mean, 256);
        let centered = BandPowerEstimator::new(true, Reduction::Mean, 256);
        let window: Vec<f64> = sine(10.0, 1.0, 256.0, 256).iter().map(|x| x + 40.0).collect();
        let band = EegBand::Alpha.band();
        assert_relative_eq!(
            plain.estimate(&window, 256.0, &band),
            centered.estimate(&window, 256.0, &band),
            max_relative = 1e-9
        );
    }

    #[test]
    fn mean_square_over_selected_channels() {
        let window = vec![vec![1.0, 2.0, 9.0], vec![3.0, 4.0, 9.0]];
        assert_relative_eq!(mean_square(&window, &[0, 1]), (1.0 + 4.0 + 9.0 + 16.0) / 4.0);
        assert_eq!(mean_square(&[], &[0]), 0.0);
    }

    #[test]
    fn window_starts_cover_full_windows_only() {
        assert_eq!(window_starts(1024, 256), vec![0, 256, 512, 768]);
        assert_eq!(window_starts(1000, 256), vec![0, 256, 512]);
        assert!(window_starts(100, 256).is_empty());
    }

    #[test]
    fn measure_names_follow_bands() {
        let bands = vec![EegBand::Alpha.band(), EegBand::Beta.band()];
        assert_eq!(Measure::BandPower.slot_names(&bands), vec!["alpha", "beta"]);
        assert_eq!(Measure::MeanSquare.slot_names(&bands), vec!["power"]);
    }

    #[test]
    fn power_series_has_one_row_per_window() {
        let samples: Vec<Sample> = sine(10.0, 1.0, 256.0, 1024)
            .into_iter()
            .map(|x| vec![x, -x])
            .collect();
        let rec = Recording {
            channel_names: vec!["AF7".into(), "AF8".into()],
            samples,
            sample_rate: 256.0,
        };
        let starts = window_starts(rec.samples.len(), 256);
        let bands = vec![EegBand::Alpha.band()];
        let series = power_series(
            &rec,
            &starts,
            256,
            &[0],
            &bands,
            Measure::BandPower,
            &BandPowerEstimator::default(),
        );
        assert_eq!(series.len(), 4);
        assert!(series.iter().all(|row| row.len() == 1 && row[0] > 0.0));
        assert_relative_eq!(series[0][0], series[2][0], max_relative = 1e-6);
    }
}
