use rustfft::{num_complex::Complex, FftPlanner};

/// One-sided power spectral density.
#[derive(Clone, Debug, Default)]
pub struct Psd {
    /// Bin centre frequencies in Hz
    pub freqs: Vec<f64>,
    /// Power density per bin (units² / Hz)
    pub density: Vec<f64>,
}

/// Welch's averaged periodogram.
///
/// Segments of `min(max_segment, signal.len())` samples, periodic Hann window,
/// 50% overlap, each segment detrended by its mean, density scaling and a
/// one-sided spectrum. These match scipy's defaults so band powers line up
/// with values computed there.
pub fn welch(signal: &[f64], sample_rate: f64, max_segment: usize) -> Psd {
    let nperseg = max_segment.min(signal.len());
    if nperseg == 0 || sample_rate <= 0.0 {
        return Psd::default();
    }

    let noverlap = nperseg / 2;
    let step = nperseg - noverlap;
    let n_segments = (signal.len() - noverlap) / step;

    let window = hann_periodic(nperseg);
    let window_energy: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * window_energy);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);

    let n_bins = nperseg / 2 + 1;
    let mut acc = vec![0.0f64; n_bins];
    let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];

    for seg in 0..n_segments {
        let start = seg * step;
        let segment = &signal[start..start + nperseg];
        let mean = segment.iter().sum::<f64>() / nperseg as f64;

        for (slot, (&x, &w)) in buffer.iter_mut().zip(segment.iter().zip(&window)) {
            *slot = Complex::new((x - mean) * w, 0.0);
        }
        fft.process(&mut buffer);

        for (a, c) in acc.iter_mut().zip(&buffer) {
            *a += c.norm_sqr();
        }
    }

    let has_nyquist = nperseg % 2 == 0;
    let density = acc
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let v = p * scale / n_segments as f64;
            // Fold negative frequencies; DC and Nyquist have no mirror.
            if k == 0 || (has_nyquist && k == n_bins - 1) {
                v
            } else {
                v * 2.0
            }
        })
        .collect();

    let freqs = (0..n_bins)
        .map(|k| k as f64 * sample_rate / nperseg as f64)
        .collect();

    Psd { freqs, density }
}

fn hann_periodic(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos())
        .collect()
}
