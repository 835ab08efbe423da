use std::collections::VecDeque;

/// One reading per channel at a single instant.
pub type Sample = Vec<f64>;

/// Fixed-capacity FIFO of multi-channel samples feeding the windowed estimator.
pub struct RingBuffer {
    data: VecDeque<Sample>,
    cap: usize,
}

impl RingBuffer {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            data: VecDeque::with_capacity(cap),
            cap,
        }
    }

    #[inline]
    pub fn push(&mut self, sample: Sample) {
        if self.data.len() == self.cap {
            self.data.pop_front();
        }
        self.data.push_back(sample);
    }

    pub fn extend<I: IntoIterator<Item = Sample>>(&mut self, samples: I) {
        for s in samples {
            self.push(s);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.data.len() == self.cap
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.data.iter().cloned().collect()
    }
}

/// Mean of the selected channels of one sample.
pub fn mix(sample: &[f64], channels: &[usize]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &ch in channels {
        if let Some(v) = sample.get(ch) {
            sum += v;
            n += 1;
        }
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
