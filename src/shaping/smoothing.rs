/// Exponential moving average; the first value passes through unchanged.
#[derive(Clone, Debug)]
pub struct Smoother {
    alpha: f64,
    state: Option<f64>,
}

impl Smoother {
    /// `alpha` is the weight of the newest value, clamped into (0, 1].
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() { alpha.clamp(f64::EPSILON, 1.0) } else { 1.0 };
        Self { alpha, state: None }
    }

    pub fn update(&mut self, raw: f64) -> f64 {
        let next = match self.state {
            None => raw,
            Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
        };
        self.state = Some(next);
        next
    }
}
