use serde::{Deserialize, Serialize};

/// Conventional EEG rhythm, in the order multi-band presets iterate them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EegBand {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl EegBand {
    pub fn name(self) -> &'static str {
        match self {
            EegBand::Delta => "delta",
            EegBand::Theta => "theta",
            EegBand::Alpha => "alpha",
            EegBand::Beta => "beta",
            EegBand::Gamma => "gamma",
        }
    }

    /// Frequency range in Hz.
    pub fn range(self) -> (f64, f64) {
        match self {
            EegBand::Delta => (0.5, 4.0),
            EegBand::Theta => (4.0, 8.0),
            EegBand::Alpha => (8.0, 12.0),
            EegBand::Beta => (13.0, 30.0),
            EegBand::Gamma => (30.0, 45.0),
        }
    }

    pub fn band(self) -> Band {
        let (low, high) = self.range();
        Band {
            name: self.name().to_string(),
            low,
            high,
        }
    }
}

/// Closed frequency interval `[low, high]` in Hz.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }

    #[inline]
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low && freq <= self.high
    }
}

/// Band as written in config: either a rhythm name or an explicit range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandSpec {
    Named(EegBand),
    Custom { name: String, low: f64, high: f64 },
}

impl BandSpec {
    pub fn resolve(&self) -> Band {
        match self {
            BandSpec::Named(b) => b.band(),
            BandSpec::Custom { name, low, high } => Band::new(name.clone(), *low, *high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        bands: Vec<BandSpec>,
    }

    #[test]
    fn parses_named_and_custom_bands() {
        let w: Wrapper = toml::from_str(
            r#"bands = ["alpha", { name = "beta", low = 12.0, high = 30.0 }]"#,
        )
        .unwrap();
        let bands: Vec<Band> = w.bands.iter().map(BandSpec::resolve).collect();
        assert_eq!(bands[0], Band::new("alpha", 8.0, 12.0));
        assert_eq!(bands[1], Band::new("beta", 12.0, 30.0));
    }

    #[test]
    fn band_edges_are_inclusive() {
        let alpha = EegBand::Alpha.band();
        assert!(alpha.contains(8.0));
        assert!(alpha.contains(12.0));
        assert!(!alpha.contains(12.01));
    }
}
