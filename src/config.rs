use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::eeg::analysis::{BandPowerEstimator, Measure, Reduction};
use crate::eeg::bands::{Band, BandSpec, EegBand};
use crate::error::Error;
use crate::midi::gate::GateThresholds;
use crate::midi::mapper::{ValueMapper, VelocityCurve};
use crate::shaping::normalize::Normalization;

/// What a run turns band power into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One lane, one control change per band
    #[default]
    Control,
    /// One lane per channel, hysteresis-gated notes
    Gate,
    /// Recording windows played as notes
    Melody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub shaping: ShapingConfig,
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Channel names or indices; empty selects all
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_time_column")]
    pub time_column: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    #[serde(default = "default_max_chunk")]
    pub max_chunk: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,
    #[serde(default = "default_bands")]
    pub bands: Vec<BandSpec>,
    #[serde(default)]
    pub measure: Measure,
    #[serde(default)]
    pub reduction: Reduction,
    #[serde(default)]
    pub center: bool,
    #[serde(default = "default_max_segment")]
    pub max_segment: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapingConfig {
    /// Exponential smoothing factor; 1.0 passes values through
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    #[serde(default)]
    pub normalization: Normalization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiConfig {
    #[serde(default = "default_port")]
    pub port: String,
    /// Publish a virtual port with this name instead of connecting
    #[serde(default)]
    pub virtual_port: Option<String>,
    #[serde(default)]
    pub channel: u8,
    /// One controller per band in control mode
    #[serde(default = "default_controllers")]
    pub controllers: Vec<u8>,
    #[serde(default = "default_note_low")]
    pub note_low: u8,
    #[serde(default = "default_note_high")]
    pub note_high: u8,
    #[serde(default = "default_velocity_min")]
    pub velocity_min: u8,
    #[serde(default = "default_velocity_max")]
    pub velocity_max: u8,
    #[serde(default)]
    pub velocity_curve: VelocityCurve,
    #[serde(default = "default_velocity_exponent")]
    pub velocity_exponent: f64,
    #[serde(default)]
    pub cc_min: u8,
    #[serde(default = "default_cc_max")]
    pub cc_max: u8,
    /// Gate mode: lane `i` plays `base_note + i`
    #[serde(default = "default_base_note")]
    pub base_note: u8,
    /// Melody mode: band `j` is shifted by `j * band_note_step`
    #[serde(default = "default_band_note_step")]
    pub band_note_step: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_gate_on")]
    pub on: f64,
    #[serde(default = "default_gate_off")]
    pub off: f64,
    #[serde(default = "default_silence_timeout")]
    pub silence_timeout: f64,
    #[serde(default = "default_release_margin")]
    pub release_margin: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Minimum seconds between control changes on one controller
    #[serde(default = "default_send_interval")]
    pub send_interval: f64,
    /// Share of the (tempo-scaled) window a note is held
    #[serde(default = "default_note_fraction")]
    pub note_fraction: f64,
    /// How strongly the level shortens windows; 0 keeps the source rate
    #[serde(default)]
    pub tempo_scale: f64,
    #[serde(default = "default_tempo_min")]
    pub tempo_min: f64,
    #[serde(default = "default_tempo_max")]
    pub tempo_max: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: Vec::new(),
            time_column: default_time_column(),
            timeout_seconds: default_timeout(),
            max_chunk: default_max_chunk(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            bands: default_bands(),
            measure: Measure::default(),
            reduction: Reduction::default(),
            center: false,
            max_segment: default_max_segment(),
        }
    }
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            normalization: Normalization::default(),
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            virtual_port: None,
            channel: 0,
            controllers: default_controllers(),
            note_low: default_note_low(),
            note_high: default_note_high(),
            velocity_min: default_velocity_min(),
            velocity_max: default_velocity_max(),
            velocity_curve: VelocityCurve::default(),
            velocity_exponent: default_velocity_exponent(),
            cc_min: 0,
            cc_max: default_cc_max(),
            base_note: default_base_note(),
            band_note_step: default_band_note_step(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            on: default_gate_on(),
            off: default_gate_off(),
            silence_timeout: default_silence_timeout(),
            release_margin: default_release_margin(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            send_interval: default_send_interval(),
            note_fraction: default_note_fraction(),
            tempo_scale: 0.0,
            tempo_min: default_tempo_min(),
            tempo_max: default_tempo_max(),
        }
    }
}

fn default_sample_rate() -> f64 { 256.0 }
fn default_time_column() -> String { "Time".into() }
fn default_timeout() -> f64 { 1.0 }
fn default_max_chunk() -> usize { 1024 }
fn default_window_seconds() -> f64 { 1.0 }
fn default_bands() -> Vec<BandSpec> { vec![BandSpec::Named(EegBand::Alpha)] }
fn default_max_segment() -> usize { 256 }
fn default_smoothing() -> f64 { 1.0 }
fn default_port() -> String { "EEG_MIDI 1".into() }
fn default_controllers() -> Vec<u8> { vec![10, 11] }
fn default_note_low() -> u8 { 48 }
fn default_note_high() -> u8 { 72 }
fn default_velocity_min() -> u8 { 40 }
fn default_velocity_max() -> u8 { 80 }
fn default_velocity_exponent() -> f64 { 1.0 }
fn default_cc_max() -> u8 { 127 }
fn default_base_note() -> u8 { 60 }
fn default_band_note_step() -> u8 { 2 }
fn default_gate_on() -> f64 { 0.4 }
fn default_gate_off() -> f64 { 0.3 }
fn default_silence_timeout() -> f64 { 1.0 }
fn default_release_margin() -> f64 { 0.05 }
fn default_send_interval() -> f64 { 0.05 }
fn default_note_fraction() -> f64 { 0.5 }
fn default_tempo_min() -> f64 { 0.3 }
fn default_tempo_max() -> f64 { 1.0 }

impl Config {
    pub fn window_samples(&self, sample_rate: f64) -> usize {
        ((self.analysis.window_seconds * sample_rate).round() as usize).max(1)
    }

    pub fn bands(&self) -> Vec<Band> {
        self.analysis.bands.iter().map(BandSpec::resolve).collect()
    }

    /// Names of the values measured per lane and window.
    pub fn slot_names(&self) -> Vec<String> {
        self.analysis.measure.slot_names(&self.bands())
    }

    pub fn estimator(&self) -> BandPowerEstimator {
        BandPowerEstimator::new(
            self.analysis.center,
            self.analysis.reduction,
            self.analysis.max_segment,
        )
    }

    pub fn mapper(&self) -> ValueMapper {
        let m = &self.midi;
        ValueMapper {
            note_low: m.note_low,
            note_high: m.note_high,
            velocity_min: m.velocity_min,
            velocity_max: m.velocity_max,
            velocity_curve: m.velocity_curve,
            velocity_exponent: m.velocity_exponent,
            cc_min: m.cc_min,
            cc_max: m.cc_max,
        }
    }

    pub fn thresholds(&self) -> GateThresholds {
        GateThresholds {
            on: self.gate.on,
            off: self.gate.off,
            silence_timeout: self.gate.silence_timeout,
            release_margin: self.gate.release_margin,
        }
    }

    /// Reject values and combinations the pipeline cannot run with.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        let invalid = |msg: String| -> std::result::Result<(), Error> { Err(Error::InvalidConfig(msg)) };

        if !(self.input.sample_rate > 0.0) {
            return invalid(format!("input.sample_rate must be positive (got {})", self.input.sample_rate));
        }
        if !(self.input.timeout_seconds > 0.0) {
            return invalid("input.timeout_seconds must be positive".into());
        }
        if !(self.analysis.window_seconds > 0.0) {
            return invalid(format!(
                "analysis.window_seconds must be positive (got {})",
                self.analysis.window_seconds
            ));
        }
        if self.analysis.measure == Measure::BandPower && self.analysis.bands.is_empty() {
            return invalid("analysis.bands is empty".into());
        }
        for band in self.bands() {
            if !(band.low >= 0.0 && band.high >= band.low) {
                return invalid(format!("band '{}' has an empty range {}..{}", band.name, band.low, band.high));
            }
        }
        if !(self.shaping.smoothing > 0.0 && self.shaping.smoothing <= 1.0) {
            return invalid(format!("shaping.smoothing must be in (0, 1] (got {})", self.shaping.smoothing));
        }
        self.shaping.normalization.validate()?;

        let m = &self.midi;
        if m.channel > 15 {
            return invalid(format!("midi.channel must be 0-15 (got {})", m.channel));
        }
        if m.note_low > m.note_high || m.note_high > 127 {
            return invalid(format!("midi note range {}..{} is invalid", m.note_low, m.note_high));
        }
        if m.velocity_min > m.velocity_max || m.velocity_max > 127 {
            return invalid(format!("midi velocity range {}..{} is invalid", m.velocity_min, m.velocity_max));
        }
        if m.cc_min > m.cc_max || m.cc_max > 127 {
            return invalid(format!("midi cc range {}..{} is invalid", m.cc_min, m.cc_max));
        }
        if m.controllers.iter().any(|&c| c > 127) {
            return invalid("midi.controllers must be 0-127".into());
        }

        if !(self.gate.on > self.gate.off) {
            return invalid(format!("gate.on ({}) must exceed gate.off ({})", self.gate.on, self.gate.off));
        }

        let p = &self.pacing;
        if !(p.send_interval >= 0.0) {
            return invalid("pacing.send_interval must not be negative".into());
        }
        if !(p.note_fraction > 0.0 && p.note_fraction <= 1.0) {
            return invalid(format!("pacing.note_fraction must be in (0, 1] (got {})", p.note_fraction));
        }
        if !(p.tempo_min > 0.0 && p.tempo_min <= p.tempo_max) {
            return invalid(format!("pacing tempo range {}..{} is invalid", p.tempo_min, p.tempo_max));
        }

        let norm = &self.shaping.normalization;
        if self.mode == Mode::Control {
            let slots = self.slot_names().len();
            if m.controllers.len() < slots {
                return invalid(format!(
                    "control mode measures {} values but midi.controllers lists {}",
                    slots,
                    m.controllers.len()
                ));
            }
        }
        if norm.needs_baseline() && self.mode != Mode::Melody {
            return invalid("zscore normalization needs a whole recording (mode = \"melody\")".into());
        }
        if matches!(norm, Normalization::AcrossChannels) && self.mode != Mode::Gate {
            return invalid("across_channels normalization only applies to mode = \"gate\"".into());
        }
        Ok(())
    }
}

/// Config file used when none is named: `./eegmidi.toml`, then the user
/// config directory.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("eegmidi.toml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join("eegmidi").join("config.toml"))
        .filter(|p| p.exists())
}

pub fn load_table(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    content
        .parse::<Table>()
        .with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Recursively lay `over` on top of `base`; tables merge, anything else
/// replaces.
pub fn merge(base: &mut Table, over: Table) {
    for (key, value) in over {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(b)), Value::Table(o)) => merge(b, o),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply one `dotted.key=value` override. The value is read as TOML, and as
/// a plain string when that fails.
pub fn apply_override(table: &mut Table, assignment: &str) -> Result<()> {
    let (key, raw) = assignment
        .split_once('=')
        .with_context(|| format!("Override '{}' is not key=value", assignment))?;
    let path: Vec<&str> = key.trim().split('.').map(str::trim).collect();
    if path.iter().any(|p| p.is_empty()) {
        anyhow::bail!("Override '{}' has an empty key", assignment);
    }

    let raw = raw.trim();
    let value = format!("v = {}", raw)
        .parse::<Table>()
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| Value::String(raw.to_string()));

    let (last, parents) = path.split_last().context("empty override key")?;
    let mut node = table;
    for part in parents {
        let entry = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        node = match entry {
            Value::Table(t) => t,
            _ => anyhow::bail!("Override '{}': '{}' is not a table", assignment, part),
        };
    }
    node.insert(last.to_string(), value);
    Ok(())
}

/// Decode a merged table into a config, ignoring the `[preset]` header.
pub fn from_table(mut table: Table) -> Result<Config> {
    table.remove("preset");
    Value::Table(table)
        .try_into()
        .context("Invalid configuration")
}
