use serde::{Deserialize, Serialize};

use crate::shaping::interp;

/// How a level becomes a note velocity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityCurve {
    /// The 0..=127 value itself, clipped into the velocity range
    #[default]
    Clip,
    /// Level (raised to the exponent) spread across the velocity range
    Scale,
}

/// Maps a normalized level in [0, 1] onto MIDI data values.
#[derive(Clone, Debug)]
pub struct ValueMapper {
    pub note_low: u8,
    pub note_high: u8,
    pub velocity_min: u8,
    pub velocity_max: u8,
    pub velocity_curve: VelocityCurve,
    pub velocity_exponent: f64,
    pub cc_min: u8,
    pub cc_max: u8,
}

impl Default for ValueMapper {
    fn default() -> Self {
        Self {
            note_low: 48,
            note_high: 72,
            velocity_min: 40,
            velocity_max: 80,
            velocity_curve: VelocityCurve::Clip,
            velocity_exponent: 1.0,
            cc_min: 0,
            cc_max: 127,
        }
    }
}

impl ValueMapper {
    /// Level as a 0..=127 MIDI value (truncating).
    pub fn midi_value(level: f64) -> u8 {
        interp(level, (0.0, 1.0), (0.0, 127.0)) as u8
    }

    /// Note inside `[note_low, note_high]`, stepped by integer division.
    pub fn note(&self, midi_value: u8) -> u8 {
        let low = self.note_low as u32;
        let span = self.note_high.saturating_sub(self.note_low) as u32;
        (low + midi_value.min(127) as u32 * span / 127).min(127) as u8
    }

    /// Note shifted by `offset` semitones, still capped at 127.
    pub fn note_with_offset(&self, midi_value: u8, offset: u8) -> u8 {
        (self.note(midi_value) as u32 + offset as u32).min(127) as u8
    }

    pub fn velocity(&self, level: f64) -> u8 {
        let (lo, hi) = (self.velocity_min, self.velocity_max.max(self.velocity_min));
        match self.velocity_curve {
            VelocityCurve::Clip => Self::midi_value(level).clamp(lo, hi),
            VelocityCurve::Scale => {
                let shaped = level.clamp(0.0, 1.0).powf(self.velocity_exponent);
                let v = lo as f64 + (hi - lo) as f64 * shaped;
                if v.is_finite() {
                    (v as u8).clamp(lo, hi)
                } else {
                    lo
                }
            }
        }
    }

    pub fn cc(&self, level: f64) -> u8 {
        let level = level.clamp(0.0, 1.0);
        let v = self.cc_min as f64 + (self.cc_max as f64 - self.cc_min as f64) * level;
        (v as u8).min(127)
    }
}
