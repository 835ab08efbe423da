//! Dual-threshold note gating, one state machine per lane.

use super::event::MidiEvent;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateThresholds {
    /// Level at or above which an idle lane starts a note
    pub on: f64,
    /// Level at or below which a sounding lane stops
    pub off: f64,
    /// Seconds after the last NoteOn past which a lane near `off` is released
    pub silence_timeout: f64,
    /// How far above `off` the silence release still applies
    pub release_margin: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            on: 0.4,
            off: 0.3,
            silence_timeout: 1.0,
            release_margin: 0.05,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GateState {
    pub is_on: bool,
    pub last_on: f64,
    /// Note held while `is_on`, so the NoteOff matches the NoteOn
    pub note: u8,
}

pub struct HysteresisGate {
    thresholds: GateThresholds,
    channel: u8,
    lanes: Vec<GateState>,
}

impl HysteresisGate {
    pub fn new(thresholds: GateThresholds, channel: u8, lanes: usize) -> Self {
        Self {
            thresholds,
            channel,
            lanes: vec![GateState::default(); lanes],
        }
    }

    /// Advance one lane. Returns the NoteOn or NoteOff a transition emits.
    pub fn update(&mut self, lane: usize, level: f64, now: f64, note: u8, velocity: u8) -> Option<MidiEvent> {
        let t = self.thresholds;
        let channel = self.channel;
        let state = self.lanes.get_mut(lane)?;

        if !state.is_on {
            if level >= t.on {
                state.is_on = true;
                state.last_on = now;
                state.note = note;
                return Some(MidiEvent::note_on(channel, note, velocity));
            }
            return None;
        }

        let timed_out = now - state.last_on > t.silence_timeout && level < t.off + t.release_margin;
        if level <= t.off || timed_out {
            state.is_on = false;
            return Some(MidiEvent::note_off(channel, state.note, 0));
        }
        None
    }

    /// NoteOffs for every lane still sounding; leaves all lanes off.
    pub fn release_all(&mut self) -> Vec<MidiEvent> {
        let channel = self.channel;
        self.lanes
            .iter_mut()
            .filter(|s| s.is_on)
            .map(|s| {
                s.is_on = false;
                MidiEvent::note_off(channel, s.note, 0)
            })
            .collect()
    }
}
