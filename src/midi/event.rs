use serde::Serialize;

/// Channel voice messages the bridge emits. Data bytes are kept in 0..=127
/// and channels in 0..=15 by the constructors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiEvent {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        MidiEvent::NoteOn {
            channel: channel.min(15),
            note: note.min(127),
            velocity: velocity.min(127),
        }
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        MidiEvent::NoteOff {
            channel: channel.min(15),
            note: note.min(127),
            velocity: velocity.min(127),
        }
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        MidiEvent::ControlChange {
            channel: channel.min(15),
            controller: controller.min(127),
            value: value.min(127),
        }
    }

    /// Wire bytes: status then two data bytes.
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOn { channel, note, velocity } => {
                [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiEvent::NoteOff { channel, note, velocity } => {
                [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiEvent::ControlChange { channel, controller, value } => {
                [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
            }
        }
    }
}
