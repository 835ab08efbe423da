//! MIDI outputs: hardware/virtual ports via midir, or JSON lines for dry runs.

use std::io::Write;

use midir::{MidiOutput, MidiOutputConnection};

use super::event::MidiEvent;
use crate::error::{Error, Result};
use crate::pacer::SharedClock;

const CLIENT_NAME: &str = "eegmidi";

/// Anything that accepts MIDI events.
pub trait MidiSink {
    fn send(&mut self, event: &MidiEvent) -> Result<()>;

    fn name(&self) -> &str;
}

/// How a port was chosen for the requested name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortMatch {
    Exact,
    Partial,
    Fallback,
}

/// Pick the port for `wanted`: exact name, then case-insensitive substring,
/// then the first port. `None` only when there are no ports.
pub fn pick_port(names: &[String], wanted: &str) -> Option<(usize, PortMatch)> {
    if let Some(i) = names.iter().position(|n| n == wanted) {
        return Some((i, PortMatch::Exact));
    }
    let needle = wanted.to_lowercase();
    if !needle.is_empty() {
        if let Some(i) = names.iter().position(|n| n.to_lowercase().contains(&needle)) {
            return Some((i, PortMatch::Partial));
        }
    }
    if names.is_empty() {
        None
    } else {
        Some((0, PortMatch::Fallback))
    }
}

pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    Ok(midi_out
        .ports()
        .iter()
        .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "Unknown".to_string()))
        .collect())
}

pub struct MidirSink {
    conn: Option<MidiOutputConnection>,
    name: String,
}

impl MidirSink {
    /// Connect to the output port named `wanted`, falling back to the first
    /// available port with a warning.
    pub fn open(wanted: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "Unknown".to_string()))
            .collect();

        log::info!("Available MIDI outputs: {:?}", names);

        let (index, how) = pick_port(&names, wanted).ok_or(Error::NoMidiOutput)?;
        let name = names[index].clone();
        match how {
            PortMatch::Exact => log::info!("Connected to MIDI port: {}", name),
            PortMatch::Partial => log::info!("Connected to MIDI port: {} (matched '{}')", name, wanted),
            PortMatch::Fallback => {
                log::warn!("MIDI port '{}' not found, using fallback port: {}", wanted, name)
            }
        }

        let conn = midi_out.connect(&ports[index], "eegmidi-out")?;
        Ok(Self {
            conn: Some(conn),
            name,
        })
    }

    /// Publish a virtual output port other applications can connect to.
    #[cfg(unix)]
    pub fn open_virtual(name: &str) -> Result<Self> {
        use midir::os::unix::VirtualOutput;

        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let conn = midi_out.create_virtual(name)?;
        log::info!("Created virtual MIDI port: {}", name);
        Ok(Self {
            conn: Some(conn),
            name: name.to_string(),
        })
    }

    #[cfg(not(unix))]
    pub fn open_virtual(_name: &str) -> Result<Self> {
        Err(Error::MidiPort(
            "virtual ports are not supported on this platform; use loopMIDI and --port".into(),
        ))
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, event: &MidiEvent) -> Result<()> {
        if let Some(conn) = self.conn.as_mut() {
            conn.send(&event.to_bytes())?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MidirSink {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
            log::info!("Closed MIDI port: {}", self.name);
        }
    }
}

/// Writes one JSON object per event, stamped with the run clock in seconds.
pub struct JsonLinesSink<W: Write> {
    out: W,
    clock: SharedClock,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W, clock: SharedClock) -> Self {
        Self { out, clock }
    }
}

impl<W: Write> MidiSink for JsonLinesSink<W> {
    fn send(&mut self, event: &MidiEvent) -> Result<()> {
        let line = serde_json::json!({
            "t": (self.clock.now().as_secs_f64() * 1000.0).round() / 1000.0,
            "event": event,
        });
        writeln!(self.out, "{}", line)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Default)]
pub struct CollectSink {
    pub events: Vec<MidiEvent>,
}

#[cfg(test)]
impl MidiSink for CollectSink {
    fn send(&mut self, event: &MidiEvent) -> Result<()> {
        self.events.push(*event);
        Ok(())
    }

    fn name(&self) -> &str {
        "collect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::{Clock, VirtualClock};
    use std::rc::Rc;
    use std::time::Duration;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dry_run_lines_follow_the_run_clock() {
        let clock = VirtualClock::new();
        let mut sink = JsonLinesSink::new(Vec::new(), Rc::new(clock.clone()));
        sink.send(&MidiEvent::note_on(0, 60, 90)).unwrap();
        clock.sleep_until(Duration::from_millis(3250));
        sink.send(&MidiEvent::note_off(0, 60, 0)).unwrap();

        let text = String::from_utf8(sink.out).unwrap();
        let stamps: Vec<f64> = text
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["t"].as_f64().unwrap())
            .collect();
        assert_eq!(stamps, vec![0.0, 3.25]);
    }

    #[test]
    fn prefers_exact_port_name() {
        let ports = names(&["EEG_MIDI 1", "EEG_MIDI 2"]);
        assert_eq!(pick_port(&ports, "EEG_MIDI 2"), Some((1, PortMatch::Exact)));
    }

    #[test]
    fn matches_substring_case_insensitively() {
        let ports = names(&["Midi Through:0", "loopMIDI Port EEG_MIDI 1 20:0"]);
        assert_eq!(pick_port(&ports, "eeg_midi 1"), Some((1, PortMatch::Partial)));
    }

    #[test]
    fn falls_back_to_first_port() {
        let ports = names(&["FLUID Synth", "Timidity"]);
        assert_eq!(pick_port(&ports, "EEG_MIDI 2"), Some((0, PortMatch::Fallback)));
    }

    #[test]
    fn no_ports_means_no_choice() {
        assert_eq!(pick_port(&[], "EEG_MIDI 1"), None);
    }

    #[test]
    fn json_lines_carry_event_fields() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesSink::new(&mut buf, Rc::new(VirtualClock::new()));
            sink.send(&MidiEvent::note_on(0, 60, 90)).unwrap();
            sink.send(&MidiEvent::note_off(0, 60, 0)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"]["type"], "note_on");
        assert_eq!(lines[0]["event"]["note"], 60);
        assert_eq!(lines[1]["event"]["type"], "note_off");
        assert!(lines[1]["t"].is_number());
    }
}
