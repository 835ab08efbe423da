use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use super::{Analysis, ShapingChain};
use crate::config::Config;
use crate::eeg::analysis::{power_series, window_starts};
use crate::eeg::recording::{resolve_channels, Recording};
use crate::error::Result;
use crate::midi::event::MidiEvent;
use crate::midi::mapper::ValueMapper;
use crate::midi::sink::MidiSink;
use crate::pacer::{secs, Pacer, SharedClock};
use crate::shaping::normalize::Baseline;

/// Tempo factor for one window: stronger levels shorten it.
pub fn tempo_factor(cfg: &Config, level: f64) -> f64 {
    let p = &cfg.pacing;
    (1.0 - p.tempo_scale * level).clamp(p.tempo_min, p.tempo_max)
}

/// Windowed driver for melody mode. Measures every full window of the
/// recording up front, then plays one chord per window paced to the
/// recording's own clock. Tempo only shortens the notes; each window still
/// ends at its recorded time.
pub fn run_windowed(
    cfg: &Config,
    recording: &Recording,
    sink: &mut dyn MidiSink,
    clock: SharedClock,
    stop: &AtomicBool,
    show_progress: bool,
) -> Result<usize> {
    let channels = resolve_channels(&recording.channel_names, &cfg.input.channels)?;
    let fs = recording.sample_rate;
    let window_samples = cfg.window_samples(fs);
    let window_seconds = window_samples as f64 / fs;
    let analysis = Analysis::from_config(cfg);

    let starts = window_starts(recording.samples.len(), window_samples);
    if starts.is_empty() {
        log::warn!(
            "Recording has {} samples, fewer than one {}-sample window; nothing to play",
            recording.samples.len(),
            window_samples
        );
        return Ok(0);
    }

    let powers = power_series(
        recording,
        &starts,
        window_samples,
        &channels,
        &analysis.bands,
        cfg.analysis.measure,
        &analysis.estimator,
    );

    let norm = &cfg.shaping.normalization;
    let mut chains = Vec::with_capacity(analysis.slots.len());
    for (j, slot) in analysis.slots.iter().enumerate() {
        let baseline = if norm.needs_baseline() {
            let series: Vec<f64> = powers.iter().map(|row| row[j]).collect();
            let b = Baseline::from_series(&series);
            log::info!("Baseline {}: mean {:.4}, std {:.4}", slot, b.mean, b.std);
            Some(b)
        } else {
            None
        };
        chains.push(ShapingChain::new(cfg.shaping.smoothing, norm, baseline)?);
    }

    log::info!(
        "Pass 2: playing {} windows of {:.3}s ({:?})",
        starts.len(),
        window_seconds,
        analysis.slots
    );

    let pb = if show_progress {
        ProgressBar::new(starts.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} windows ({eta} remaining)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let mut pacer = Pacer::new(clock, secs(cfg.pacing.send_interval));
    let mut player = WindowPlayer {
        cfg,
        mapper: &analysis.mapper,
        slots: &analysis.slots,
        chains,
        window_seconds,
        start: pacer.now(),
    };

    let mut played = 0;
    let mut result = Ok(());
    for (k, (&start, values)) in starts.iter().zip(&powers).enumerate() {
        if stop.load(Ordering::Relaxed) {
            log::info!("Interrupted after {} of {} windows", k, starts.len());
            break;
        }
        let time = (start + window_samples) as f64 / fs;
        if let Err(e) = player.play(k, time, values, &mut pacer, sink) {
            result = Err(e);
            break;
        }
        played += 1;
        pb.set_position(played as u64);
    }
    pb.finish_with_message("Playback complete");

    let cleanup = pacer.drain(sink);
    result.and(cleanup).map(|_| played)
}

struct WindowPlayer<'a> {
    cfg: &'a Config,
    mapper: &'a ValueMapper,
    slots: &'a [String],
    chains: Vec<ShapingChain>,
    window_seconds: f64,
    /// Clock reading when playback began
    start: Duration,
}

impl WindowPlayer<'_> {
    /// NoteOn per value now, NoteOffs after the hold, then wait until the
    /// window's end time in the recording.
    fn play(&mut self, index: usize, time: f64, values: &[f64], pacer: &mut Pacer, sink: &mut dyn MidiSink) -> Result<()> {
        let levels: Vec<f64> = values
            .iter()
            .zip(self.chains.iter_mut())
            .map(|(&v, chain)| chain.apply(v, time))
            .collect();

        let mean_level = levels.iter().sum::<f64>() / levels.len().max(1) as f64;
        let tempo = tempo_factor(self.cfg, mean_level);
        let hold = secs(self.window_seconds * tempo * self.cfg.pacing.note_fraction);
        let channel = self.cfg.midi.channel;

        let now = pacer.now();
        for (j, &level) in levels.iter().enumerate() {
            let offset = (j * self.cfg.midi.band_note_step as usize).min(127) as u8;
            let note = self.mapper.note_with_offset(ValueMapper::midi_value(level), offset);
            let velocity = self.mapper.velocity(level);

            log::info!(
                "Window {} {}: power {:.4} level {:.3} -> note {} velocity {}",
                index,
                self.slots[j],
                values[j],
                level,
                note,
                velocity
            );

            sink.send(&MidiEvent::note_on(channel, note, velocity))?;
            pacer.schedule(now + hold, MidiEvent::note_off(channel, note, 0));
        }

        pacer.run_until(now + hold, sink)?;
        pacer.run_until(self.start + secs(time), sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_table;
    use crate::midi::sink::CollectSink;
    use crate::pacer::{Clock, VirtualClock};
    use std::rc::Rc;
    use std::sync::Arc;

    fn config(text: &str) -> Config {
        let cfg = from_table(text.parse().unwrap()).unwrap();
        cfg.validate().unwrap();
        cfg
    }

    fn recording(seconds: usize) -> Recording {
        let fs = 256.0;
        let samples = (0..seconds * 256)
            .map(|i| {
                let t = i as f64 / fs;
                let amp = 5.0 + 5.0 * (i / 256) as f64;
                vec![amp * (std::f64::consts::TAU * 10.0 * t).sin(), 0.0]
            })
            .collect();
        Recording {
            channel_names: vec!["AF7".into(), "AF8".into()],
            samples,
            sample_rate: fs,
        }
    }

    /// Collects events together with the clock reading at send time.
    struct TimedSink {
        clock: VirtualClock,
        events: Vec<(Duration, MidiEvent)>,
    }

    impl MidiSink for TimedSink {
        fn send(&mut self, event: &MidiEvent) -> Result<()> {
            self.events.push((self.clock.now(), *event));
            Ok(())
        }

        fn name(&self) -> &str {
            "timed"
        }
    }

    #[test]
    fn n_windows_take_n_seconds() {
        let cfg = config("mode = \"melody\"\n[input]\nchannels = [\"AF7\"]\n");
        let clock = VirtualClock::new();
        let mut sink = CollectSink::default();
        let played = run_windowed(
            &cfg,
            &recording(6),
            &mut sink,
            Rc::new(clock.clone()),
            &AtomicBool::new(false),
            false,
        )
        .unwrap();
        assert_eq!(played, 6);
        assert_eq!(clock.now(), Duration::from_secs(6));
        assert_eq!(sink.events.len(), 12);
    }

    #[test]
    fn note_offs_precede_next_note_ons() {
        let cfg = config(
            "mode = \"melody\"\n\
             [input]\nchannels = [\"AF7\"]\n\
             [analysis]\nbands = [\"theta\", \"alpha\", \"beta\"]\n",
        );
        let clock = VirtualClock::new();
        let mut sink = TimedSink { clock: clock.clone(), events: Vec::new() };
        run_windowed(&cfg, &recording(4), &mut sink, Rc::new(clock), &AtomicBool::new(false), false).unwrap();

        assert_eq!(sink.events.len(), 4 * 3 * 2);
        for (w, group) in sink.events.chunks(6).enumerate() {
            let start = Duration::from_secs(w as u64);
            for (t, ev) in &group[..3] {
                assert!(matches!(ev, MidiEvent::NoteOn { .. }));
                assert_eq!(*t, start);
            }
            for (t, ev) in &group[3..] {
                assert!(matches!(ev, MidiEvent::NoteOff { .. }));
                assert_eq!(*t, start + Duration::from_millis(500));
            }
            // band offsets keep the chord's notes apart
            let notes: Vec<u8> = group[..3]
                .iter()
                .map(|(_, e)| match e {
                    MidiEvent::NoteOn { note, .. } => *note,
                    _ => unreachable!(),
                })
                .collect();
            assert!(notes[0] != notes[1] || notes[1] != notes[2]);
        }
    }

    #[test]
    fn louder_windows_play_higher_notes() {
        let cfg = config(
            "mode = \"melody\"\n\
             [input]\nchannels = [\"AF7\"]\n\
             [shaping.normalization]\nkind = \"static\"\nlow = 0.0\nhigh = 20.0\n",
        );
        let mut sink = CollectSink::default();
        run_windowed(&cfg, &recording(4), &mut sink, Rc::new(VirtualClock::new()), &AtomicBool::new(false), false)
            .unwrap();
        let notes: Vec<u8> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                MidiEvent::NoteOn { note, .. } => Some(*note),
                _ => None,
            })
            .collect();
        assert_eq!(notes.len(), 4);
        assert!(notes.windows(2).all(|w| w[0] <= w[1]), "{notes:?}");
        assert!(notes[3] > notes[0]);
    }

    #[test]
    fn tempo_shortens_notes_but_keeps_recording_time() {
        let cfg = config(
            "mode = \"melody\"\n\
             [analysis]\nmeasure = \"mean_square\"\n\
             [shaping.normalization]\nkind = \"zscore\"\n\
             [midi]\nnote_high = 84\nvelocity_max = 100\nvelocity_curve = \"scale\"\n\
             [pacing]\ntempo_scale = 0.6\n",
        );
        let clock = VirtualClock::new();
        let mut sink = TimedSink { clock: clock.clone(), events: Vec::new() };
        run_windowed(&cfg, &recording(5), &mut sink, Rc::new(clock.clone()), &AtomicBool::new(false), false)
            .unwrap();

        assert_eq!(sink.events.len(), 10);
        assert_eq!(clock.now(), Duration::from_secs(5));

        let holds: Vec<Duration> = sink.events.chunks(2).map(|pair| pair[1].0 - pair[0].0).collect();
        for (w, pair) in sink.events.chunks(2).enumerate() {
            assert_eq!(pair[0].0, Duration::from_secs(w as u64));
        }
        assert!(holds.iter().all(|h| *h <= Duration::from_millis(500)), "{holds:?}");
        assert!(holds.iter().all(|h| *h >= Duration::from_millis(200)), "{holds:?}");
        assert!(holds[4] < holds[0], "{holds:?}");

        assert_eq!(tempo_factor(&cfg, 0.0), 1.0);
        assert_eq!(tempo_factor(&cfg, 1.0), 0.4);
    }

    #[test]
    fn short_recording_plays_nothing() {
        let cfg = config("mode = \"melody\"\n");
        let mut rec = recording(1);
        rec.samples.truncate(100);
        let mut sink = CollectSink::default();
        let played = run_windowed(&cfg, &rec, &mut sink, Rc::new(VirtualClock::new()), &AtomicBool::new(false), false)
            .unwrap();
        assert_eq!(played, 0);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn interrupted_playback_leaves_no_hanging_notes() {
        let cfg = config("mode = \"melody\"\n");
        let stop = AtomicBool::new(true);
        let mut sink = CollectSink::default();
        let played = run_windowed(&cfg, &recording(3), &mut sink, Rc::new(VirtualClock::new()), &stop, false).unwrap();
        assert_eq!(played, 0);
        assert!(sink.events.is_empty());
    }

    /// Raises the stop flag once the first NoteOn has gone out.
    struct StopAfterFirstNote {
        stop: Arc<AtomicBool>,
        events: Vec<MidiEvent>,
    }

    impl MidiSink for StopAfterFirstNote {
        fn send(&mut self, event: &MidiEvent) -> Result<()> {
            if matches!(event, MidiEvent::NoteOn { .. }) {
                self.stop.store(true, Ordering::Relaxed);
            }
            self.events.push(*event);
            Ok(())
        }

        fn name(&self) -> &str {
            "stop-after-first-note"
        }
    }

    #[test]
    fn stopping_mid_playback_closes_every_note() {
        let cfg = config(
            "mode = \"melody\"\n\
             [input]\nchannels = [\"AF7\"]\n\
             [analysis]\nbands = [\"theta\", \"alpha\", \"beta\"]\n",
        );
        let stop = Arc::new(AtomicBool::new(false));
        let mut sink = StopAfterFirstNote { stop: stop.clone(), events: Vec::new() };
        let played = run_windowed(&cfg, &recording(4), &mut sink, Rc::new(VirtualClock::new()), &stop, false).unwrap();

        assert_eq!(played, 1);
        let mut sounding = Vec::new();
        for ev in &sink.events {
            match *ev {
                MidiEvent::NoteOn { note, .. } => sounding.push(note),
                MidiEvent::NoteOff { note, .. } => {
                    let at = sounding.iter().position(|&n| n == note).expect("NoteOff without NoteOn");
                    sounding.remove(at);
                }
                _ => panic!("unexpected {ev:?}"),
            }
        }
        assert!(sounding.is_empty(), "left sounding: {sounding:?}");
        assert_eq!(sink.events.len(), 6);
    }
}
