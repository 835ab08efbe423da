use std::sync::atomic::{AtomicBool, Ordering};

use super::{Analysis, ShapingChain};
use crate::config::{Config, Mode};
use crate::eeg::recording::resolve_channels;
use crate::eeg::ring::RingBuffer;
use crate::error::Result;
use crate::midi::event::MidiEvent;
use crate::midi::gate::HysteresisGate;
use crate::midi::sink::MidiSink;
use crate::pacer::{secs, Pacer, SharedClock};
use crate::shaping::normalize::{normalize_across, Normalization};
use crate::source::SampleSource;

/// Everything a streaming run owns between chunks.
pub struct PipelineState {
    pub ring: RingBuffer,
    /// Channel indices mixed into each lane
    pub lanes: Vec<Vec<usize>>,
    /// `[lane][slot]`
    pub chains: Vec<Vec<ShapingChain>>,
    pub gate: Option<HysteresisGate>,
    pub pacer: Pacer,
    pub windows: usize,
}

impl PipelineState {
    pub fn new(cfg: &Config, lanes: Vec<Vec<usize>>, window_samples: usize, slots: usize, clock: SharedClock) -> Result<Self> {
        let chains = lanes
            .iter()
            .map(|_| {
                (0..slots)
                    .map(|_| ShapingChain::new(cfg.shaping.smoothing, &cfg.shaping.normalization, None))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let gate = (cfg.mode == Mode::Gate)
            .then(|| HysteresisGate::new(cfg.thresholds(), cfg.midi.channel, lanes.len()));

        Ok(Self {
            ring: RingBuffer::new(window_samples),
            lanes,
            chains,
            gate,
            pacer: Pacer::new(clock, secs(cfg.pacing.send_interval)),
            windows: 0,
        })
    }

    /// Release sounding notes and flush everything scheduled.
    pub fn finish(&mut self, sink: &mut dyn MidiSink) -> Result<()> {
        if let Some(gate) = self.gate.as_mut() {
            let offs = gate.release_all();
            if !offs.is_empty() {
                log::info!("Releasing {} sounding note(s)", offs.len());
            }
            for ev in offs {
                sink.send(&ev)?;
            }
        }
        self.pacer.drain(sink)
    }
}

/// Live driver for control and gate modes: analyse the newest window after
/// every chunk and emit as soon as values change.
pub fn run_streaming(
    cfg: &Config,
    source: &mut dyn SampleSource,
    sink: &mut dyn MidiSink,
    clock: SharedClock,
    stop: &AtomicBool,
) -> Result<usize> {
    let channels = resolve_channels(source.channel_names(), &cfg.input.channels)?;
    let fs = source.sample_rate();
    let window_samples = cfg.window_samples(fs);
    let analysis = Analysis::from_config(cfg);

    let lanes: Vec<Vec<usize>> = match cfg.mode {
        Mode::Gate => channels.iter().map(|&c| vec![c]).collect(),
        _ => vec![channels.clone()],
    };

    let names: Vec<&str> = channels
        .iter()
        .map(|&i| source.channel_names()[i].as_str())
        .collect();
    log::info!(
        "Streaming {:?} mode: channels {:?} of {}, {} lane(s), window {} samples, values {:?}",
        cfg.mode,
        names,
        source.channel_count(),
        lanes.len(),
        window_samples,
        analysis.slots
    );

    let mut state = PipelineState::new(cfg, lanes, window_samples, analysis.slots.len(), clock)?;
    let result = stream_loop(cfg, &analysis, source, sink, &mut state, stop);
    let cleanup = state.finish(sink);

    log::info!("Processed {} windows", state.windows);
    result.and(cleanup).map(|_| state.windows)
}

fn stream_loop(
    cfg: &Config,
    analysis: &Analysis,
    source: &mut dyn SampleSource,
    sink: &mut dyn MidiSink,
    state: &mut PipelineState,
    stop: &AtomicBool,
) -> Result<()> {
    let timeout = secs(cfg.input.timeout_seconds);
    let fs = source.sample_rate();

    loop {
        if stop.load(Ordering::Relaxed) {
            log::info!("Interrupted, shutting down");
            return Ok(());
        }
        state.pacer.flush_due(sink)?;

        let Some(chunk) = source.pull_chunk(timeout, cfg.input.max_chunk)? else {
            log::info!("Source exhausted");
            return Ok(());
        };
        if chunk.is_empty() {
            log::debug!("No samples within {:.1}s, waiting", cfg.input.timeout_seconds);
            continue;
        }

        let time = chunk.last_time().unwrap_or_default();
        state.ring.extend(chunk.samples);
        if !state.ring.is_full() {
            log::debug!("Buffering {}/{} samples", state.ring.len(), state.ring.capacity());
            continue;
        }

        let window = state.ring.snapshot();
        let values: Vec<Vec<f64>> = state
            .lanes
            .iter()
            .map(|lane| {
                analysis
                    .estimator
                    .measure(&window, lane, fs, &analysis.bands, cfg.analysis.measure)
            })
            .collect();
        state.windows += 1;

        match cfg.mode {
            Mode::Gate => emit_gate(cfg, analysis, state, &values, time, sink)?,
            _ => emit_control(cfg, analysis, state, &values[0], time, sink)?,
        }
    }
}

fn emit_control(
    cfg: &Config,
    analysis: &Analysis,
    state: &mut PipelineState,
    values: &[f64],
    time: f64,
    sink: &mut dyn MidiSink,
) -> Result<()> {
    for (j, &raw) in values.iter().enumerate() {
        let level = state.chains[0][j].apply(raw, time);
        let controller = cfg.midi.controllers[j];
        let value = analysis.mapper.cc(level);
        if state.pacer.allow(controller) {
            log::debug!(
                "{}: power {:.3} level {:.3} -> CC{} = {}",
                analysis.slots[j],
                raw,
                level,
                controller,
                value
            );
            sink.send(&MidiEvent::control_change(cfg.midi.channel, controller, value))?;
        }
    }
    Ok(())
}

/// Each lane's first measured value drives its gate.
fn emit_gate(
    cfg: &Config,
    analysis: &Analysis,
    state: &mut PipelineState,
    values: &[Vec<f64>],
    time: f64,
    sink: &mut dyn MidiSink,
) -> Result<()> {
    let smoothed: Vec<f64> = values
        .iter()
        .zip(state.chains.iter_mut())
        .map(|(v, chains)| chains[0].smooth(v.first().copied().unwrap_or_default()))
        .collect();

    let levels: Vec<f64> = if matches!(cfg.shaping.normalization, Normalization::AcrossChannels) {
        normalize_across(&smoothed)
    } else {
        smoothed
            .iter()
            .zip(state.chains.iter_mut())
            .map(|(&s, chains)| chains[0].level(s, time))
            .collect()
    };

    log::debug!("levels {:.2?}", levels);

    let Some(gate) = state.gate.as_mut() else {
        return Ok(());
    };
    for (lane, &level) in levels.iter().enumerate() {
        let note = (cfg.midi.base_note as usize + lane).min(127) as u8;
        let velocity = analysis.mapper.velocity(level);
        if let Some(ev) = gate.update(lane, level, time, note, velocity) {
            log::debug!("lane {}: level {:.2} -> {:?}", lane, level, ev);
            sink.send(&ev)?;
        }
    }
    Ok(())
}
