mod cli;
mod config;
mod eeg;
mod error;
mod midi;
mod pacer;
mod pipeline;
mod presets;
mod shaping;
mod source;

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use toml::Table;

use cli::Cli;
use config::{Config, Mode};
use eeg::recording::load_recording;
use midi::sink::{list_output_ports, JsonLinesSink, MidiSink, MidirSink};
use pacer::{SharedClock, SystemClock, VirtualClock};
use presets::loader;
use source::replay::ReplaySource;
use source::stream::StreamSource;
use source::synthetic::{SyntheticSource, DEFAULT_CHANNELS};
use source::SampleSource;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_presets {
        println!("Available presets:");
        for p in loader::list_presets()? {
            let origin = if p.user { " (user)" } else { "" };
            println!("  {:<12} {}{}", p.name, p.description, origin);
        }
        return Ok(());
    }

    if cli.list_ports {
        let ports = list_output_ports().context("Failed to query MIDI outputs")?;
        println!("Available MIDI output ports:");
        if ports.is_empty() {
            println!("  (none)");
        }
        for (i, name) in ports.iter().enumerate() {
            println!("  [{}] {}", i, name);
        }
        return Ok(());
    }

    let cfg = build_config(&cli)?;
    cfg.validate().context("Invalid configuration")?;

    log::info!("eegmidi - EEG band power to MIDI");
    log::info!("Mode: {:?}", cfg.mode);
    log::info!(
        "Window: {}s, bands: {:?}, normalization: {:?}",
        cfg.analysis.window_seconds,
        cfg.slot_names(),
        cfg.shaping.normalization
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("Failed to install Ctrl-C handler")?;
    }

    let clock: SharedClock = if cli.no_pacing {
        log::info!("Pacing disabled: events are rendered without waiting");
        Rc::new(VirtualClock::new())
    } else {
        Rc::new(SystemClock::new())
    };

    let mut sink = open_sink(&cli, &cfg, clock.clone())?;
    log::info!("Output: {}", sink.name());

    let windows = match cfg.mode {
        Mode::Melody => {
            let path = cli
                .input
                .as_ref()
                .context("Melody mode plays a recording; pass a CSV file")?;
            let mut recording = load_recording(path, cfg.input.sample_rate, &cfg.input.time_column)
                .with_context(|| format!("Failed to load recording: {}", path.display()))?;
            if let Some(limit) = cli.duration {
                let keep = (limit.max(0.0) * recording.sample_rate).round() as usize;
                recording.samples.truncate(keep);
            }
            pipeline::recorded::run_windowed(&cfg, &recording, sink.as_mut(), clock, &stop, true)?
        }
        Mode::Control | Mode::Gate => {
            let mut source = open_source(&cli, &cfg, clock.clone())?;
            pipeline::streaming::run_streaming(&cfg, source.as_mut(), sink.as_mut(), clock, &stop)?
        }
    };

    drop(sink);
    log::info!("Done! {} windows", windows);
    Ok(())
}

/// Preset, then config file, then `--set` overrides, then explicit flags.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut table = match &cli.preset {
        Some(name) => {
            log::info!("Preset: {}", name);
            loader::load_preset(name)?
        }
        None => Table::new(),
    };

    if let Some(path) = cli.config.clone().or_else(config::find_config_file) {
        let file = config::load_table(&path)?;
        log::info!("Loaded config from {}", path.display());
        config::merge(&mut table, file);
    }

    for assignment in &cli.overrides {
        config::apply_override(&mut table, assignment)?;
    }

    let mut cfg = config::from_table(table)?;

    if let Some(mode) = cli.mode {
        cfg.mode = mode;
    }
    if !cli.channel.is_empty() {
        cfg.input.channels = cli.channel.clone();
    }
    if let Some(w) = cli.window {
        cfg.analysis.window_seconds = w;
    }
    if let Some(s) = cli.smoothing {
        cfg.shaping.smoothing = s;
    }
    if let Some(fs) = cli.sample_rate {
        cfg.input.sample_rate = fs;
    }
    if let Some(ref port) = cli.port {
        cfg.midi.port = port.clone();
    }
    if cli.virtual_port.is_some() {
        cfg.midi.virtual_port = cli.virtual_port.clone();
    }
    Ok(cfg)
}

fn open_sink(cli: &Cli, cfg: &Config, clock: SharedClock) -> Result<Box<dyn MidiSink>> {
    if cli.dry_run {
        return Ok(Box::new(JsonLinesSink::new(std::io::stdout(), clock)));
    }
    let sink = match cfg.midi.virtual_port {
        Some(ref name) => MidirSink::open_virtual(name)
            .with_context(|| format!("Failed to create virtual MIDI port '{}'", name))?,
        None => MidirSink::open(&cfg.midi.port).context("Failed to open MIDI output")?,
    };
    Ok(Box::new(sink))
}

fn open_source(cli: &Cli, cfg: &Config, clock: SharedClock) -> Result<Box<dyn SampleSource>> {
    let fs = cfg.input.sample_rate;

    if cli.synthetic {
        let names = DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect();
        return Ok(Box::new(SyntheticSource::new(names, fs, clock, cli.duration)));
    }

    if cli.stdin {
        let source = StreamSource::spawn(std::io::stdin(), fs, &cfg.input.time_column)
            .context("Failed to read stream header from stdin")?;
        return Ok(Box::new(source));
    }

    let Some(path) = cli.input.as_ref() else {
        return Err(error::Error::NoSource("pass a CSV recording, --stdin or --synthetic".into()).into());
    };
    let recording = load_recording(path, fs, &cfg.input.time_column)
        .with_context(|| format!("Failed to load recording: {}", path.display()))?;
    log::info!("Replaying {} in real time", path.display());
    Ok(Box::new(ReplaySource::new(recording, clock, cli.duration)))
}
