use clap::Parser;
use std::path::PathBuf;

use crate::config::Mode;

#[derive(Parser, Debug)]
#[command(name = "eegmidi", about = "Turn live or recorded EEG band power into MIDI")]
pub struct Cli {
    /// Recorded CSV table (header row, optional Time column)
    pub input: Option<PathBuf>,

    /// Read live CSV rows from stdin
    #[arg(long, conflicts_with_all = ["input", "synthetic"])]
    pub stdin: bool,

    /// Generate a synthetic EEG-like signal instead of reading input
    #[arg(long, conflicts_with = "input")]
    pub synthetic: bool,

    /// Built-in or user preset to start from
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Config file (default: ./eegmidi.toml, then the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override a config value, e.g. --set analysis.window_seconds=0.5
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Run mode
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// MIDI output port name (exact or substring)
    #[arg(long)]
    pub port: Option<String>,

    /// Create a virtual MIDI output port with this name
    #[arg(long)]
    pub virtual_port: Option<String>,

    /// Print MIDI events as JSON lines instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Channels to analyse by name or index (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub channel: Vec<String>,

    /// Analysis window in seconds
    #[arg(short, long)]
    pub window: Option<f64>,

    /// Exponential smoothing factor (0.0-1.0, 1.0 = off)
    #[arg(long)]
    pub smoothing: Option<f64>,

    /// Sample rate of the input in Hz
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Don't wait in real time; render as fast as possible
    #[arg(long)]
    pub no_pacing: bool,

    /// Stop after this many seconds of input
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// List MIDI output ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// List presets and exit
    #[arg(long)]
    pub list_presets: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_overrides_and_channel_lists() {
        let cli = Cli::parse_from([
            "eegmidi",
            "rec.csv",
            "--set",
            "midi.channel=2",
            "--set",
            "gate.on=0.5",
            "--channel",
            "AF7,AF8",
            "--mode",
            "melody",
        ]);
        assert_eq!(cli.input, Some(PathBuf::from("rec.csv")));
        assert_eq!(cli.overrides, vec!["midi.channel=2", "gate.on=0.5"]);
        assert_eq!(cli.channel, vec!["AF7", "AF8"]);
        assert_eq!(cli.mode, Some(Mode::Melody));
    }

    #[test]
    fn stdin_excludes_file_input() {
        assert!(Cli::try_parse_from(["eegmidi", "rec.csv", "--stdin"]).is_err());
    }
}
