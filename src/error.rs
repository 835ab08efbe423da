//! Error types for acquisition, configuration and MIDI output.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No sample source: {0}")]
    NoSource(String),

    #[error("Missing channels in input: {}", .0.join(", "))]
    MissingChannels(Vec<String>),

    #[error("Invalid value in row {row}, column '{column}': {value:?}")]
    InvalidRow {
        row: usize,
        column: String,
        value: String,
    },

    #[error("No MIDI output ports available")]
    NoMidiOutput,

    #[error("MIDI port error: {0}")]
    MidiPort(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::MidiPort(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::MidiPort(e.to_string())
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::MidiPort(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
