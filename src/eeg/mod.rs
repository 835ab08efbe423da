pub mod analysis;
pub mod bands;
pub mod recording;
pub mod ring;
pub mod welch;
