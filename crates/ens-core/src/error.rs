//! Error types for ensemble

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mixer error: {0}")]
    Mixer(#[from] MixerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration file errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

/// Mixer setup errors
///
/// Only raised while configuring the engine. The per-cycle path never fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixerError {
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid frame duration: {0} ms")]
    InvalidFrameDuration(u32),

    #[error("Slot {index} out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, EnsembleError>;
