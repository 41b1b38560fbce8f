//! Error types for the tile segmentation pipeline.

use thiserror::Error;

/// Main error type for the tile segmentation pipeline.
///
/// `Config` and `Data` are raised before any training stage starts.
/// `Training` aborts a run that is already under way; whatever checkpoint
/// was written last stays on disk.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Preset fields are inconsistent with each other or with the tiles
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tile data is missing or has the wrong shape
    #[error("Data error: {0}")]
    Data(String),

    /// Architecture factory failure, model shape mismatch or numeric divergence
    #[error("Training error: {0}")]
    Training(String),

    /// Checkpoint could not be written or read
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error was detected before any stage ran.
    pub fn is_pre_training(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Data(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Specialized Result type for tile segmentation operations.
pub type Result<T> = std::result::Result<T, Error>;
