//! Core types and configuration for tile segmentation training.
//!
//! This crate holds what every other crate in the workspace agrees on:
//! the error type, band and raster types, the preset schema with its
//! validation, the built-in preset table, metric records and the small
//! helpers shared by the command-line tools.

pub mod error;
pub mod types;
pub mod config;
pub mod presets;
pub mod metrics;
pub mod cli;

pub use error::{Error, Result};
pub use types::*;
pub use config::*;
pub use presets::{PresetFile, PresetRegistry};
pub use metrics::*;
pub use cli::*;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::*;
    pub use crate::config::*;
    pub use crate::presets::PresetRegistry;
    pub use crate::metrics::*;
}
