//! Core type definitions shared across the workspace.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A named spectral or derived channel group that can feed a model input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Band {
    /// Three-band visible image
    #[serde(rename = "I")]
    I,
    /// Index features derived from the visible image
    #[serde(rename = "IF")]
    IF,
    /// Multispectral bands
    #[serde(rename = "M")]
    M,
    /// Index features derived from the multispectral bands
    #[serde(rename = "MI")]
    MI,
    /// Per-tile normalized multispectral bands
    #[serde(rename = "MN")]
    MN,
    /// Short-wave infrared bands
    #[serde(rename = "A")]
    A,
    /// Panchromatic band
    #[serde(rename = "P")]
    P,
}

impl Band {
    /// All known bands, in a stable order
    pub const ALL: [Band; 7] = [Band::I, Band::IF, Band::M, Band::MI, Band::MN, Band::A, Band::P];

    /// Short name used in presets and on disk
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::I => "I",
            Band::IF => "IF",
            Band::M => "M",
            Band::MI => "MI",
            Band::MN => "MN",
            Band::A => "A",
            Band::P => "P",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Band {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Band::ALL
            .iter()
            .copied()
            .find(|band| band.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown band name '{s}'")))
    }
}

/// Registered model architectures.
///
/// Presets refer to an architecture by this id; the training crate maps
/// each id to a constructor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArchId {
    /// Flat stack of same-padded convolutions
    Fcn,
    /// Two-level encoder/decoder with skip connections
    Unet,
}

impl std::fmt::Display for ArchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchId::Fcn => write!(f, "fcn"),
            ArchId::Unet => write!(f, "unet"),
        }
    }
}

/// How the batch sampler walks the patch corpus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Reshuffle the corpus at every pass
    #[default]
    Random,
    /// Walk the corpus in extraction order
    Grid,
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchMode::Random => write!(f, "random"),
            BatchMode::Grid => write!(f, "grid"),
        }
    }
}

/// Dense `channels x height x width` array of `f32`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Raster {
    /// Wraps existing CHW data, checking its length
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let expected = channels * height * width;
        if data.len() != expected {
            return Err(Error::Data(format!(
                "raster {channels}x{height}x{width} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    /// All-zero raster
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Builds a raster by evaluating `f(channel, y, x)` for every cell
    pub fn from_fn(
        channels: usize,
        height: usize,
        width: usize,
        mut f: impl FnMut(usize, usize, usize) -> f32,
    ) -> Self {
        let mut data = Vec::with_capacity(channels * height * width);
        for c in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    data.push(f(c, y, x));
                }
            }
        }
        Self {
            channels,
            height,
            width,
            data,
        }
    }

    #[inline]
    pub fn index(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }

    #[inline]
    pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(c, y, x)]
    }

    /// Spatial extent as `(height, width)`
    pub fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Where a run of concatenated image channels came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSpan {
    /// Input name declared in the preset
    pub input: String,
    /// Source band
    pub band: Band,
    /// First channel of this input inside the concatenated patch
    pub offset: usize,
    /// Number of channels contributed
    pub count: usize,
}
