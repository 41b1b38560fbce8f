//! Tile stores: where band and label rasters come from.
//!
//! The pipeline only needs two lookups per tile, one per band and one for
//! the label raster. Rasters must already be aligned to a common frame and
//! normalized; stores do no resampling.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tile_core::{Band, Error, Raster, Result};

/// Source of band and label rasters keyed by image id.
pub trait TileStore: Sync {
    /// Returns the `channels x height x width` raster of `band` for a tile
    fn load_band(&self, image_id: &str, band: Band) -> Result<Raster>;

    /// Returns the `classes x height x width` label raster for a tile
    fn load_mask(&self, image_id: &str) -> Result<Raster>;
}

/// In-memory store, mostly for tests and for callers that decode imagery
/// themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryTileStore {
    bands: HashMap<(String, Band), Raster>,
    masks: HashMap<String, Raster>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_band(&mut self, image_id: impl Into<String>, band: Band, raster: Raster) {
        self.bands.insert((image_id.into(), band), raster);
    }

    pub fn insert_mask(&mut self, image_id: impl Into<String>, raster: Raster) {
        self.masks.insert(image_id.into(), raster);
    }

    /// Builder form of [`insert_band`](Self::insert_band)
    pub fn with_band(mut self, image_id: impl Into<String>, band: Band, raster: Raster) -> Self {
        self.insert_band(image_id, band, raster);
        self
    }

    /// Builder form of [`insert_mask`](Self::insert_mask)
    pub fn with_mask(mut self, image_id: impl Into<String>, raster: Raster) -> Self {
        self.insert_mask(image_id, raster);
        self
    }
}

impl TileStore for MemoryTileStore {
    fn load_band(&self, image_id: &str, band: Band) -> Result<Raster> {
        self.bands
            .get(&(image_id.to_string(), band))
            .cloned()
            .ok_or_else(|| Error::Data(format!("tile '{image_id}' has no band {band}")))
    }

    fn load_mask(&self, image_id: &str) -> Result<Raster> {
        self.masks
            .get(image_id)
            .cloned()
            .ok_or_else(|| Error::Data(format!("tile '{image_id}' has no label raster")))
    }
}

/// Shape header stored next to each raw raster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RasterHeader {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

/// Directory of raw little-endian `f32` rasters.
///
/// Layout: `<root>/<band>/<id>.json` holds a [`RasterHeader`] and
/// `<root>/<band>/<id>.f32` the CHW values. Label rasters live under
/// `<root>/masks/`.
#[derive(Debug, Clone)]
pub struct RawTileStore {
    root_dir: PathBuf,
}

impl RawTileStore {
    pub const MASK_DIR: &'static str = "masks";

    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn paths(&self, group: &str, image_id: &str) -> (PathBuf, PathBuf) {
        let dir = self.root_dir.join(group);
        (
            dir.join(format!("{image_id}.json")),
            dir.join(format!("{image_id}.f32")),
        )
    }

    fn read(&self, group: &str, image_id: &str) -> Result<Raster> {
        let (header_path, data_path) = self.paths(group, image_id);
        if !header_path.exists() || !data_path.exists() {
            return Err(Error::Data(format!(
                "tile '{image_id}' missing under {}",
                self.root_dir.join(group).display()
            )));
        }

        let header: RasterHeader = serde_json::from_str(&fs::read_to_string(&header_path)?)?;
        let bytes = fs::read(&data_path)?;
        let expected = header
            .channels
            .checked_mul(header.height)
            .and_then(|n| n.checked_mul(header.width))
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                Error::Data(format!(
                    "{}: header {}x{}x{} is too large",
                    header_path.display(),
                    header.channels,
                    header.height,
                    header.width
                ))
            })?;
        if bytes.len() != expected {
            return Err(Error::Data(format!(
                "{} holds {} bytes, header {}x{}x{} needs {expected}",
                data_path.display(),
                bytes.len(),
                header.channels,
                header.height,
                header.width
            )));
        }

        let data = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Raster::new(header.channels, header.height, header.width, data)
    }

    fn write(&self, group: &str, image_id: &str, raster: &Raster) -> Result<()> {
        let (header_path, data_path) = self.paths(group, image_id);
        if let Some(parent) = header_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let header = RasterHeader {
            channels: raster.channels,
            height: raster.height,
            width: raster.width,
        };
        fs::write(&header_path, serde_json::to_string(&header)?)?;

        let mut bytes = Vec::with_capacity(raster.data.len() * 4);
        for value in &raster.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        fs::write(&data_path, bytes)?;
        Ok(())
    }

    /// Writes a band raster in the store layout
    pub fn write_band(&self, image_id: &str, band: Band, raster: &Raster) -> Result<()> {
        self.write(band.as_str(), image_id, raster)
    }

    /// Writes a label raster in the store layout
    pub fn write_mask(&self, image_id: &str, raster: &Raster) -> Result<()> {
        self.write(Self::MASK_DIR, image_id, raster)
    }
}

impl TileStore for RawTileStore {
    fn load_band(&self, image_id: &str, band: Band) -> Result<Raster> {
        self.read(band.as_str(), image_id)
    }

    fn load_mask(&self, image_id: &str) -> Result<Raster> {
        self.read(Self::MASK_DIR, image_id)
    }
}
