//! Patch extraction: tiles in, a fixed-grid patch corpus out.
//!
//! The grid is taken from the label raster after class selection and mask
//! downscaling. Each input band is downscaled on its own, cut on the same
//! grid, and the per-input patches are concatenated along the channel axis
//! in declared order.

use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use tile_core::{ChannelSpan, Error, InputSpec, Preset, Raster, Result};
use tracing::{debug, info};

use crate::batch::PatchBatch;
use crate::store::TileStore;

/// Block-mean pooling by an integer factor.
///
/// `what` names the raster in the error raised when its extent is not
/// divisible by `factor`.
pub fn downscale(raster: &Raster, factor: usize, what: &str) -> Result<Raster> {
    if factor == 0 {
        return Err(Error::Config(format!("{what}: downscale factor must be positive")));
    }
    if factor == 1 {
        return Ok(raster.clone());
    }
    let (height, width) = raster.spatial();
    if height % factor != 0 || width % factor != 0 {
        return Err(Error::Config(format!(
            "{what}: {height}x{width} is not divisible by downscale {factor}"
        )));
    }

    let (out_h, out_w) = (height / factor, width / factor);
    let norm = 1.0 / (factor * factor) as f32;
    Ok(Raster::from_fn(raster.channels, out_h, out_w, |c, y, x| {
        let mut sum = 0.0;
        for dy in 0..factor {
            for dx in 0..factor {
                sum += raster.get(c, y * factor + dy, x * factor + dx);
            }
        }
        sum * norm
    }))
}

/// Grid position of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOrigin {
    /// Index into [`PatchCorpus::tile_ids`]
    pub tile: usize,
    pub row: usize,
    pub col: usize,
}

/// Everything extracted from one tile
struct TilePatches {
    image_shape: [usize; 3],
    mask_shape: [usize; 3],
    layout: Vec<ChannelSpan>,
    rows: usize,
    cols: usize,
    images: Vec<f32>,
    masks: Vec<f32>,
}

/// Cuts tiles into aligned image/mask patches for one preset.
pub struct PatchExtractor<'a> {
    preset: &'a Preset,
    show_progress: bool,
}

impl<'a> PatchExtractor<'a> {
    pub fn new(preset: &'a Preset) -> Self {
        Self {
            preset,
            show_progress: false,
        }
    }

    /// Shows a progress bar while tiles load
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Extracts every tile into one corpus.
    ///
    /// Tiles are loaded in parallel and concatenated in the order of
    /// `image_ids`, so the result does not depend on scheduling.
    pub fn extract<S: TileStore + ?Sized>(
        &self,
        store: &S,
        image_ids: &[String],
    ) -> Result<PatchCorpus> {
        if image_ids.is_empty() {
            return Err(Error::Data("no tiles to extract".to_string()));
        }

        let pb = if self.show_progress {
            let pb = ProgressBar::new(image_ids.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tiles")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };
        let loaded = AtomicUsize::new(0);

        let tiles: Vec<TilePatches> = image_ids
            .par_iter()
            .map(|id| {
                let tile = self.extract_tile(store, id);
                let count = loaded.fetch_add(1, Ordering::Relaxed) + 1;
                pb.set_position(count as u64);
                tile
            })
            .collect::<Result<Vec<_>>>()?;
        pb.finish_and_clear();

        let corpus = PatchCorpus::from_tiles(image_ids, tiles)?;
        info!(
            "Extracted {} patches from {} tiles (image {:?}, mask {:?})",
            corpus.len(),
            image_ids.len(),
            corpus.image_shape,
            corpus.mask_shape
        );
        Ok(corpus)
    }

    fn load_mask<S: TileStore + ?Sized>(&self, store: &S, image_id: &str) -> Result<Raster> {
        let raw = store.load_mask(image_id)?;
        let selected = match &self.preset.classes {
            None => raw,
            Some(classes) => {
                if let Some(&bad) = classes.iter().find(|&&c| c >= raw.channels) {
                    return Err(Error::Config(format!(
                        "preset '{}': class {bad} out of range, tile '{image_id}' has {} label channels",
                        self.preset.name, raw.channels
                    )));
                }
                Raster::from_fn(classes.len(), raw.height, raw.width, |k, y, x| {
                    raw.get(classes[k], y, x)
                })
            }
        };
        downscale(
            &selected,
            self.preset.mask_downscale,
            &format!("label raster of '{image_id}'"),
        )
    }

    fn load_input<S: TileStore + ?Sized>(
        &self,
        store: &S,
        image_id: &str,
        input: &InputSpec,
        rows: usize,
        cols: usize,
    ) -> Result<(Raster, usize)> {
        let what = format!("input '{}' of '{image_id}'", input.name);
        let raster = downscale(&store.load_band(image_id, input.band)?, input.downscale(), &what)?;
        let (height, width) = raster.spatial();
        if height % rows != 0 || width % cols != 0 || height / rows != width / cols {
            return Err(Error::Config(format!(
                "{what}: {height}x{width} does not split into a {rows}x{cols} grid of square patches"
            )));
        }
        Ok((raster, height / rows))
    }

    fn extract_tile<S: TileStore + ?Sized>(&self, store: &S, image_id: &str) -> Result<TilePatches> {
        let preset = self.preset;
        let m = preset.mask_patch_size;

        let mask = self.load_mask(store, image_id)?;
        let (mask_h, mask_w) = mask.spatial();
        if mask_h == 0 || mask_w == 0 {
            return Err(Error::Data(format!("label raster of '{image_id}' is empty")));
        }
        if mask_h % m != 0 || mask_w % m != 0 {
            return Err(Error::Config(format!(
                "label raster of '{image_id}': {mask_h}x{mask_w} is not a multiple of mask patch size {m}"
            )));
        }
        let (rows, cols) = (mask_h / m, mask_w / m);

        let mut inputs = Vec::with_capacity(preset.inputs.len());
        let mut layout = Vec::with_capacity(preset.inputs.len());
        let mut patch_size: Option<usize> = preset.image_patch_size;
        let mut offset = 0;
        for input in &preset.inputs {
            let (raster, size) = self.load_input(store, image_id, input, rows, cols)?;
            match patch_size {
                Some(expected) if expected != size => {
                    return Err(Error::Config(format!(
                        "input '{}' of '{image_id}' gives image patch size {size}, expected {expected}",
                        input.name
                    )));
                }
                _ => patch_size = Some(size),
            }
            layout.push(ChannelSpan {
                input: input.name.clone(),
                band: input.band,
                offset,
                count: raster.channels,
            });
            offset += raster.channels;
            inputs.push(raster);
        }
        let s = patch_size.ok_or_else(|| {
            Error::Config(format!("preset '{}' declares no inputs", preset.name))
        })?;

        let image_shape = [offset, s, s];
        let mask_shape = [mask.channels, m, m];
        let count = rows * cols;
        let mut images = Vec::with_capacity(count * offset * s * s);
        let mut masks = Vec::with_capacity(count * mask.channels * m * m);
        for row in 0..rows {
            for col in 0..cols {
                for raster in &inputs {
                    copy_window(raster, row * s, col * s, s, &mut images);
                }
                copy_window(&mask, row * m, col * m, m, &mut masks);
            }
        }
        debug!("Tile '{image_id}': {rows}x{cols} patches, image {image_shape:?}");

        Ok(TilePatches {
            image_shape,
            mask_shape,
            layout,
            rows,
            cols,
            images,
            masks,
        })
    }
}

/// Appends the `size x size` window at `(top, left)` of every channel
fn copy_window(raster: &Raster, top: usize, left: usize, size: usize, out: &mut Vec<f32>) {
    for c in 0..raster.channels {
        for y in top..top + size {
            let start = raster.index(c, y, left);
            out.extend_from_slice(&raster.data[start..start + size]);
        }
    }
}

/// In-memory patch corpus for one run.
///
/// Patches are stored tile by tile, row-major within a tile. After
/// construction (and optional normalization) the corpus is only read.
#[derive(Debug, Clone)]
pub struct PatchCorpus {
    image_shape: [usize; 3],
    mask_shape: [usize; 3],
    layout: Vec<ChannelSpan>,
    tile_ids: Vec<String>,
    origins: Vec<PatchOrigin>,
    images: Vec<f32>,
    masks: Vec<f32>,
}

impl PatchCorpus {
    fn from_tiles(image_ids: &[String], tiles: Vec<TilePatches>) -> Result<Self> {
        let mut tiles = tiles.into_iter().enumerate();
        let (_, first) = tiles
            .next()
            .ok_or_else(|| Error::Data("no tiles to extract".to_string()))?;

        let mut corpus = Self {
            image_shape: first.image_shape,
            mask_shape: first.mask_shape,
            layout: first.layout.clone(),
            tile_ids: image_ids.to_vec(),
            origins: Vec::new(),
            images: Vec::new(),
            masks: Vec::new(),
        };
        corpus.append_tile(0, first);

        for (index, tile) in tiles {
            if tile.image_shape != corpus.image_shape
                || tile.mask_shape != corpus.mask_shape
                || tile.layout != corpus.layout
            {
                return Err(Error::Data(format!(
                    "tile '{}' yields image {:?} / mask {:?}, first tile yields {:?} / {:?}",
                    image_ids[index],
                    tile.image_shape,
                    tile.mask_shape,
                    corpus.image_shape,
                    corpus.mask_shape
                )));
            }
            corpus.append_tile(index, tile);
        }
        Ok(corpus)
    }

    fn append_tile(&mut self, index: usize, tile: TilePatches) {
        for row in 0..tile.rows {
            for col in 0..tile.cols {
                self.origins.push(PatchOrigin {
                    tile: index,
                    row,
                    col,
                });
            }
        }
        self.images.extend(tile.images);
        self.masks.extend(tile.masks);
    }

    /// Number of patches
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// `[channels, size, size]` of every image patch
    pub fn image_shape(&self) -> [usize; 3] {
        self.image_shape
    }

    /// `[classes, size, size]` of every mask patch
    pub fn mask_shape(&self) -> [usize; 3] {
        self.mask_shape
    }

    pub fn channel_layout(&self) -> &[ChannelSpan] {
        &self.layout
    }

    pub fn tile_ids(&self) -> &[String] {
        &self.tile_ids
    }

    pub fn origin(&self, i: usize) -> PatchOrigin {
        self.origins[i]
    }

    fn image_len(&self) -> usize {
        self.image_shape.iter().product()
    }

    fn mask_len(&self) -> usize {
        self.mask_shape.iter().product()
    }

    pub fn image(&self, i: usize) -> &[f32] {
        let n = self.image_len();
        &self.images[i * n..(i + 1) * n]
    }

    pub fn mask(&self, i: usize) -> &[f32] {
        let n = self.mask_len();
        &self.masks[i * n..(i + 1) * n]
    }

    pub(crate) fn images(&self) -> &[f32] {
        &self.images
    }

    pub(crate) fn images_mut(&mut self) -> &mut [f32] {
        &mut self.images
    }

    /// Copies the patches at `indices` into a fresh batch
    pub fn gather(&self, indices: &[usize]) -> PatchBatch {
        let mut images = Vec::with_capacity(indices.len() * self.image_len());
        let mut masks = Vec::with_capacity(indices.len() * self.mask_len());
        for &i in indices {
            images.extend_from_slice(self.image(i));
            masks.extend_from_slice(self.mask(i));
        }
        PatchBatch::from_parts(self.image_shape, self.mask_shape, images, masks)
    }

    /// New corpus holding the patches at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> PatchCorpus {
        let batch = self.gather(indices);
        let (images, masks) = batch.into_parts();
        PatchCorpus {
            image_shape: self.image_shape,
            mask_shape: self.mask_shape,
            layout: self.layout.clone(),
            tile_ids: self.tile_ids.clone(),
            origins: indices.iter().map(|&i| self.origins[i]).collect(),
            images,
            masks,
        }
    }

    /// Holds out `fraction` of the patches, chosen by a shuffle.
    ///
    /// Returns `(train, validation)`; both keep corpus order.
    pub fn split<R: Rng + ?Sized>(
        &self,
        fraction: f64,
        rng: &mut R,
    ) -> Result<(PatchCorpus, PatchCorpus)> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::Config(format!(
                "validation fraction must be in (0, 1), got {fraction}"
            )));
        }
        let held = (self.len() as f64 * fraction).round() as usize;
        if held == 0 || held == self.len() {
            return Err(Error::Config(format!(
                "validation fraction {fraction} of {} patches leaves an empty side",
                self.len()
            )));
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        let (val, train) = order.split_at_mut(held);
        val.sort_unstable();
        train.sort_unstable();
        Ok((self.subset(train), self.subset(val)))
    }
}
