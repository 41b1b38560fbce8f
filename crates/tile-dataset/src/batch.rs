//! Host-side batches of patch copies.

use tile_core::{Error, Result};

/// A batch of `(image, mask)` patch copies in NCHW order.
///
/// Batches are built by [`PatchCorpus::gather`](crate::PatchCorpus::gather),
/// mutated in place by augmentation and handed to the model. They never
/// alias the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchBatch {
    len: usize,
    image_shape: [usize; 3],
    mask_shape: [usize; 3],
    images: Vec<f32>,
    masks: Vec<f32>,
}

impl PatchBatch {
    /// Wraps flat NCHW buffers, checking they hold whole patches
    pub fn new(
        image_shape: [usize; 3],
        mask_shape: [usize; 3],
        images: Vec<f32>,
        masks: Vec<f32>,
    ) -> Result<Self> {
        let image_len: usize = image_shape.iter().product();
        let mask_len: usize = mask_shape.iter().product();
        if image_len == 0 || mask_len == 0 {
            return Err(Error::Data(format!(
                "degenerate patch shapes {image_shape:?} / {mask_shape:?}"
            )));
        }
        let len = images.len() / image_len;
        if images.len() != len * image_len || masks.len() != len * mask_len {
            return Err(Error::Data(format!(
                "{} image and {} mask values do not form whole {image_shape:?} / {mask_shape:?} patches",
                images.len(),
                masks.len()
            )));
        }
        Ok(Self::from_parts(image_shape, mask_shape, images, masks))
    }

    pub(crate) fn from_parts(
        image_shape: [usize; 3],
        mask_shape: [usize; 3],
        images: Vec<f32>,
        masks: Vec<f32>,
    ) -> Self {
        let image_len: usize = image_shape.iter().product();
        let len = if image_len == 0 { 0 } else { images.len() / image_len };
        debug_assert_eq!(images.len(), len * image_len);
        debug_assert_eq!(masks.len(), len * mask_shape.iter().product::<usize>());
        Self {
            len,
            image_shape,
            mask_shape,
            images,
            masks,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `[channels, size, size]` of one image patch
    pub fn image_shape(&self) -> [usize; 3] {
        self.image_shape
    }

    /// `[classes, size, size]` of one mask patch
    pub fn mask_shape(&self) -> [usize; 3] {
        self.mask_shape
    }

    /// Full image tensor dimensions `[n, c, s, s]`
    pub fn image_dims(&self) -> [usize; 4] {
        let [c, h, w] = self.image_shape;
        [self.len, c, h, w]
    }

    /// Full mask tensor dimensions `[n, k, m, m]`
    pub fn mask_dims(&self) -> [usize; 4] {
        let [k, h, w] = self.mask_shape;
        [self.len, k, h, w]
    }

    fn image_len(&self) -> usize {
        self.image_shape.iter().product()
    }

    fn mask_len(&self) -> usize {
        self.mask_shape.iter().product()
    }

    pub fn images(&self) -> &[f32] {
        &self.images
    }

    pub fn masks(&self) -> &[f32] {
        &self.masks
    }

    pub fn image(&self, i: usize) -> &[f32] {
        let n = self.image_len();
        &self.images[i * n..(i + 1) * n]
    }

    pub fn mask(&self, i: usize) -> &[f32] {
        let n = self.mask_len();
        &self.masks[i * n..(i + 1) * n]
    }

    /// Mutable image and mask of patch `i`, borrowed together
    pub fn patch_mut(&mut self, i: usize) -> (&mut [f32], &mut [f32]) {
        let (ni, nm) = (self.image_len(), self.mask_len());
        (
            &mut self.images[i * ni..(i + 1) * ni],
            &mut self.masks[i * nm..(i + 1) * nm],
        )
    }

    /// Consumes the batch into its flat image and mask buffers
    pub fn into_parts(self) -> (Vec<f32>, Vec<f32>) {
        (self.images, self.masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_views() {
        let images: Vec<f32> = (0..2 * 2 * 2 * 2).map(|v| v as f32).collect();
        let masks: Vec<f32> = (0..2).map(|v| v as f32).collect();
        let mut batch = PatchBatch::from_parts([2, 2, 2], [1, 1, 1], images, masks);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.image_dims(), [2, 2, 2, 2]);
        assert_eq!(batch.mask_dims(), [2, 1, 1, 1]);
        assert_eq!(batch.image(1)[0], 8.0);
        assert_eq!(batch.mask(1), &[1.0]);

        let (image, mask) = batch.patch_mut(0);
        image[0] = -1.0;
        mask[0] = 5.0;
        assert_eq!(batch.images()[0], -1.0);
        assert_eq!(batch.masks()[0], 5.0);
    }

    #[test]
    fn test_new_checks_lengths() {
        assert!(PatchBatch::new([1, 2, 2], [1, 1, 1], vec![0.0; 8], vec![0.0; 2]).is_ok());
        assert!(matches!(
            PatchBatch::new([1, 2, 2], [1, 1, 1], vec![0.0; 8], vec![0.0; 3]),
            Err(Error::Data(_))
        ));
        assert!(matches!(
            PatchBatch::new([1, 2, 2], [1, 1, 1], vec![0.0; 6], vec![0.0; 2]),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn test_empty_batch() {
        let batch = PatchBatch::from_parts([3, 4, 4], [2, 2, 2], Vec::new(), Vec::new());
        assert!(batch.is_empty());
        assert_eq!(batch.image_dims(), [0, 3, 4, 4]);
    }
}
