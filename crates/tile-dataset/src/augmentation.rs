//! Label-preserving augmentation of patch batches.
//!
//! Geometric transforms (row mirror, column mirror, transpose) are drawn
//! per patch and applied identically to image and mask, each at its own
//! resolution. Channel jitter touches images only.

use rand::Rng;
use tile_core::AugmentPolicy;

use crate::batch::PatchBatch;

/// The geometric transforms applied to one patch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchTransform {
    pub flip_rows: bool,
    pub flip_cols: bool,
    pub transpose: bool,
}

impl PatchTransform {
    pub fn is_identity(&self) -> bool {
        !(self.flip_rows || self.flip_cols || self.transpose)
    }
}

/// Applies an [`AugmentPolicy`] to batches in place.
#[derive(Debug, Clone)]
pub struct Augmenter {
    policy: AugmentPolicy,
}

impl Augmenter {
    pub fn new(policy: AugmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AugmentPolicy {
        &self.policy
    }

    /// Augments every patch of `batch` and reports what was applied.
    ///
    /// Draw order per patch: row mirror, column mirror, transpose, then a
    /// scale and a shift per image channel. Disabled transforms consume no
    /// draws.
    pub fn augment_batch<R: Rng + ?Sized>(
        &self,
        batch: &mut PatchBatch,
        rng: &mut R,
    ) -> Vec<PatchTransform> {
        let [channels, size, _] = batch.image_shape();
        let [classes, mask_size, _] = batch.mask_shape();
        let p = self.policy.flip_probability;

        let mut applied = Vec::with_capacity(batch.len());
        for i in 0..batch.len() {
            let mut t = PatchTransform::default();
            if self.policy.mirror {
                t.flip_rows = rng.gen_bool(p);
                t.flip_cols = rng.gen_bool(p);
            }
            if self.policy.transpose {
                t.transpose = rng.gen_bool(p);
            }

            let (image, mask) = batch.patch_mut(i);
            apply_transform(image, channels, size, t);
            apply_transform(mask, classes, mask_size, t);

            if self.policy.channel_scale_range.is_some() || self.policy.channel_shift_range.is_some() {
                for plane in image.chunks_exact_mut(size * size) {
                    let scale = match self.policy.channel_scale_range {
                        Some(r) if r > 0.0 => rng.gen_range(1.0 - r..=1.0 + r),
                        _ => 1.0,
                    };
                    let shift = match self.policy.channel_shift_range {
                        Some(r) if r > 0.0 => rng.gen_range(-r..=r),
                        _ => 0.0,
                    };
                    for v in plane.iter_mut() {
                        *v = *v * scale + shift;
                    }
                }
            }
            applied.push(t);
        }
        applied
    }
}

/// Applies `t` to a `channels x size x size` buffer
pub fn apply_transform(data: &mut [f32], channels: usize, size: usize, t: PatchTransform) {
    if t.flip_rows {
        flip_rows(data, channels, size);
    }
    if t.flip_cols {
        flip_cols(data, channels, size);
    }
    if t.transpose {
        transpose(data, channels, size);
    }
}

/// Reverses the first spatial axis
pub fn flip_rows(data: &mut [f32], channels: usize, size: usize) {
    for plane in data.chunks_exact_mut(size * size).take(channels) {
        for y in 0..size / 2 {
            let (top, bottom) = plane.split_at_mut((size - 1 - y) * size);
            top[y * size..(y + 1) * size].swap_with_slice(&mut bottom[..size]);
        }
    }
}

/// Reverses the second spatial axis
pub fn flip_cols(data: &mut [f32], channels: usize, size: usize) {
    for row in data.chunks_exact_mut(size).take(channels * size) {
        row.reverse();
    }
}

/// Swaps the two spatial axes of square planes
pub fn transpose(data: &mut [f32], channels: usize, size: usize) {
    for plane in data.chunks_exact_mut(size * size).take(channels) {
        for y in 0..size {
            for x in y + 1..size {
                plane.swap(y * size + x, x * size + y);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn plane(size: usize) -> Vec<f32> {
        (0..size * size).map(|v| v as f32).collect()
    }

    #[test]
    fn test_flip_rows() {
        let mut data = plane(3);
        flip_rows(&mut data, 1, 3);
        assert_eq!(data, vec![6.0, 7.0, 8.0, 3.0, 4.0, 5.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_flip_cols() {
        let mut data = plane(2);
        flip_cols(&mut data, 1, 2);
        assert_eq!(data, vec![1.0, 0.0, 3.0, 2.0]);
    }

    #[test]
    fn test_transpose_each_channel() {
        let mut data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        transpose(&mut data, 2, 2);
        assert_eq!(data, vec![0.0, 2.0, 1.0, 3.0, 4.0, 6.0, 5.0, 7.0]);
    }

    #[test]
    fn test_transforms_are_involutions() {
        let original = plane(5);
        for t in [
            PatchTransform { flip_rows: true, ..Default::default() },
            PatchTransform { flip_cols: true, ..Default::default() },
            PatchTransform { transpose: true, ..Default::default() },
        ] {
            let mut data = original.clone();
            apply_transform(&mut data, 1, 5, t);
            assert_ne!(data, original);
            apply_transform(&mut data, 1, 5, t);
            assert_eq!(data, original);
        }
    }

    /// Image at 4x the mask resolution, image values are the mask values
    /// upsampled, so alignment survives iff both get the same transform.
    fn aligned_batch(n: usize) -> PatchBatch {
        let (s, m) = (8, 2);
        let mut images = Vec::new();
        let mut masks = Vec::new();
        for i in 0..n {
            for y in 0..s {
                for x in 0..s {
                    images.push((i * 100 + (y / 4) * m + x / 4) as f32);
                }
            }
            for y in 0..m {
                for x in 0..m {
                    masks.push((i * 100 + y * m + x) as f32);
                }
            }
        }
        PatchBatch::from_parts([1, s, s], [1, m, m], images, masks)
    }

    #[test]
    fn test_augment_keeps_alignment() {
        let mut batch = aligned_batch(16);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let applied = Augmenter::new(AugmentPolicy::default()).augment_batch(&mut batch, &mut rng);

        assert_eq!(applied.len(), 16);
        assert!(applied.iter().any(|t| !t.is_identity()));
        assert_eq!(batch.image_dims(), [16, 1, 8, 8]);
        assert_eq!(batch.mask_dims(), [16, 1, 2, 2]);
        for i in 0..batch.len() {
            let (image, mask) = (batch.image(i), batch.mask(i));
            for y in 0..8 {
                for x in 0..8 {
                    assert_eq!(image[y * 8 + x], mask[(y / 4) * 2 + x / 4]);
                }
            }
        }
    }

    #[test]
    fn test_disabled_policy_is_identity() {
        let mut batch = aligned_batch(4);
        let before = batch.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let applied = Augmenter::new(AugmentPolicy::none()).augment_batch(&mut batch, &mut rng);
        assert!(applied.iter().all(PatchTransform::is_identity));
        assert_eq!(batch, before);
    }

    #[test]
    fn test_mirror_only() {
        let mut batch = aligned_batch(32);
        let policy = AugmentPolicy {
            transpose: false,
            ..AugmentPolicy::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let applied = Augmenter::new(policy).augment_batch(&mut batch, &mut rng);
        assert!(applied.iter().all(|t| !t.transpose));
        assert!(applied.iter().any(|t| t.flip_rows));
    }

    #[test]
    fn test_jitter_only_touches_images() {
        let mut batch = aligned_batch(4);
        let masks_before = batch.masks().to_vec();
        let policy = AugmentPolicy {
            mirror: false,
            transpose: false,
            channel_shift_range: Some(0.5),
            channel_scale_range: Some(0.1),
            ..AugmentPolicy::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        Augmenter::new(policy).augment_batch(&mut batch, &mut rng);

        assert_eq!(batch.masks(), &masks_before[..]);
        // patch 0, pixel 0 was 0.0: only the shift remains
        let shifted = batch.image(0)[0];
        assert!(shifted.abs() <= 0.5);
        // pixel value 100 of patch 1 stays within the scale/shift envelope
        let v = batch.image(1)[0];
        assert!(v >= 100.0 * 0.9 - 0.5 && v <= 100.0 * 1.1 + 0.5);
    }

    #[test]
    fn test_jitter_draws_per_channel() {
        let (s, m) = (4, 2);
        let plane: Vec<f32> = (0..s * s).map(|v| v as f32).collect();
        let images = [plane.clone(), plane].concat();
        let mut batch = PatchBatch::from_parts([2, s, s], [1, m, m], images, vec![0.0; m * m]);
        let policy = AugmentPolicy {
            mirror: false,
            transpose: false,
            channel_shift_range: Some(0.5),
            channel_scale_range: Some(0.1),
            ..AugmentPolicy::default()
        };
        Augmenter::new(policy).augment_batch(&mut batch, &mut ChaCha8Rng::seed_from_u64(3));

        let (first, second) = batch.image(0).split_at(s * s);
        assert_ne!(first, second);
        // each channel stays affine in its input: v' = v * scale + shift
        for channel in [first, second] {
            let shift = channel[0];
            let scale = channel[1] - shift;
            assert!((0.9..=1.1).contains(&scale));
            for (v, out) in channel.iter().enumerate() {
                assert!((v as f32 * scale + shift - out).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let augmenter = Augmenter::new(AugmentPolicy::default());
        let mut a = aligned_batch(8);
        let mut b = aligned_batch(8);
        augmenter.augment_batch(&mut a, &mut ChaCha8Rng::seed_from_u64(5));
        augmenter.augment_batch(&mut b, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(a, b);
    }
}
