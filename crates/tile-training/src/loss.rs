//! Segmentation loss and metrics.
//!
//! All functions take `[batch, classes, height, width]` probability maps
//! and one-hot (or soft) targets of the same shape. Per-class sums run over
//! the batch and both spatial axes; class scores are then averaged.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};
use tile_core::StepMetrics;

/// Smoothing term of both Jaccard variants
pub const JACCARD_SMOOTH: f64 = 1e-12;

/// Predictions are clipped to `[BCE_EPSILON, 1 - BCE_EPSILON]` before the log
pub const BCE_EPSILON: f64 = 1e-7;

/// Sum over batch and spatial axes, one value per class
fn per_class_sum<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 1> {
    let [n, c, h, w] = x.dims();
    x.swap_dims(0, 1).reshape([c, n * h * w]).sum_dim(1).reshape([c])
}

fn jaccard_from_sums<B: Backend>(intersection: Tensor<B, 1>, sum: Tensor<B, 1>) -> Tensor<B, 1> {
    let numerator = intersection.clone().add_scalar(JACCARD_SMOOTH);
    let denominator = sum.sub(intersection).add_scalar(JACCARD_SMOOTH);
    numerator.div(denominator).mean()
}

/// Soft Jaccard, mean over classes
pub fn jaccard_coef<B: Backend>(y_pred: Tensor<B, 4>, y_true: Tensor<B, 4>) -> Tensor<B, 1> {
    let intersection = per_class_sum(y_true.clone().mul(y_pred.clone()));
    let sum = per_class_sum(y_true.add(y_pred));
    jaccard_from_sums(intersection, sum)
}

/// Jaccard with thresholded predictions in the intersection only.
///
/// Predictions are clipped to `[0, 1]` and rounded half to even, so exactly
/// `0.5` counts as background. The union term keeps the raw predictions.
pub fn jaccard_coef_int<B: Backend>(y_pred: Tensor<B, 4>, y_true: Tensor<B, 4>) -> Tensor<B, 1> {
    let rounded = y_pred.clone().clamp(0.0, 1.0).greater_elem(0.5).float();
    let intersection = per_class_sum(y_true.clone().mul(rounded));
    let sum = per_class_sum(y_true.add(y_pred));
    jaccard_from_sums(intersection, sum)
}

/// Mean elementwise binary cross-entropy
pub fn binary_cross_entropy<B: Backend>(y_pred: Tensor<B, 4>, y_true: Tensor<B, 4>) -> Tensor<B, 1> {
    let p = y_pred.clamp(BCE_EPSILON, 1.0 - BCE_EPSILON);
    let positive = y_true.clone().mul(p.clone().log());
    let negative = y_true.neg().add_scalar(1.0).mul(p.neg().add_scalar(1.0).log());
    positive.add(negative).neg().mean()
}

/// `BCE + jac_weight * (1 - J)`
pub fn combined_loss<B: Backend>(
    y_pred: Tensor<B, 4>,
    y_true: Tensor<B, 4>,
    jac_weight: f64,
) -> Tensor<B, 1> {
    let bce = binary_cross_entropy(y_pred.clone(), y_true.clone());
    let jaccard = jaccard_coef(y_pred, y_true);
    bce.add(jaccard.neg().add_scalar(1.0).mul_scalar(jac_weight))
}

/// Fraction of pixels whose thresholded prediction matches the target
pub fn binary_accuracy<B: Backend>(y_pred: Tensor<B, 4>, y_true: Tensor<B, 4>) -> Tensor<B, 1> {
    y_pred
        .greater_elem(0.5)
        .equal(y_true.greater_elem(0.5))
        .float()
        .mean()
}

/// Loss value plus the three metrics, read back to the host
pub fn step_metrics<B: Backend>(loss: f64, y_pred: Tensor<B, 4>, y_true: Tensor<B, 4>) -> StepMetrics {
    StepMetrics {
        loss,
        jaccard: scalar(jaccard_coef(y_pred.clone(), y_true.clone())),
        jaccard_int: scalar(jaccard_coef_int(y_pred.clone(), y_true.clone())),
        accuracy: scalar(binary_accuracy(y_pred, y_true)),
    }
}

pub(crate) fn scalar<B: Backend>(x: Tensor<B, 1>) -> f64 {
    x.into_scalar().elem::<f64>()
}
