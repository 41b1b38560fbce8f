//! The trainable-model seam and its burn implementation.
//!
//! The trainer only sees [`SegmentationModel`]: it hands over host-side
//! [`PatchBatch`]es and gets [`StepMetrics`] back. Tensors, optimizers and
//! records stay behind the trait.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig},
    record::CompactRecorder,
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor, TensorData,
    },
};
use tile_core::{ArchId, Error, OptimizerConfig, OptimizerKind, Result, StepMetrics};
use tile_dataset::PatchBatch;
use tracing::debug;

use crate::loss::{combined_loss, step_metrics};
use crate::lr_schedule::LearningRateScheduler;
use crate::model::{ModelSpec, SegmentationNet};

/// A trainable segmentation model.
pub trait SegmentationModel {
    /// Shapes the model was built for
    fn spec(&self) -> &ModelSpec;

    /// Replaces the optimizer and restarts its schedule
    fn configure_optimizer(&mut self, config: &OptimizerConfig) -> Result<()>;

    /// One optimization step on `batch`, returning pre-update scores
    fn train_step(&mut self, batch: &PatchBatch, jac_weight: f64) -> Result<StepMetrics>;

    /// Scores `batch` without updating anything
    fn evaluate(&self, batch: &PatchBatch, jac_weight: f64) -> Result<StepMetrics>;

    /// Learning rate the next step will use
    fn learning_rate(&self) -> f64;

    /// Writes the trainable state to `path`
    fn save(&self, path: &Path) -> Result<()>;

    /// Restores trainable state written by [`save`](Self::save)
    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Builds models by architecture id.
pub trait ArchitectureFactory {
    fn build(&self, arch: ArchId, spec: &ModelSpec) -> Result<Box<dyn SegmentationModel>>;
}

/// Object-safe view of a burn optimizer for one module type
trait ModelStepper<B: AutodiffBackend, M: AutodiffModule<B>> {
    fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M;
}

impl<B, M, O> ModelStepper<B, M> for O
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M {
        Optimizer::step(self, lr, module, grads)
    }
}

/// [`SegmentationModel`] backed by a burn [`SegmentationNet`]
pub struct BurnSegmenter<B: AutodiffBackend> {
    net: SegmentationNet<B>,
    spec: ModelSpec,
    optimizer: Option<Box<dyn ModelStepper<B, SegmentationNet<B>>>>,
    scheduler: LearningRateScheduler,
    device: B::Device,
}

impl<B: AutodiffBackend> BurnSegmenter<B> {
    pub fn new(arch: ArchId, spec: ModelSpec, device: B::Device) -> Result<Self> {
        let net = SegmentationNet::new(arch, &spec, &device)?;
        debug!("Built {arch} with {} parameters", net.num_params());
        Ok(Self {
            net,
            spec,
            optimizer: None,
            scheduler: LearningRateScheduler::from_optimizer(&OptimizerConfig::default()),
            device,
        })
    }

    fn check_batch(&self, batch: &PatchBatch) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::Training("empty batch".to_string()));
        }
        if batch.image_shape() != self.spec.input_shape()
            || batch.mask_shape() != self.spec.output_shape()
        {
            return Err(Error::Training(format!(
                "batch image {:?} / mask {:?} does not fit model input {:?} / output {:?}",
                batch.image_shape(),
                batch.mask_shape(),
                self.spec.input_shape(),
                self.spec.output_shape()
            )));
        }
        Ok(())
    }
}

/// Uploads a batch as `(images, masks)` tensors
fn batch_tensors<BB: Backend>(batch: &PatchBatch, device: &BB::Device) -> (Tensor<BB, 4>, Tensor<BB, 4>) {
    let images = Tensor::from_data(TensorData::new(batch.images().to_vec(), batch.image_dims()), device);
    let masks = Tensor::from_data(TensorData::new(batch.masks().to_vec(), batch.mask_dims()), device);
    (images, masks)
}

impl<B: AutodiffBackend> SegmentationModel for BurnSegmenter<B> {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn configure_optimizer(&mut self, config: &OptimizerConfig) -> Result<()> {
        let optimizer: Box<dyn ModelStepper<B, SegmentationNet<B>>> = match config.kind {
            OptimizerKind::Adam => Box::new(AdamConfig::new().init::<B, SegmentationNet<B>>()),
            OptimizerKind::Sgd => Box::new(SgdConfig::new().init::<B, SegmentationNet<B>>()),
        };
        self.optimizer = Some(optimizer);
        self.scheduler = LearningRateScheduler::from_optimizer(config);
        debug!("Optimizer {:?} lr {} decay {}", config.kind, config.lr, config.decay);
        Ok(())
    }

    fn train_step(&mut self, batch: &PatchBatch, jac_weight: f64) -> Result<StepMetrics> {
        self.check_batch(batch)?;
        let lr = self.scheduler.get_lr();
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| Error::Training("train_step before configure_optimizer".to_string()))?;

        let (images, masks) = batch_tensors::<B>(batch, &self.device);
        let output = self.net.forward(images);
        let loss = combined_loss(output.clone(), masks.clone(), jac_weight);
        let loss_value: f64 = loss.clone().into_scalar().elem();
        let metrics = step_metrics(loss_value, output.inner(), masks.inner());

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.net);
        self.net = optimizer.step(lr, self.net.clone(), grads);
        self.scheduler.step();

        Ok(metrics)
    }

    fn evaluate(&self, batch: &PatchBatch, jac_weight: f64) -> Result<StepMetrics> {
        self.check_batch(batch)?;
        let net = self.net.valid();
        let (images, masks) = batch_tensors::<B::InnerBackend>(batch, &self.device);
        let output = net.forward(images);
        let loss_value: f64 = combined_loss(output.clone(), masks.clone(), jac_weight)
            .into_scalar()
            .elem();
        Ok(step_metrics(loss_value, output, masks))
    }

    fn learning_rate(&self) -> f64 {
        self.scheduler.get_lr()
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.net
            .clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| Error::Checkpoint(format!("failed to save model to {}: {e:?}", path.display())))
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.net = self
            .net
            .clone()
            .load_file(path, &CompactRecorder::new(), &self.device)
            .map_err(|e| Error::Checkpoint(format!("failed to load model from {}: {e:?}", path.display())))?;
        Ok(())
    }
}

/// Factory for [`BurnSegmenter`]s on one device
#[derive(Debug, Clone, Default)]
pub struct BurnFactory<B: AutodiffBackend> {
    device: B::Device,
}

impl<B: AutodiffBackend> BurnFactory<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: AutodiffBackend> ArchitectureFactory for BurnFactory<B> {
    fn build(&self, arch: ArchId, spec: &ModelSpec) -> Result<Box<dyn SegmentationModel>> {
        Ok(Box::new(BurnSegmenter::<B>::new(arch, *spec, self.device.clone())?))
    }
}
