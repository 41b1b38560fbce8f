//! Segmentation network architectures.
//!
//! Implements:
//! - FCN (flat stack of same-padded convolutions)
//! - U-Net (two pooling levels with skip connections)
//! - Unified SegmentationNet interface
//!
//! Both end in a per-class sigmoid. When the mask patch is smaller than the
//! image patch the logits are average-pooled down to the mask size first.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};
use tile_core::{ArchId, Error, Result};

/// Shapes a network is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub in_channels: usize,
    pub image_patch_size: usize,
    pub n_classes: usize,
    pub mask_patch_size: usize,
}

impl ModelSpec {
    /// `[channels, size, size]` the network accepts
    pub fn input_shape(&self) -> [usize; 3] {
        [self.in_channels, self.image_patch_size, self.image_patch_size]
    }

    /// `[classes, size, size]` the network produces
    pub fn output_shape(&self) -> [usize; 3] {
        [self.n_classes, self.mask_patch_size, self.mask_patch_size]
    }
}

/// Base number of filters of the first block
const BASE_FILTERS: usize = 32;

/// Conv 3x3 (same padding), BatchNorm, ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// Two stacked [`ConvBlock`]s
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    pub first: ConvBlock<B>,
    pub second: ConvBlock<B>,
}

impl<B: Backend> DoubleConv<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            first: ConvBlock::new(in_channels, out_channels, device),
            second: ConvBlock::new(out_channels, out_channels, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.second.forward(self.first.forward(x))
    }
}

/// 1x1 class head, optional pooling to mask size, sigmoid
#[derive(Module, Debug)]
pub struct MaskHead<B: Backend> {
    pub classifier: Conv2d<B>,
    pub resize: Option<AdaptiveAvgPool2d>,
}

impl<B: Backend> MaskHead<B> {
    pub fn new(in_channels: usize, spec: &ModelSpec, device: &B::Device) -> Self {
        let classifier = Conv2dConfig::new([in_channels, spec.n_classes], [1, 1]).init(device);
        let resize = (spec.mask_patch_size != spec.image_patch_size).then(|| {
            AdaptiveAvgPool2dConfig::new([spec.mask_patch_size, spec.mask_patch_size]).init()
        });
        Self { classifier, resize }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let logits = self.classifier.forward(x);
        let logits = match &self.resize {
            Some(pool) => pool.forward(logits),
            None => logits,
        };
        sigmoid(logits)
    }
}

/// Fully convolutional network without downsampling
#[derive(Module, Debug)]
pub struct FcnNet<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub head: MaskHead<B>,
}

impl<B: Backend> FcnNet<B> {
    pub fn new(spec: &ModelSpec, device: &B::Device) -> Self {
        let blocks = vec![
            ConvBlock::new(spec.in_channels, BASE_FILTERS, device),
            ConvBlock::new(BASE_FILTERS, BASE_FILTERS * 2, device),
            ConvBlock::new(BASE_FILTERS * 2, BASE_FILTERS * 2, device),
        ];
        let head = MaskHead::new(BASE_FILTERS * 2, spec, device);
        Self { blocks, head }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .blocks
            .iter()
            .fold(input, |x, block| block.forward(x));
        self.head.forward(x)
    }
}

/// Two-level U-Net
///
/// Architecture:
/// - Encoder: DoubleConv(32) -> pool -> DoubleConv(64) -> pool
/// - Bottleneck: DoubleConv(128)
/// - Decoder: up 2x, concat skip, DoubleConv(64) -> up 2x, concat, DoubleConv(32)
/// - Head: 1x1 conv, sigmoid
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    pub enc1: DoubleConv<B>,
    pub enc2: DoubleConv<B>,
    pub pool: MaxPool2d,
    pub bottleneck: DoubleConv<B>,
    pub up2: ConvTranspose2d<B>,
    pub dec2: DoubleConv<B>,
    pub up1: ConvTranspose2d<B>,
    pub dec1: DoubleConv<B>,
    pub head: MaskHead<B>,
}

impl<B: Backend> UNet<B> {
    /// Image patch size must be divisible by this
    pub const SIZE_MULTIPLE: usize = 4;

    pub fn new(spec: &ModelSpec, device: &B::Device) -> Self {
        let base = BASE_FILTERS;
        Self {
            enc1: DoubleConv::new(spec.in_channels, base, device),
            enc2: DoubleConv::new(base, base * 2, device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            bottleneck: DoubleConv::new(base * 2, base * 4, device),
            up2: ConvTranspose2dConfig::new([base * 4, base * 2], [2, 2])
                .with_stride([2, 2])
                .init(device),
            dec2: DoubleConv::new(base * 4, base * 2, device),
            up1: ConvTranspose2dConfig::new([base * 2, base], [2, 2])
                .with_stride([2, 2])
                .init(device),
            dec1: DoubleConv::new(base * 2, base, device),
            head: MaskHead::new(base, spec, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let skip1 = self.enc1.forward(input);
        let skip2 = self.enc2.forward(self.pool.forward(skip1.clone()));
        let x = self.bottleneck.forward(self.pool.forward(skip2.clone()));

        let x = self.up2.forward(x);
        let x = self.dec2.forward(Tensor::cat(vec![x, skip2], 1));
        let x = self.up1.forward(x);
        let x = self.dec1.forward(Tensor::cat(vec![x, skip1], 1));
        self.head.forward(x)
    }
}

/// Unified segmentation network
#[derive(Module, Debug)]
pub enum SegmentationNet<B: Backend> {
    Fcn(FcnNet<B>),
    Unet(UNet<B>),
}

impl<B: Backend> SegmentationNet<B> {
    /// Builds the network registered under `arch`
    pub fn new(arch: ArchId, spec: &ModelSpec, device: &B::Device) -> Result<Self> {
        if spec.in_channels == 0 || spec.n_classes == 0 {
            return Err(Error::Training(format!(
                "{arch}: needs at least one input channel and one class, got {spec:?}"
            )));
        }
        if spec.mask_patch_size > spec.image_patch_size {
            return Err(Error::Training(format!(
                "{arch}: mask patch {} is larger than image patch {}",
                spec.mask_patch_size, spec.image_patch_size
            )));
        }

        match arch {
            ArchId::Fcn => Ok(Self::Fcn(FcnNet::new(spec, device))),
            ArchId::Unet => {
                if spec.image_patch_size % UNet::<B>::SIZE_MULTIPLE != 0 {
                    return Err(Error::Training(format!(
                        "unet: image patch size {} is not divisible by {}",
                        spec.image_patch_size,
                        UNet::<B>::SIZE_MULTIPLE
                    )));
                }
                Ok(Self::Unet(UNet::new(spec, device)))
            }
        }
    }

    /// Per-class probability maps at mask patch size
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            SegmentationNet::Fcn(net) => net.forward(input),
            SegmentationNet::Unet(net) => net.forward(input),
        }
    }
}
