//! Channel and resolution inference for FC-DenseNet.
//!
//! Every dense layer adds `growth_rate` feature maps to the running
//! concatenation, so a block of `n` layers fed `m` maps produces
//! `m + n * growth_rate`. On the way up only the maps a block *added* are
//! upsampled; they are then concatenated with the matching skip connection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::TiramisuConfig;
use super::shape::{
    conv_output_size, conv_transpose_output_size, pool_output_size, same_padding, FeatureShape,
};
use crate::utils::error::{Result, TiramisuError};

/// Kernel of the first convolution
pub const STEM_KERNEL: usize = 3;
/// Kernel of every dense layer convolution
pub const DENSE_KERNEL: usize = 3;
/// Kernel of the transition down convolution
pub const TRANSITION_DOWN_KERNEL: usize = 1;
/// Max pool window and stride
pub const POOL_SIZE: usize = 2;
/// Kernel of the transposed convolution in a transition up
pub const TRANSITION_UP_KERNEL: usize = 3;
/// Stride of the transposed convolution in a transition up
pub const TRANSITION_UP_STRIDE: usize = 2;
/// Padding of the transposed convolution in a transition up
pub const TRANSITION_UP_PADDING: usize = 1;
/// Output padding that makes the transposed convolution exactly double the size
pub const TRANSITION_UP_PADDING_OUT: usize = 1;
/// Kernel of the final classifier convolution
pub const CLASSIFIER_KERNEL: usize = 1;

/// A dense block and the feature maps flowing into it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseStage {
    pub input: FeatureShape,
    pub num_layers: usize,
    pub growth_rate: usize,
}

impl DenseStage {
    pub fn new(input: FeatureShape, num_layers: usize, growth_rate: usize) -> Self {
        Self {
            input,
            num_layers,
            growth_rate,
        }
    }

    /// Channels seen by dense layer `layer` (0-based)
    pub fn layer_input_channels(&self, layer: usize) -> usize {
        self.input.channels + layer * self.growth_rate
    }

    /// Channels added by the block
    pub fn new_channels(&self) -> usize {
        self.num_layers * self.growth_rate
    }

    /// Only the maps added by the block
    pub fn new_features(&self) -> FeatureShape {
        self.input.with_channels(self.new_channels())
    }

    /// Block input concatenated with everything the block added
    pub fn stacked(&self) -> FeatureShape {
        self.input.with_channels(self.input.channels + self.new_channels())
    }
}

/// One level of the down path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownStage {
    pub block: DenseStage,
    /// Output of the transition down following the block
    pub pooled: FeatureShape,
}

impl DownStage {
    /// Feature maps handed to the up path through the skip connection
    pub fn skip(&self) -> FeatureShape {
        self.block.stacked()
    }
}

/// One level of the up path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpStage {
    /// Maps fed to the transition up (new maps of the previous block)
    pub transition_input: FeatureShape,
    /// Output of the transition up
    pub upsampled: FeatureShape,
    /// Skip connection concatenated after upsampling
    pub skip: FeatureShape,
    pub block: DenseStage,
}

/// Fully inferred channel and resolution layout of a Tiramisu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub input: FeatureShape,
    pub stem: FeatureShape,
    pub down: Vec<DownStage>,
    pub bottleneck: DenseStage,
    pub up: Vec<UpStage>,
    pub classifier_input: FeatureShape,
    pub output: FeatureShape,
}

impl ChannelLayout {
    /// Infer every stage's channels and resolution from a configuration
    pub fn infer(config: &TiramisuConfig) -> Result<Self> {
        config.validate_structure()?;

        let growth = config.growth_rate;
        let input = FeatureShape::new(
            config.input_channels,
            config.input_height,
            config.input_width,
        );

        let stem = FeatureShape::new(
            config.first_conv_filters,
            same_conv(input.height, STEM_KERNEL, "stem height")?,
            same_conv(input.width, STEM_KERNEL, "stem width")?,
        );

        let mut current = stem;
        let mut down = Vec::with_capacity(config.down_layers.len());
        for (idx, &num_layers) in config.down_layers.iter().enumerate() {
            let block = DenseStage::new(current, num_layers, growth);
            let skip = block.stacked();
            let pooled = FeatureShape::new(
                skip.channels,
                pool(skip.height, idx, "height")?,
                pool(skip.width, idx, "width")?,
            );
            debug!(
                "down block {}: {} -> {} (pooled {})",
                idx + 1,
                block.input,
                skip,
                pooled
            );
            down.push(DownStage { block, pooled });
            current = pooled;
        }

        let bottleneck = DenseStage::new(current, config.bottleneck_layers, growth);
        debug!("bottleneck: {} -> {}", bottleneck.input, bottleneck.stacked());

        let mut previous_new = bottleneck.new_features();
        let mut up = Vec::with_capacity(config.up_layers.len());
        for (idx, (&num_layers, level)) in config
            .up_layers
            .iter()
            .zip(down.iter().rev())
            .enumerate()
        {
            let skip = level.skip();
            let upsampled = FeatureShape::new(
                previous_new.channels,
                upsample(previous_new.height)?,
                upsample(previous_new.width)?,
            );

            if upsampled.resolution() != skip.resolution() {
                return Err(TiramisuError::SkipShapeMismatch {
                    block: idx + 1,
                    upsampled_height: upsampled.height,
                    upsampled_width: upsampled.width,
                    skip_height: skip.height,
                    skip_width: skip.width,
                });
            }

            let block = DenseStage::new(
                upsampled.with_channels(upsampled.channels + skip.channels),
                num_layers,
                growth,
            );
            debug!(
                "up block {}: upsample {} + skip {} -> {}",
                idx + 1,
                upsampled.channels,
                skip.channels,
                block.stacked()
            );

            up.push(UpStage {
                transition_input: previous_new,
                upsampled,
                skip,
                block,
            });
            previous_new = block.new_features();
        }

        let classifier_input = up
            .last()
            .map(|stage| stage.block.stacked())
            .ok_or_else(|| TiramisuError::Config("up path is empty".to_string()))?;
        let output = classifier_input.with_channels(config.num_classes);

        Ok(Self {
            input,
            stem,
            down,
            bottleneck,
            up,
            classifier_input,
            output,
        })
    }

    /// Channel count of every skip connection, shallowest first
    pub fn skip_channels(&self) -> Vec<usize> {
        self.down.iter().map(|level| level.skip().channels).collect()
    }

    /// Stacked output width of every up block, deepest first
    pub fn up_block_channels(&self) -> Vec<usize> {
        self.up.iter().map(|stage| stage.block.stacked().channels).collect()
    }
}

fn same_conv(size: usize, kernel: usize, what: &str) -> Result<usize> {
    conv_output_size(size, kernel, 1, same_padding(kernel))
        .filter(|&out| out > 0)
        .ok_or_else(|| TiramisuError::Config(format!("{} of {} is too small", what, size)))
}

fn pool(size: usize, level: usize, dimension: &str) -> Result<usize> {
    pool_output_size(size, POOL_SIZE, POOL_SIZE).ok_or_else(|| {
        TiramisuError::Config(format!(
            "{} collapses to zero at transition down {}",
            dimension,
            level + 1
        ))
    })
}

fn upsample(size: usize) -> Result<usize> {
    conv_transpose_output_size(
        size,
        TRANSITION_UP_KERNEL,
        TRANSITION_UP_STRIDE,
        TRANSITION_UP_PADDING,
        TRANSITION_UP_PADDING_OUT,
    )
    .ok_or_else(|| TiramisuError::Config(format!("cannot upsample a size of {}", size)))
}
