//! Tiramisu (FC-DenseNet) Segmentation Network
//!
//! Down path of dense blocks and transitions down, a bottleneck dense block,
//! then an up path where each transition up upsamples only the maps the
//! previous block produced and concatenates them with the matching skip
//! connection. A 1x1 convolution maps the last block to per-pixel class scores.

use std::path::Path;

use burn::{
    module::Module,
    nn::conv::Conv2d,
    record::CompactRecorder,
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
};
use tracing::info;

use super::blocks::{
    same_conv, DenseBlock, DenseBlockConfig, TransitionDown, TransitionDownConfig, TransitionUp,
    TransitionUpConfig,
};
use crate::architecture::config::TiramisuConfig;
use crate::architecture::layout::{ChannelLayout, CLASSIFIER_KERNEL, STEM_KERNEL};
use crate::utils::error::{Result, TiramisuError};

/// FC-DenseNet for semantic segmentation
#[derive(Module, Debug)]
pub struct Tiramisu<B: Backend> {
    pub stem: Conv2d<B>,
    pub down_blocks: Vec<DenseBlock<B>>,
    pub transitions_down: Vec<TransitionDown<B>>,
    pub bottleneck: DenseBlock<B>,
    pub transitions_up: Vec<TransitionUp<B>>,
    pub up_blocks: Vec<DenseBlock<B>>,
    pub classifier: Conv2d<B>,

    num_classes: usize,
}

impl<B: Backend> Tiramisu<B> {
    /// Build the network from the inferred channel layout
    pub fn new(config: &TiramisuConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let layout = ChannelLayout::infer(config)?;
        let dropout = config.dropout_rate;
        let growth = config.growth_rate;

        let stem = same_conv(
            layout.input.channels,
            layout.stem.channels,
            STEM_KERNEL,
            device,
        );

        let mut down_blocks = Vec::with_capacity(layout.down.len());
        let mut transitions_down = Vec::with_capacity(layout.down.len());
        for level in &layout.down {
            down_blocks.push(
                DenseBlockConfig::new(level.block.input.channels, level.block.num_layers, growth)
                    .with_dropout_rate(dropout)
                    .init(device),
            );
            transitions_down.push(
                TransitionDownConfig::new(level.skip().channels)
                    .with_dropout_rate(dropout)
                    .init(device),
            );
        }

        let bottleneck = DenseBlockConfig::new(
            layout.bottleneck.input.channels,
            layout.bottleneck.num_layers,
            growth,
        )
        .with_dropout_rate(dropout)
        .init(device);

        let mut transitions_up = Vec::with_capacity(layout.up.len());
        let mut up_blocks = Vec::with_capacity(layout.up.len());
        for level in &layout.up {
            transitions_up.push(
                TransitionUpConfig::new(level.transition_input.channels, level.upsampled.channels)
                    .init(device),
            );
            up_blocks.push(
                DenseBlockConfig::new(level.block.input.channels, level.block.num_layers, growth)
                    .with_dropout_rate(dropout)
                    .init(device),
            );
        }

        let classifier = same_conv(
            layout.classifier_input.channels,
            layout.output.channels,
            CLASSIFIER_KERNEL,
            device,
        );

        info!(
            "Built Tiramisu: depth {}, {} pools, {} classes",
            config.depth(),
            config.num_pools(),
            config.num_classes
        );

        Ok(Self {
            stem,
            down_blocks,
            transitions_down,
            bottleneck,
            transitions_up,
            up_blocks,
            classifier,
            num_classes: config.num_classes,
        })
    }

    /// Per-pixel class scores
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes, height, width]
    pub fn forward_logits(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.stem.forward(x);

        let mut skips = Vec::with_capacity(self.down_blocks.len());
        for (block, transition) in self.down_blocks.iter().zip(self.transitions_down.iter()) {
            let out = block.forward(x);
            skips.push(out.stacked.clone());
            x = transition.forward(out.stacked);
        }

        let out = self.bottleneck.forward(x);
        let mut features = out.new_features;
        let mut x = out.stacked;

        for ((transition, block), skip) in self
            .transitions_up
            .iter()
            .zip(self.up_blocks.iter())
            .zip(skips.into_iter().rev())
        {
            let upsampled = transition.forward(features);
            let out = block.forward(Tensor::cat(vec![upsampled, skip], 1));
            features = out.new_features;
            x = out.stacked;
        }

        self.classifier.forward(x)
    }

    /// Per-pixel class probabilities (softmax over the class axis)
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        softmax(self.forward_logits(x), 1)
    }

    /// Most likely class per pixel, shape [batch_size, height, width]
    pub fn segment(&self, x: Tensor<B, 4>) -> Tensor<B, 3, Int> {
        self.forward_logits(x).argmax(1).squeeze::<3>(1)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Save model weights with Burn's compact recorder (`.mpk` is appended)
pub fn save_model<B: Backend>(model: &Tiramisu<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let recorder = CompactRecorder::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| TiramisuError::Recorder(format!("Failed to save model: {:?}", e)))?;

    info!("Model saved to {:?}", path);
    Ok(())
}

/// Build a model for `config` and load weights saved by [`save_model`]
pub fn load_model<B: Backend>(
    config: &TiramisuConfig,
    path: &Path,
    device: &B::Device,
) -> Result<Tiramisu<B>> {
    let with_extension = path.with_extension("mpk");
    if !path.exists() && !with_extension.exists() {
        return Err(TiramisuError::PathNotFound(with_extension));
    }

    let recorder = CompactRecorder::new();
    let model = Tiramisu::new(config, device)?
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| TiramisuError::Recorder(format!("Failed to load model: {:?}", e)))?;

    info!("Model loaded from {:?}", path);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::plan::ArchitecturePlan;
    use crate::architecture::shape::FeatureShape;
    use crate::backend::{DefaultBackend, TrainingBackend};
    use burn::tensor::{Distribution, ElementConversion};

    type TestBackend = DefaultBackend;

    fn tiny_config() -> TiramisuConfig {
        TiramisuConfig {
            input_channels: 3,
            input_height: 16,
            input_width: 16,
            num_classes: 3,
            first_conv_filters: 8,
            growth_rate: 4,
            down_layers: vec![2, 2],
            bottleneck_layers: 2,
            up_layers: vec![2, 2],
            dropout_rate: 0.2,
            weight_decay: 1e-4,
        }
    }

    #[test]
    fn test_output_shape_matches_plan() {
        let device = Default::default();
        let config = tiny_config();
        let model = Tiramisu::<TestBackend>::new(&config, &device).unwrap();
        let plan = ArchitecturePlan::build(&config).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let output = model.forward_logits(input);

        let FeatureShape {
            channels,
            height,
            width,
        } = plan.output_shape();
        assert_eq!(output.dims(), [2, channels, height, width]);
        assert_eq!(model.num_classes(), 3);
    }

    #[test]
    fn test_parameter_count_matches_plan() {
        let device = Default::default();
        let config = tiny_config();
        let model = Tiramisu::<TestBackend>::new(&config, &device).unwrap();
        let plan = ArchitecturePlan::build(&config).unwrap();

        let params = model.num_params();
        assert!(params >= plan.trainable_params());
        assert!(params <= plan.total_params());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let model = Tiramisu::<TestBackend>::new(&tiny_config(), &device).unwrap();

        let input =
            Tensor::<TestBackend, 4>::random([1, 3, 16, 16], Distribution::Default, &device);
        let sums = model.forward(input).sum_dim(1);
        let max_error: f32 = (sums - 1.0).abs().max().into_scalar().elem();

        assert!(max_error < 1e-4);
    }

    #[test]
    fn test_segment_mask_shape_and_range() {
        let device = Default::default();
        let model = Tiramisu::<TestBackend>::new(&tiny_config(), &device).unwrap();

        let input =
            Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);
        let mask = model.segment(input);

        assert_eq!(mask.dims(), [2, 16, 16]);
        let max_class: i64 = mask.max().into_scalar().elem();
        assert!((0..3).contains(&max_class));
    }

    #[test]
    fn test_invalid_resolution_is_rejected() {
        let device = Default::default();
        let config = tiny_config().with_input_size(16, 10);
        assert!(Tiramisu::<TestBackend>::new(&config, &device).is_err());
    }

    #[test]
    fn test_stem_uses_he_uniform_bound() {
        let device = Default::default();
        let model = Tiramisu::<TestBackend>::new(&tiny_config(), &device).unwrap();

        let bound = (6.0f32 / (3.0 * 3.0 * 3.0)).sqrt();
        let largest: f32 = model.stem.weight.val().abs().max().into_scalar().elem();
        assert!(largest <= bound + 1e-6);
    }

    #[test]
    fn test_gradient_reaches_stem() {
        let device = Default::default();
        let model = Tiramisu::<TrainingBackend>::new(&tiny_config(), &device).unwrap();

        let input =
            Tensor::<TrainingBackend, 4>::random([1, 3, 16, 16], Distribution::Default, &device);
        let loss = model.forward_logits(input).mean();
        let grads = loss.backward();

        assert!(model.stem.weight.grad(&grads).is_some());
        assert!(model.classifier.weight.grad(&grads).is_some());
    }

    #[test]
    fn test_save_and_load() {
        let device = Default::default();
        let config = tiny_config();
        let model = Tiramisu::<TestBackend>::new(&config, &device).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("checkpoints").join("tiramisu");
        save_model(&model, &path).unwrap();

        let first = load_model::<TestBackend>(&config, &path, &device).unwrap();
        let second = load_model::<TestBackend>(&config, &path, &device).unwrap();

        assert_eq!(first.num_params(), model.num_params());
        assert_eq!(
            first.classifier.weight.val().into_data(),
            second.classifier.weight.val().into_data()
        );
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let device = Default::default();
        let result = load_model::<TestBackend>(&tiny_config(), Path::new("missing/model"), &device);
        assert!(matches!(result, Err(TiramisuError::PathNotFound(_))));
    }
}
