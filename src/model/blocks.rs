//! FC-DenseNet Building Blocks
//!
//! Dense layers, dense blocks and the two transitions that move between
//! resolutions, all using the Burn framework.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::architecture::layout::{
    DENSE_KERNEL, POOL_SIZE, TRANSITION_DOWN_KERNEL, TRANSITION_UP_KERNEL,
    TRANSITION_UP_PADDING, TRANSITION_UP_PADDING_OUT, TRANSITION_UP_STRIDE,
};

/// He uniform initialisation, bound `sqrt(6 / fan_in)`
pub fn he_uniform() -> Initializer {
    Initializer::KaimingUniform {
        gain: 2f64.sqrt(),
        fan_out_only: false,
    }
}

/// Stride-1 convolution that keeps the resolution
pub fn same_conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_padding(PaddingConfig2d::Same)
        .with_initializer(he_uniform())
        .init(device)
}

/// Configuration for a single dense layer
#[derive(Config, Debug)]
pub struct DenseLayerConfig {
    /// Channels of the running concatenation fed to the layer
    pub in_channels: usize,

    /// Feature maps the layer produces
    pub growth_rate: usize,

    #[config(default = "0.2")]
    pub dropout_rate: f64,
}

impl DenseLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseLayer<B> {
        DenseLayer {
            norm: BatchNormConfig::new(self.in_channels).init(device),
            relu: Relu::new(),
            conv: same_conv(self.in_channels, self.growth_rate, DENSE_KERNEL, device),
            dropout: DropoutConfig::new(self.dropout_rate).init(),
        }
    }
}

/// BN -> ReLU -> 3x3 conv -> dropout
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    pub norm: BatchNorm<B, 2>,
    pub relu: Relu,
    pub conv: Conv2d<B>,
    pub dropout: Dropout,
}

impl<B: Backend> DenseLayer<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(x);
        let x = self.relu.forward(x);
        let x = self.conv.forward(x);
        self.dropout.forward(x)
    }
}

/// Configuration for a dense block
#[derive(Config, Debug)]
pub struct DenseBlockConfig {
    pub in_channels: usize,
    pub num_layers: usize,
    pub growth_rate: usize,

    #[config(default = "0.2")]
    pub dropout_rate: f64,
}

impl DenseBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseBlock<B> {
        let layers = (0..self.num_layers)
            .map(|layer| {
                let in_channels = self.in_channels + layer * self.growth_rate;
                DenseLayerConfig::new(in_channels, self.growth_rate)
                    .with_dropout_rate(self.dropout_rate)
                    .init(device)
            })
            .collect();

        DenseBlock { layers }
    }
}

/// Output of a dense block
pub struct DenseBlockOutput<B: Backend> {
    /// Block input followed by every map the block produced
    pub stacked: Tensor<B, 4>,
    /// Only the maps the block produced
    pub new_features: Tensor<B, 4>,
}

/// Dense layers each seeing the concatenation of everything before them
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    pub layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> DenseBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> DenseBlockOutput<B> {
        let mut stacked = x;
        let mut new_features = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let out = layer.forward(stacked.clone());
            stacked = Tensor::cat(vec![stacked, out.clone()], 1);
            new_features.push(out);
        }

        DenseBlockOutput {
            stacked,
            new_features: Tensor::cat(new_features, 1),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

/// Configuration for a transition down
#[derive(Config, Debug)]
pub struct TransitionDownConfig {
    pub channels: usize,

    #[config(default = "0.2")]
    pub dropout_rate: f64,
}

impl TransitionDownConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransitionDown<B> {
        TransitionDown {
            norm: BatchNormConfig::new(self.channels).init(device),
            relu: Relu::new(),
            conv: same_conv(self.channels, self.channels, TRANSITION_DOWN_KERNEL, device),
            dropout: DropoutConfig::new(self.dropout_rate).init(),
            pool: MaxPool2dConfig::new([POOL_SIZE, POOL_SIZE])
                .with_strides([POOL_SIZE, POOL_SIZE])
                .init(),
        }
    }
}

/// BN -> ReLU -> 1x1 conv -> dropout -> 2x2 max pool
#[derive(Module, Debug)]
pub struct TransitionDown<B: Backend> {
    pub norm: BatchNorm<B, 2>,
    pub relu: Relu,
    pub conv: Conv2d<B>,
    pub dropout: Dropout,
    pub pool: MaxPool2d,
}

impl<B: Backend> TransitionDown<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(x);
        let x = self.relu.forward(x);
        let x = self.conv.forward(x);
        let x = self.dropout.forward(x);
        self.pool.forward(x)
    }
}

/// Configuration for a transition up
#[derive(Config, Debug)]
pub struct TransitionUpConfig {
    pub in_channels: usize,
    pub out_channels: usize,
}

impl TransitionUpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransitionUp<B> {
        let conv = ConvTranspose2dConfig::new(
            [self.in_channels, self.out_channels],
            [TRANSITION_UP_KERNEL, TRANSITION_UP_KERNEL],
        )
        .with_stride([TRANSITION_UP_STRIDE, TRANSITION_UP_STRIDE])
        .with_padding([TRANSITION_UP_PADDING, TRANSITION_UP_PADDING])
        .with_padding_out([TRANSITION_UP_PADDING_OUT, TRANSITION_UP_PADDING_OUT])
        .with_initializer(he_uniform())
        .init(device);

        TransitionUp { conv }
    }
}

/// 3x3 transposed convolution with stride 2, doubling the resolution
#[derive(Module, Debug)]
pub struct TransitionUp<B: Backend> {
    pub conv: ConvTranspose2d<B>,
}

impl<B: Backend> TransitionUp<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_dense_layer_output_shape() {
        let device = Default::default();
        let layer = DenseLayerConfig::new(10, 4).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 10, 8, 8], &device);
        assert_eq!(layer.forward(input).dims(), [2, 4, 8, 8]);
    }

    #[test]
    fn test_dense_block_stacks_and_collects() {
        let device = Default::default();
        let block = DenseBlockConfig::new(6, 3, 4).init::<TestBackend>(&device);
        assert_eq!(block.num_layers(), 3);

        let input = Tensor::<TestBackend, 4>::ones([1, 6, 4, 4], &device);
        let out = block.forward(input);

        assert_eq!(out.stacked.dims(), [1, 6 + 3 * 4, 4, 4]);
        assert_eq!(out.new_features.dims(), [1, 3 * 4, 4, 4]);
    }

    #[test]
    fn test_dense_block_keeps_input_maps_first() {
        let device = Default::default();
        let block = DenseBlockConfig::new(2, 1, 3).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 2, 4, 4], &device);
        let out = block.forward(input.clone());
        let head = out.stacked.narrow(1, 0, 2);

        assert_eq!(head.into_data(), input.into_data());
    }

    #[test]
    fn test_transition_down_halves_resolution() {
        let device = Default::default();
        let transition = TransitionDownConfig::new(12).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 12, 14, 14], &device);
        assert_eq!(transition.forward(input).dims(), [1, 12, 7, 7]);
    }

    #[test]
    fn test_transition_up_doubles_resolution() {
        let device = Default::default();
        let transition = TransitionUpConfig::new(12, 12).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 12, 7, 7], &device);
        assert_eq!(transition.forward(input).dims(), [1, 12, 14, 14]);
    }
}
