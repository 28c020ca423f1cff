//! Layer-by-layer plan of a Tiramisu.
//!
//! Expands an inferred [`ChannelLayout`] into every primitive operation the
//! Burn model executes, with input/output shapes and parameter counts.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::config::TiramisuConfig;
use super::layout::{
    ChannelLayout, DenseStage, CLASSIFIER_KERNEL, DENSE_KERNEL, POOL_SIZE, STEM_KERNEL,
    TRANSITION_DOWN_KERNEL, TRANSITION_UP_KERNEL, TRANSITION_UP_STRIDE,
};
use super::shape::FeatureShape;
use crate::utils::error::Result;

/// Primitive operation in the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerKind {
    Conv2d { kernel: usize, filters: usize },
    BatchNorm,
    Relu,
    Dropout { rate: f64 },
    MaxPool2d { size: usize },
    ConvTranspose2d { kernel: usize, filters: usize, stride: usize },
    Concat,
    Softmax,
}

impl LayerKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Conv2d { .. } => "Conv2d",
            LayerKind::BatchNorm => "BatchNorm",
            LayerKind::Relu => "ReLU",
            LayerKind::Dropout { .. } => "Dropout",
            LayerKind::MaxPool2d { .. } => "MaxPool2d",
            LayerKind::ConvTranspose2d { .. } => "ConvTranspose2d",
            LayerKind::Concat => "Concat",
            LayerKind::Softmax => "Softmax",
        }
    }

    /// Whether the operation carries a kernel
    pub fn has_weights(&self) -> bool {
        matches!(
            self,
            LayerKind::Conv2d { .. } | LayerKind::ConvTranspose2d { .. }
        )
    }
}

/// Which part of the network a dense block belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockPath {
    Down,
    Bottleneck,
    Up,
}

/// Coarse building block the primitive layers are grouped into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Stem,
    DenseBlock { path: BlockPath, num_layers: usize },
    TransitionDown,
    TransitionUp,
    SkipConnection,
    Classifier,
}

impl StageKind {
    /// Skip connections are implied by the architecture and never written down
    pub fn is_declarable(&self) -> bool {
        !matches!(self, StageKind::SkipConnection)
    }
}

/// One building block with the shapes entering and leaving it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub label: String,
    pub kind: StageKind,
    pub input: FeatureShape,
    pub output: FeatureShape,
}

/// One primitive operation of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedLayer {
    pub name: String,
    /// Index into [`ArchitecturePlan::stages`]
    pub stage: usize,
    pub kind: LayerKind,
    pub input: FeatureShape,
    pub output: FeatureShape,
    pub trainable_params: usize,
    pub non_trainable_params: usize,
}

impl PlannedLayer {
    pub fn params(&self) -> usize {
        self.trainable_params + self.non_trainable_params
    }
}

/// Complete static plan of a Tiramisu
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitecturePlan {
    layout: ChannelLayout,
    stages: Vec<StageSummary>,
    layers: Vec<PlannedLayer>,
}

impl ArchitecturePlan {
    /// Infer the layout and expand it into primitive layers
    pub fn build(config: &TiramisuConfig) -> Result<Self> {
        let layout = ChannelLayout::infer(config)?;
        let mut builder = PlanBuilder::new(config.dropout_rate);

        builder.stage("stem", StageKind::Stem, layout.input, layout.stem);
        builder.conv("stem.conv", layout.input, layout.stem.channels, STEM_KERNEL);

        for (idx, level) in layout.down.iter().enumerate() {
            let label = format!("down{}", idx + 1);
            builder.dense_block(&label, BlockPath::Down, &level.block, false);

            let label = format!("td{}", idx + 1);
            builder.stage(&label, StageKind::TransitionDown, level.skip(), level.pooled);
            builder.transition_down(&label, level.skip(), level.pooled);
        }

        builder.dense_block("bottleneck", BlockPath::Bottleneck, &layout.bottleneck, true);

        let last_up = layout.up.len().saturating_sub(1);
        for (idx, level) in layout.up.iter().enumerate() {
            let label = format!("tu{}", idx + 1);
            builder.stage(
                &label,
                StageKind::TransitionUp,
                level.transition_input,
                level.upsampled,
            );
            builder.push(
                &format!("{}.conv_transpose", label),
                LayerKind::ConvTranspose2d {
                    kernel: TRANSITION_UP_KERNEL,
                    filters: level.upsampled.channels,
                    stride: TRANSITION_UP_STRIDE,
                },
                level.transition_input,
                level.upsampled,
                conv_params(
                    TRANSITION_UP_KERNEL,
                    level.transition_input.channels,
                    level.upsampled.channels,
                ),
                0,
            );

            let label = format!("skip{}", idx + 1);
            builder.stage(&label, StageKind::SkipConnection, level.upsampled, level.block.input);
            builder.push(
                &format!("{}.concat", label),
                LayerKind::Concat,
                level.upsampled,
                level.block.input,
                0,
                0,
            );

            let label = format!("up{}", idx + 1);
            builder.dense_block(&label, BlockPath::Up, &level.block, idx != last_up);
        }

        builder.stage(
            "classifier",
            StageKind::Classifier,
            layout.classifier_input,
            layout.output,
        );
        builder.conv(
            "classifier.conv",
            layout.classifier_input,
            layout.output.channels,
            CLASSIFIER_KERNEL,
        );
        builder.push("classifier.softmax", LayerKind::Softmax, layout.output, layout.output, 0, 0);

        let plan = Self {
            layout,
            stages: builder.stages,
            layers: builder.layers,
        };

        info!(
            "Planned {} layers ({} weight layers), {} parameters, output {}",
            plan.layers.len(),
            plan.depth(),
            plan.total_params(),
            plan.output_shape()
        );

        Ok(plan)
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    pub fn stages(&self) -> &[StageSummary] {
        &self.stages
    }

    pub fn layers(&self) -> &[PlannedLayer] {
        &self.layers
    }

    /// Primitive layers belonging to one stage
    pub fn stage_layers(&self, stage: usize) -> impl Iterator<Item = &PlannedLayer> {
        self.layers.iter().filter(move |layer| layer.stage == stage)
    }

    /// Stages a hand-written declaration is expected to list
    pub fn declarable_stages(&self) -> impl Iterator<Item = &StageSummary> {
        self.stages.iter().filter(|stage| stage.kind.is_declarable())
    }

    pub fn input_shape(&self) -> FeatureShape {
        self.layout.input
    }

    pub fn output_shape(&self) -> FeatureShape {
        self.layout.output
    }

    pub fn trainable_params(&self) -> usize {
        self.layers.iter().map(|l| l.trainable_params).sum()
    }

    pub fn non_trainable_params(&self) -> usize {
        self.layers.iter().map(|l| l.non_trainable_params).sum()
    }

    pub fn total_params(&self) -> usize {
        self.trainable_params() + self.non_trainable_params()
    }

    /// Number of layers carrying a kernel
    pub fn depth(&self) -> usize {
        self.layers.iter().filter(|l| l.kind.has_weights()).count()
    }
}

struct PlanBuilder {
    dropout_rate: f64,
    stages: Vec<StageSummary>,
    layers: Vec<PlannedLayer>,
}

impl PlanBuilder {
    fn new(dropout_rate: f64) -> Self {
        Self {
            dropout_rate,
            stages: Vec::new(),
            layers: Vec::new(),
        }
    }

    fn stage(&mut self, label: &str, kind: StageKind, input: FeatureShape, output: FeatureShape) {
        self.stages.push(StageSummary {
            label: label.to_string(),
            kind,
            input,
            output,
        });
    }

    fn push(
        &mut self,
        name: &str,
        kind: LayerKind,
        input: FeatureShape,
        output: FeatureShape,
        trainable_params: usize,
        non_trainable_params: usize,
    ) {
        self.layers.push(PlannedLayer {
            name: name.to_string(),
            stage: self.stages.len().saturating_sub(1),
            kind,
            input,
            output,
            trainable_params,
            non_trainable_params,
        });
    }

    fn conv(&mut self, name: &str, input: FeatureShape, filters: usize, kernel: usize) {
        self.push(
            name,
            LayerKind::Conv2d { kernel, filters },
            input,
            input.with_channels(filters),
            conv_params(kernel, input.channels, filters),
            0,
        );
    }

    /// BN -> ReLU -> conv -> dropout, the composite used by dense layers and
    /// transitions down
    fn norm_relu_conv_dropout(
        &mut self,
        prefix: &str,
        input: FeatureShape,
        filters: usize,
        kernel: usize,
    ) {
        let channels = input.channels;
        self.push(
            &format!("{}.norm", prefix),
            LayerKind::BatchNorm,
            input,
            input,
            2 * channels,
            2 * channels,
        );
        self.push(&format!("{}.relu", prefix), LayerKind::Relu, input, input, 0, 0);
        self.conv(&format!("{}.conv", prefix), input, filters, kernel);

        let output = input.with_channels(filters);
        self.push(
            &format!("{}.dropout", prefix),
            LayerKind::Dropout {
                rate: self.dropout_rate,
            },
            output,
            output,
            0,
            0,
        );
    }

    fn dense_block(&mut self, label: &str, path: BlockPath, block: &DenseStage, collect_new: bool) {
        self.stage(
            label,
            StageKind::DenseBlock {
                path,
                num_layers: block.num_layers,
            },
            block.input,
            block.stacked(),
        );

        for layer in 0..block.num_layers {
            let prefix = format!("{}.layer{}", label, layer + 1);
            let input = block.input.with_channels(block.layer_input_channels(layer));
            self.norm_relu_conv_dropout(&prefix, input, block.growth_rate, DENSE_KERNEL);
            self.push(
                &format!("{}.concat", prefix),
                LayerKind::Concat,
                input,
                input.with_channels(input.channels + block.growth_rate),
                0,
                0,
            );
        }

        if collect_new {
            self.push(
                &format!("{}.new_features", label),
                LayerKind::Concat,
                block.input.with_channels(block.growth_rate),
                block.new_features(),
                0,
                0,
            );
        }
    }

    fn transition_down(&mut self, label: &str, input: FeatureShape, pooled: FeatureShape) {
        self.norm_relu_conv_dropout(label, input, input.channels, TRANSITION_DOWN_KERNEL);
        self.push(
            &format!("{}.pool", label),
            LayerKind::MaxPool2d { size: POOL_SIZE },
            input,
            pooled,
            0,
            0,
        );
    }
}

/// Kernel plus bias parameters of a (transposed) convolution
fn conv_params(kernel: usize, in_channels: usize, out_channels: usize) -> usize {
    kernel * kernel * in_channels * out_channels + out_channels
}
