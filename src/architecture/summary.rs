//! Printable model summary.

use std::fmt;

use super::plan::{ArchitecturePlan, StageKind};
use crate::utils::format_number;

const NAME_WIDTH: usize = 34;
const TYPE_WIDTH: usize = 16;
const SHAPE_WIDTH: usize = 24;
const PARAM_WIDTH: usize = 12;

/// Layer table of a plan, optionally collapsed to one row per stage
pub struct ModelSummary<'a> {
    plan: &'a ArchitecturePlan,
    title: String,
    per_stage: bool,
}

impl<'a> ModelSummary<'a> {
    pub fn new(plan: &'a ArchitecturePlan) -> Self {
        Self {
            plan,
            title: "Tiramisu".to_string(),
            per_stage: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// One row per building block instead of per primitive layer
    pub fn per_stage(mut self, per_stage: bool) -> Self {
        self.per_stage = per_stage;
        self
    }

    fn rule(f: &mut fmt::Formatter<'_>, ch: char) -> fmt::Result {
        let width = NAME_WIDTH + TYPE_WIDTH + SHAPE_WIDTH + PARAM_WIDTH;
        writeln!(f, "{}", ch.to_string().repeat(width))
    }

    fn row(
        f: &mut fmt::Formatter<'_>,
        name: &str,
        kind: &str,
        shape: &str,
        params: &str,
    ) -> fmt::Result {
        writeln!(
            f,
            "{:<nw$}{:<tw$}{:<sw$}{:>pw$}",
            name,
            kind,
            shape,
            params,
            nw = NAME_WIDTH,
            tw = TYPE_WIDTH,
            sw = SHAPE_WIDTH,
            pw = PARAM_WIDTH
        )
    }
}

fn stage_type(kind: &StageKind) -> String {
    match kind {
        StageKind::Stem => "Stem".to_string(),
        StageKind::DenseBlock { num_layers, .. } => format!("DenseBlock({})", num_layers),
        StageKind::TransitionDown => "TransitionDown".to_string(),
        StageKind::TransitionUp => "TransitionUp".to_string(),
        StageKind::SkipConnection => "Concat".to_string(),
        StageKind::Classifier => "Classifier".to_string(),
    }
}

impl fmt::Display for ModelSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model: \"{}\"", self.title)?;
        Self::rule(f, '_')?;
        Self::row(f, "Layer", "Type", "Output Shape", "Param #")?;
        Self::rule(f, '=')?;

        Self::row(f, "input", "Input", &self.plan.input_shape().to_string(), "0")?;

        if self.per_stage {
            for (idx, stage) in self.plan.stages().iter().enumerate() {
                let params: usize = self.plan.stage_layers(idx).map(|l| l.params()).sum();
                Self::row(
                    f,
                    &stage.label,
                    &stage_type(&stage.kind),
                    &stage.output.to_string(),
                    &format_number(params),
                )?;
            }
        } else {
            for layer in self.plan.layers() {
                Self::row(
                    f,
                    &layer.name,
                    layer.kind.type_name(),
                    &layer.output.to_string(),
                    &format_number(layer.params()),
                )?;
            }
        }

        Self::rule(f, '=')?;
        writeln!(f, "Depth: {}", self.plan.depth())?;
        writeln!(f, "Total params: {}", format_number(self.plan.total_params()))?;
        writeln!(f, "Trainable params: {}", format_number(self.plan.trainable_params()))?;
        writeln!(
            f,
            "Non-trainable params: {}",
            format_number(self.plan.non_trainable_params())
        )?;
        Self::rule(f, '_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::config::TiramisuConfig;

    #[test]
    fn test_summary_lists_every_layer() {
        let plan = ArchitecturePlan::build(&TiramisuConfig::fc_densenet56()).unwrap();
        let text = ModelSummary::new(&plan).to_string();

        assert!(text.starts_with("Model: \"Tiramisu\""));
        assert!(text.contains("stem.conv"));
        assert!(text.contains("classifier.softmax"));
        assert!(text.contains("Depth: 56"));
        assert!(text.contains(&format!("Total params: {}", format_number(plan.total_params()))));
    }

    #[test]
    fn test_per_stage_summary() {
        let plan = ArchitecturePlan::build(&TiramisuConfig::fc_densenet103()).unwrap();
        let text = ModelSummary::new(&plan)
            .with_title("FC-DenseNet103")
            .per_stage(true)
            .to_string();

        assert!(text.contains("FC-DenseNet103"));
        assert!(text.contains("DenseBlock(15)"));
        assert!(text.contains("(None, 896, 7, 7)"));
        assert!(text.contains("(None, 12, 224, 224)"));
        assert!(!text.contains("layer1.norm"));
    }
}
