//! Auditing hand-declared layouts.
//!
//! Architectures are often written down stage by stage with the expected
//! feature map width annotated next to each stage. The audit lines such a
//! declaration up with the inferred plan and reports every place where the
//! two disagree.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::TiramisuConfig;
use super::plan::{ArchitecturePlan, StageKind, StageSummary};
use crate::utils::error::{Result, ResultExt, TiramisuError};

/// Kind of a declared stage. Skip connections are implied and never declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredKind {
    Stem,
    DenseBlock { layers: usize },
    TransitionDown,
    TransitionUp,
    Classifier,
}

impl DeclaredKind {
    fn from_stage(kind: &StageKind) -> Option<Self> {
        match kind {
            StageKind::Stem => Some(DeclaredKind::Stem),
            StageKind::DenseBlock { num_layers, .. } => Some(DeclaredKind::DenseBlock {
                layers: *num_layers,
            }),
            StageKind::TransitionDown => Some(DeclaredKind::TransitionDown),
            StageKind::TransitionUp => Some(DeclaredKind::TransitionUp),
            StageKind::SkipConnection => None,
            StageKind::Classifier => Some(DeclaredKind::Classifier),
        }
    }

    fn same_family(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for DeclaredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredKind::Stem => write!(f, "stem"),
            DeclaredKind::DenseBlock { layers } => write!(f, "dense block ({} layers)", layers),
            DeclaredKind::TransitionDown => write!(f, "transition down"),
            DeclaredKind::TransitionUp => write!(f, "transition up"),
            DeclaredKind::Classifier => write!(f, "classifier"),
        }
    }
}

/// One stage as written down by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredStage {
    pub kind: DeclaredKind,
    /// Annotated output width
    pub channels: usize,
    /// Annotated output resolution, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<(usize, usize)>,
}

impl DeclaredStage {
    pub fn new(kind: DeclaredKind, channels: usize) -> Self {
        Self {
            kind,
            channels,
            resolution: None,
        }
    }

    pub fn at(mut self, height: usize, width: usize) -> Self {
        self.resolution = Some((height, width));
        self
    }
}

/// Ordered list of declared stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub stages: Vec<DeclaredStage>,
}

impl Declaration {
    pub fn new(stages: Vec<DeclaredStage>) -> Self {
        Self { stages }
    }

    /// Declaration matching the inferred plan exactly
    pub fn from_plan(plan: &ArchitecturePlan) -> Self {
        let stages = plan
            .declarable_stages()
            .filter_map(|stage| {
                DeclaredKind::from_stage(&stage.kind).map(|kind| DeclaredStage {
                    kind,
                    channels: stage.output.channels,
                    resolution: Some(stage.output.resolution()),
                })
            })
            .collect();
        Self { stages }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TiramisuError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// FC-DenseNet103 with the widths commonly annotated next to each stage.
///
/// The annotations carry three kinds of slip: 122 instead of 192 after the
/// second block, 578 instead of 576 for the third up block, and each
/// transition up labelled with the stacked output of the up block after it
/// (1088 = 240 upsampled + 656 skip + 12 * 16) instead of its own output.
pub fn annotated_fc_densenet103() -> Declaration {
    use DeclaredKind::*;

    let dense = |layers| DenseBlock { layers };
    Declaration::new(vec![
        DeclaredStage::new(Stem, 48),
        DeclaredStage::new(dense(4), 112),
        DeclaredStage::new(TransitionDown, 112),
        DeclaredStage::new(dense(5), 192),
        DeclaredStage::new(TransitionDown, 122),
        DeclaredStage::new(dense(7), 304),
        DeclaredStage::new(TransitionDown, 304),
        DeclaredStage::new(dense(10), 464),
        DeclaredStage::new(TransitionDown, 464),
        DeclaredStage::new(dense(12), 656),
        DeclaredStage::new(TransitionDown, 656),
        DeclaredStage::new(dense(15), 896),
        DeclaredStage::new(TransitionUp, 1088).at(14, 14),
        DeclaredStage::new(dense(12), 1088),
        DeclaredStage::new(TransitionUp, 816).at(28, 28),
        DeclaredStage::new(dense(10), 816),
        DeclaredStage::new(TransitionUp, 576).at(56, 56),
        DeclaredStage::new(dense(7), 578),
        DeclaredStage::new(TransitionUp, 384).at(112, 112),
        DeclaredStage::new(dense(5), 384),
        DeclaredStage::new(TransitionUp, 256).at(224, 224),
        DeclaredStage::new(dense(4), 256),
        DeclaredStage::new(Classifier, 12).at(224, 224),
    ])
}

/// Built-in declaration to audit `config` against when none is given.
///
/// Only the FC-DenseNet103 block structure has one; input size and class
/// count may still differ and show up as findings.
pub fn builtin_declaration(config: &TiramisuConfig) -> Result<Declaration> {
    let reference = TiramisuConfig::fc_densenet103();
    let same_blocks = config.first_conv_filters == reference.first_conv_filters
        && config.growth_rate == reference.growth_rate
        && config.down_layers == reference.down_layers
        && config.bottleneck_layers == reference.bottleneck_layers
        && config.up_layers == reference.up_layers;

    if same_blocks {
        Ok(annotated_fc_densenet103())
    } else {
        Err(TiramisuError::Config(format!(
            "no built-in declaration for FC-DenseNet{}; provide one explicitly",
            config.depth()
        )))
    }
}

/// One disagreement between declaration and inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditFinding {
    StageCount {
        declared: usize,
        inferred: usize,
    },
    KindMismatch {
        stage: usize,
        label: String,
        declared: DeclaredKind,
        inferred: DeclaredKind,
    },
    LayerCount {
        stage: usize,
        label: String,
        declared: usize,
        inferred: usize,
    },
    ChannelMismatch {
        stage: usize,
        label: String,
        declared: usize,
        inferred: usize,
    },
    ResolutionMismatch {
        stage: usize,
        label: String,
        declared: (usize, usize),
        inferred: (usize, usize),
    },
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditFinding::StageCount { declared, inferred } => write!(
                f,
                "declaration lists {} stages, architecture has {}",
                declared, inferred
            ),
            AuditFinding::KindMismatch {
                stage,
                label,
                declared,
                inferred,
            } => write!(
                f,
                "stage {} ({}): declared {}, architecture has {}",
                stage + 1,
                label,
                declared,
                inferred
            ),
            AuditFinding::LayerCount {
                stage,
                label,
                declared,
                inferred,
            } => write!(
                f,
                "stage {} ({}): declared {} dense layers, configured {}",
                stage + 1,
                label,
                declared,
                inferred
            ),
            AuditFinding::ChannelMismatch {
                stage,
                label,
                declared,
                inferred,
            } => write!(
                f,
                "stage {} ({}): declared {} channels, inferred {}",
                stage + 1,
                label,
                declared,
                inferred
            ),
            AuditFinding::ResolutionMismatch {
                stage,
                label,
                declared,
                inferred,
            } => write!(
                f,
                "stage {} ({}): declared {}x{}, inferred {}x{}",
                stage + 1,
                label,
                declared.0,
                declared.1,
                inferred.0,
                inferred.1
            ),
        }
    }
}

/// Result of auditing a declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub stages_checked: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn channel_mismatches(&self) -> impl Iterator<Item = &AuditFinding> {
        self.findings
            .iter()
            .filter(|f| matches!(f, AuditFinding::ChannelMismatch { .. }))
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_consistent() {
            return writeln!(f, "{} stages checked, no discrepancies", self.stages_checked);
        }
        writeln!(
            f,
            "{} stages checked, {} discrepancies:",
            self.stages_checked,
            self.findings.len()
        )?;
        for finding in &self.findings {
            writeln!(f, "  - {}", finding)?;
        }
        Ok(())
    }
}

/// Compare a declaration against the architecture inferred from `config`
pub fn audit(config: &TiramisuConfig, declaration: &Declaration) -> Result<AuditReport> {
    let plan = ArchitecturePlan::build(config)?;
    let inferred: Vec<&StageSummary> = plan.declarable_stages().collect();

    let mut findings = Vec::new();
    if declaration.stages.len() != inferred.len() {
        findings.push(AuditFinding::StageCount {
            declared: declaration.stages.len(),
            inferred: inferred.len(),
        });
    }

    let stages_checked = declaration.stages.len().min(inferred.len());
    for (idx, (declared, stage)) in declaration.stages.iter().zip(inferred.iter()).enumerate() {
        let Some(expected) = DeclaredKind::from_stage(&stage.kind) else {
            continue;
        };

        if !declared.kind.same_family(&expected) {
            findings.push(AuditFinding::KindMismatch {
                stage: idx,
                label: stage.label.clone(),
                declared: declared.kind,
                inferred: expected,
            });
            continue;
        }

        if let (
            DeclaredKind::DenseBlock { layers: declared_layers },
            DeclaredKind::DenseBlock { layers: inferred_layers },
        ) = (declared.kind, expected)
        {
            if declared_layers != inferred_layers {
                findings.push(AuditFinding::LayerCount {
                    stage: idx,
                    label: stage.label.clone(),
                    declared: declared_layers,
                    inferred: inferred_layers,
                });
            }
        }

        if declared.channels != stage.output.channels {
            findings.push(AuditFinding::ChannelMismatch {
                stage: idx,
                label: stage.label.clone(),
                declared: declared.channels,
                inferred: stage.output.channels,
            });
        }

        if let Some(resolution) = declared.resolution {
            if resolution != stage.output.resolution() {
                findings.push(AuditFinding::ResolutionMismatch {
                    stage: idx,
                    label: stage.label.clone(),
                    declared: resolution,
                    inferred: stage.output.resolution(),
                });
            }
        }
    }

    for finding in &findings {
        warn!("{}", finding);
    }
    info!(
        "Audited {} stages: {} discrepancies",
        stages_checked,
        findings.len()
    );

    Ok(AuditReport {
        stages_checked,
        findings,
    })
}
