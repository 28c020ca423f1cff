//! Static description of the Tiramisu architecture
//!
//! Everything here is pure shape arithmetic; no tensors are allocated:
//! - Declarative configuration with the FC-DenseNet56/67/103 presets
//! - Channel and resolution inference through every stage
//! - Layer plan with parameter counts and a printable summary
//! - Audit of hand-annotated stage widths against the inferred ones

pub mod audit;
pub mod config;
pub mod layout;
pub mod plan;
pub mod shape;
pub mod summary;

pub use audit::{
    annotated_fc_densenet103, audit, builtin_declaration, AuditFinding, AuditReport, Declaration,
};
pub use config::TiramisuConfig;
pub use layout::ChannelLayout;
pub use plan::{ArchitecturePlan, LayerKind, StageKind};
pub use shape::FeatureShape;
pub use summary::ModelSummary;
