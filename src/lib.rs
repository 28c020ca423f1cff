//! # Tiramisu
//!
//! The One Hundred Layers Tiramisu (FC-DenseNet) for semantic segmentation,
//! built with the Burn framework, together with a static engine that infers
//! and checks the channel count and resolution of every layer.
//!
//! ## Modules
//!
//! - `architecture`: configuration, shape/channel inference, layer plan,
//!   summaries and auditing of hand-annotated layouts
//! - `model`: dense blocks, transitions and the full network in Burn
//! - `inference`: forward-pass latency benchmarking
//! - `utils`: errors, logging, segmentation metrics and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tiramisu::backend::{default_device, DefaultBackend};
//! use tiramisu::{ArchitecturePlan, ModelSummary, Tiramisu, TiramisuConfig};
//!
//! let config = TiramisuConfig::fc_densenet103();
//! let plan = ArchitecturePlan::build(&config)?;
//! println!("{}", ModelSummary::new(&plan).per_stage(true));
//!
//! let model = Tiramisu::<DefaultBackend>::new(&config, &default_device())?;
//! ```

pub mod architecture;
pub mod backend;
pub mod inference;
pub mod model;
pub mod utils;

pub use architecture::{
    annotated_fc_densenet103, audit, ArchitecturePlan, AuditReport, ChannelLayout, Declaration,
    FeatureShape, ModelSummary, TiramisuConfig,
};
pub use inference::{run_benchmark, BenchmarkConfig, BenchmarkResult};
pub use model::{load_model, save_model, Tiramisu};
pub use utils::error::{Result, TiramisuError};
pub use utils::metrics::{ConfusionMatrix, SegmentationMetrics};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
