//! Inference module for forward-pass benchmarking
//!
//! This module provides:
//! - Latency statistics and timing utilities
//! - A runner that times full segmentation passes of a Tiramisu

pub mod benchmark;
pub mod runner;

pub use benchmark::{BenchmarkConfig, BenchmarkResult, DeviceInfo, LatencyStats, Timer};
pub use runner::run_benchmark;
