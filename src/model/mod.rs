//! Model module for the Tiramisu segmentation network using the Burn framework
//!
//! This module provides:
//! - FC-DenseNet building blocks (dense layer, dense block, transitions)
//! - The full Tiramisu network built from an inferred channel layout
//! - Model serialization and loading utilities

pub mod blocks;
pub mod tiramisu;

pub use blocks::{DenseBlock, DenseBlockOutput, DenseLayer, TransitionDown, TransitionUp};
pub use tiramisu::{load_model, save_model, Tiramisu};
