//! Architecture Configuration Module
//!
//! Declarative description of an FC-DenseNet: stem width, growth rate and the
//! depth of every dense block along the down path, bottleneck and up path.

use std::path::Path;

use burn::optim::decay::WeightDecayConfig;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, ResultExt, TiramisuError};

/// Configuration for a Tiramisu (FC-DenseNet) architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiramisuConfig {
    /// Number of input channels (3 for RGB)
    pub input_channels: usize,

    /// Input image height
    pub input_height: usize,

    /// Input image width
    pub input_width: usize,

    /// Number of segmentation classes (12 for CamVid including void)
    pub num_classes: usize,

    /// Filters of the first 3x3 convolution
    pub first_conv_filters: usize,

    /// Feature maps produced by each dense layer
    pub growth_rate: usize,

    /// Dense layers per block on the down path
    pub down_layers: Vec<usize>,

    /// Dense layers in the bottleneck block
    pub bottleneck_layers: usize,

    /// Dense layers per block on the up path
    pub up_layers: Vec<usize>,

    /// Dropout probability after every convolution
    pub dropout_rate: f64,

    /// L2 penalty applied to kernels and batch norm parameters
    pub weight_decay: f64,
}

impl Default for TiramisuConfig {
    fn default() -> Self {
        Self::fc_densenet103()
    }
}

impl TiramisuConfig {
    /// FC-DenseNet56: 4 layers per block, growth rate 12
    pub fn fc_densenet56() -> Self {
        Self {
            growth_rate: 12,
            down_layers: vec![4; 5],
            bottleneck_layers: 4,
            up_layers: vec![4; 5],
            ..Self::fc_densenet103()
        }
    }

    /// FC-DenseNet67: 5 layers per block, growth rate 16
    pub fn fc_densenet67() -> Self {
        Self {
            growth_rate: 16,
            down_layers: vec![5; 5],
            bottleneck_layers: 5,
            up_layers: vec![5; 5],
            ..Self::fc_densenet103()
        }
    }

    /// FC-DenseNet103 on 224x224 RGB input with 12 classes
    pub fn fc_densenet103() -> Self {
        Self {
            input_channels: 3,
            input_height: 224,
            input_width: 224,
            num_classes: 12,
            first_conv_filters: 48,
            growth_rate: 16,
            down_layers: vec![4, 5, 7, 10, 12],
            bottleneck_layers: 15,
            up_layers: vec![12, 10, 7, 5, 4],
            dropout_rate: 0.2,
            weight_decay: 1e-4,
        }
    }

    /// Override the input resolution
    pub fn with_input_size(mut self, height: usize, width: usize) -> Self {
        self.input_height = height;
        self.input_width = width;
        self
    }

    /// Override the number of output classes
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Number of max-pool stages, each halving the resolution
    pub fn num_pools(&self) -> usize {
        self.down_layers.len()
    }

    /// Factor the input height and width must be divisible by
    pub fn downsampling_factor(&self) -> Result<usize> {
        u32::try_from(self.num_pools())
            .ok()
            .and_then(|pools| 1usize.checked_shl(pools))
            .ok_or_else(|| {
                TiramisuError::Config(format!(
                    "{} max-pool stages overflow the downsampling factor",
                    self.num_pools()
                ))
            })
    }

    /// Number of weight layers: stem, every dense layer, one convolution per
    /// transition down, one transposed convolution per transition up and the
    /// classifier.
    pub fn depth(&self) -> usize {
        let dense_layers: usize = self.down_layers.iter().sum::<usize>()
            + self.bottleneck_layers
            + self.up_layers.iter().sum::<usize>();

        1 + dense_layers + self.down_layers.len() + self.up_layers.len() + 1
    }

    /// Validate the configuration, including the input resolution
    pub fn validate(&self) -> Result<()> {
        self.validate_structure()?;

        let factor = self.downsampling_factor()?;
        for (dimension, size) in [("height", self.input_height), ("width", self.input_width)] {
            if size == 0 || size % factor != 0 {
                return Err(TiramisuError::Resolution {
                    dimension,
                    size,
                    factor,
                    pools: self.num_pools(),
                });
            }
        }

        Ok(())
    }

    /// Validate everything except the input resolution.
    ///
    /// Shape inference uses this so that resolution problems surface as the
    /// concrete skip connection that fails to line up.
    pub fn validate_structure(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(config_error("num_classes must be greater than 0"));
        }

        if self.input_channels == 0 {
            return Err(config_error("input_channels must be greater than 0"));
        }

        if self.first_conv_filters == 0 {
            return Err(config_error("first_conv_filters must be greater than 0"));
        }

        if self.growth_rate == 0 {
            return Err(config_error("growth_rate must be greater than 0"));
        }

        if self.down_layers.is_empty() {
            return Err(config_error("down_layers must have at least one block"));
        }

        if self.up_layers.len() != self.down_layers.len() {
            return Err(TiramisuError::Config(format!(
                "up_layers has {} blocks but down_layers has {}; every skip connection needs an up block",
                self.up_layers.len(),
                self.down_layers.len()
            )));
        }

        if self.bottleneck_layers == 0 {
            return Err(config_error("bottleneck_layers must be greater than 0"));
        }

        if let Some(idx) = self.down_layers.iter().position(|&n| n == 0) {
            return Err(TiramisuError::Config(format!(
                "down block {} has no dense layers",
                idx + 1
            )));
        }

        if let Some(idx) = self.up_layers.iter().position(|&n| n == 0) {
            return Err(TiramisuError::Config(format!(
                "up block {} has no dense layers",
                idx + 1
            )));
        }

        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(config_error("dropout_rate must be in range [0.0, 1.0)"));
        }

        if self.weight_decay < 0.0 {
            return Err(config_error("weight_decay must not be negative"));
        }

        Ok(())
    }

    /// Weight decay to hand to a Burn optimizer
    pub fn optimizer_weight_decay(&self) -> WeightDecayConfig {
        WeightDecayConfig::new(self.weight_decay as f32)
    }

    /// Save configuration to a JSON file
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

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TiramisuError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }
}

fn config_error(msg: &str) -> TiramisuError {
    TiramisuError::Config(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fc_densenet103() {
        let config = TiramisuConfig::default();
        assert_eq!(config, TiramisuConfig::fc_densenet103());
        assert_eq!(config.first_conv_filters, 48);
        assert_eq!(config.num_classes, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_depth_matches_preset_names() {
        assert_eq!(TiramisuConfig::fc_densenet56().depth(), 56);
        assert_eq!(TiramisuConfig::fc_densenet67().depth(), 67);
        assert_eq!(TiramisuConfig::fc_densenet103().depth(), 103);
    }

    #[test]
    fn test_presets_validate() {
        assert!(TiramisuConfig::fc_densenet56().validate().is_ok());
        assert!(TiramisuConfig::fc_densenet67().validate().is_ok());
    }

    #[test]
    fn test_resolution_must_survive_every_pool() {
        let config = TiramisuConfig::default().with_input_size(224, 100);
        match config.validate() {
            Err(TiramisuError::Resolution {
                dimension, factor, ..
            }) => {
                assert_eq!(dimension, "width");
                assert_eq!(factor, 32);
            }
            other => panic!("expected resolution error, got {:?}", other),
        }

        let config = TiramisuConfig::default().with_input_size(0, 224);
        assert!(config.validate().is_err());
        assert!(config.validate_structure().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_blocks() {
        let mut config = TiramisuConfig::default();
        config.up_layers.pop();
        assert!(matches!(config.validate(), Err(TiramisuError::Config(_))));

        let mut config = TiramisuConfig::default();
        config.down_layers[2] = 0;
        assert!(config.validate().is_err());

        let mut config = TiramisuConfig::default();
        config.down_layers.clear();
        config.up_layers.clear();
        assert!(config.validate().is_err());

        let mut config = TiramisuConfig::default();
        config.growth_rate = 0;
        assert!(config.validate().is_err());

        let mut config = TiramisuConfig::default();
        config.dropout_rate = 1.0;
        assert!(config.validate().is_err());

        let config = TiramisuConfig::default().with_num_classes(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fewer_pools_relax_resolution() {
        let config = TiramisuConfig {
            down_layers: vec![2, 2],
            up_layers: vec![2, 2],
            ..TiramisuConfig::default()
        }
        .with_input_size(12, 20);

        assert_eq!(config.downsampling_factor().unwrap(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_too_many_pools_is_an_error() {
        let config = TiramisuConfig {
            down_layers: vec![1; 64],
            up_layers: vec![1; 64],
            ..TiramisuConfig::default()
        };

        assert!(matches!(
            config.downsampling_factor(),
            Err(TiramisuError::Config(_))
        ));
        assert!(matches!(config.validate(), Err(TiramisuError::Config(_))));
    }

    #[test]
    fn test_optimizer_weight_decay() {
        let decay = TiramisuConfig::default().optimizer_weight_decay();
        assert!((decay.penalty - 1e-4).abs() < 1e-9);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("configs").join("fc_densenet67.json");

        let config = TiramisuConfig::fc_densenet67().with_num_classes(21);
        config.save(&path).unwrap();

        let loaded = TiramisuConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let result = TiramisuConfig::load(Path::new("does/not/exist.json"));
        assert!(matches!(result, Err(TiramisuError::PathNotFound(_))));
    }
}
