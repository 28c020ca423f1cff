//! Benchmark Runner Module
//!
//! Builds (or loads) a Tiramisu and times full segmentation passes on random
//! input of the configured resolution.

use std::path::Path;

use burn::{
    module::Module,
    tensor::{backend::Backend, Distribution, Tensor},
};
use tracing::info;

use super::benchmark::{BenchmarkConfig, BenchmarkResult, DeviceInfo, Timer};
use crate::architecture::config::TiramisuConfig;
use crate::model::tiramisu::{load_model, Tiramisu};
use crate::utils::error::Result;
use crate::utils::logging::ProgressLogger;

/// Run a benchmark on a model with random input
///
/// Every timed iteration runs the network and reads the predicted mask back,
/// so asynchronous backends are measured end to end.
pub fn run_benchmark<B: Backend>(
    model_config: &TiramisuConfig,
    config: BenchmarkConfig,
    model_path: Option<&Path>,
    device: &B::Device,
) -> Result<BenchmarkResult> {
    config.validate()?;
    model_config.validate()?;

    let architecture = format!("FC-DenseNet{}", model_config.depth());
    let input_shape = [
        config.batch_size,
        model_config.input_channels,
        model_config.input_height,
        model_config.input_width,
    ];

    info!("Benchmarking {} on {:?}", architecture, device);
    info!(
        "Input {:?}, {} warmup + {} timed iterations",
        input_shape, config.warmup_iterations, config.iterations
    );

    let model: Tiramisu<B> = match model_path {
        Some(path) => load_model(model_config, path, device)?,
        None => {
            info!("No checkpoint given, timing freshly initialised weights");
            Tiramisu::new(model_config, device)?
        }
    };

    let input = Tensor::<B, 4>::random(input_shape, Distribution::Uniform(-1.0, 1.0), device);

    for _ in 0..config.warmup_iterations {
        let _ = model.segment(input.clone()).into_data();
    }

    let mut timer = Timer::new();
    let mut progress = ProgressLogger::new("Forward passes", config.iterations);
    for i in 0..config.iterations {
        timer.start();
        let _ = model.segment(input.clone()).into_data();
        timer.stop();
        progress.update(i + 1);
    }
    progress.finish();

    let device_info = DeviceInfo {
        backend: crate::backend::backend_name().to_string(),
        device: format!("{:?}", device),
    };

    let result = BenchmarkResult::from_timings(
        &architecture,
        input_shape,
        model.num_params(),
        timer.times(),
        config,
        device_info,
    );
    info!("{}", result.summary());

    if let Some(output_path) = &result.config.output_path {
        result.save(output_path)?;
        info!("Saved results to {:?}", output_path);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::model::tiramisu::save_model;

    fn tiny_config() -> TiramisuConfig {
        TiramisuConfig {
            input_height: 16,
            input_width: 16,
            num_classes: 4,
            first_conv_filters: 8,
            growth_rate: 4,
            down_layers: vec![1, 1],
            bottleneck_layers: 1,
            up_layers: vec![1, 1],
            ..TiramisuConfig::default()
        }
    }

    #[test]
    fn test_quick_benchmark() {
        let device = Default::default();
        let result =
            run_benchmark::<DefaultBackend>(&tiny_config(), BenchmarkConfig::quick(), None, &device)
                .unwrap();

        assert_eq!(result.architecture, "FC-DenseNet11");
        assert_eq!(result.input_shape, [1, 3, 16, 16]);
        assert!(result.num_params > 0);
        assert!(result.throughput > 0.0);
    }

    #[test]
    fn test_benchmark_from_checkpoint_writes_results() {
        let device = Default::default();
        let config = tiny_config();
        let dir = tempfile::TempDir::new().unwrap();

        let model = Tiramisu::<DefaultBackend>::new(&config, &device).unwrap();
        let model_path = dir.path().join("tiny");
        save_model(&model, &model_path).unwrap();

        let output_path = dir.path().join("bench.json");
        let bench = BenchmarkConfig {
            output_path: Some(output_path.clone()),
            ..BenchmarkConfig::quick()
        };

        let result =
            run_benchmark::<DefaultBackend>(&config, bench, Some(&model_path), &device).unwrap();

        assert!(output_path.exists());
        assert_eq!(result.num_params, model.num_params());
    }

    #[test]
    fn test_benchmark_rejects_bad_resolution() {
        let device = Default::default();
        let config = tiny_config().with_input_size(18, 16);
        assert!(
            run_benchmark::<DefaultBackend>(&config, BenchmarkConfig::quick(), None, &device)
                .is_err()
        );
    }
}
