//! Benchmark Module for Forward-Pass Latency
//!
//! Measures how long a Tiramisu takes to segment a batch of images.
//!
//! ## Key Metrics
//!
//! - **Latency**: Time per forward pass (ms)
//! - **Throughput**: Images segmented per second
//! - **Pixel rate**: Megapixels labelled per second

use std::path::Path;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, ResultExt, TiramisuError};

/// Configuration for benchmarking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of warmup iterations (excluded from measurements)
    pub warmup_iterations: usize,

    /// Number of benchmark iterations
    pub iterations: usize,

    /// Images per forward pass
    pub batch_size: usize,

    /// Whether to keep individual iteration times
    pub verbose: bool,

    /// Output file for results (optional)
    pub output_path: Option<PathBuf>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 5,
            iterations: 50,
            batch_size: 1,
            verbose: false,
            output_path: None,
        }
    }
}

impl BenchmarkConfig {
    /// Create a quick benchmark config for smoke testing
    pub fn quick() -> Self {
        Self {
            warmup_iterations: 1,
            iterations: 5,
            ..Self::default()
        }
    }

    /// Create a thorough benchmark config for final numbers
    pub fn thorough() -> Self {
        Self {
            warmup_iterations: 10,
            iterations: 200,
            verbose: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(TiramisuError::Config(
                "iterations must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TiramisuError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Device the benchmark ran on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Backend name (CUDA, NdArray)
    pub backend: String,
    /// Debug representation of the Burn device
    pub device: String,
}

/// Results from a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Architecture that was timed, e.g. FC-DenseNet103
    pub architecture: String,

    /// Input shape [batch, channels, height, width]
    pub input_shape: [usize; 4],

    /// Parameters of the timed model
    pub num_params: usize,

    /// Latency statistics
    pub latency: LatencyStats,

    /// Throughput (images per second)
    pub throughput: f64,

    /// Labelled pixels per second, in millions
    pub megapixels_per_second: f64,

    /// Individual iteration times (if verbose)
    pub iteration_times_ms: Vec<f64>,

    /// Configuration used for this benchmark
    pub config: BenchmarkConfig,

    /// Timestamp of when benchmark was run
    pub timestamp: String,

    pub device_info: DeviceInfo,
}

impl BenchmarkResult {
    /// Create a new benchmark result from timing data
    pub fn from_timings(
        architecture: &str,
        input_shape: [usize; 4],
        num_params: usize,
        timings: &[Duration],
        config: BenchmarkConfig,
        device_info: DeviceInfo,
    ) -> Self {
        let latency = LatencyStats::from_durations(timings);
        let throughput = if latency.mean_ms > 0.0 {
            config.batch_size as f64 / (latency.mean_ms / 1000.0)
        } else {
            0.0
        };
        let pixels_per_image = (input_shape[2] * input_shape[3]) as f64;
        let megapixels_per_second = throughput * pixels_per_image / 1e6;

        let iteration_times_ms = if config.verbose {
            timings.iter().map(|d| d.as_secs_f64() * 1000.0).collect()
        } else {
            Vec::new()
        };

        Self {
            architecture: architecture.to_string(),
            input_shape,
            num_params,
            latency,
            throughput,
            megapixels_per_second,
            iteration_times_ms,
            config,
            timestamp: chrono::Utc::now().to_rfc3339(),
            device_info,
        }
    }

    /// Save results to a JSON file
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

    /// Load results from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Check if latency meets the target (in milliseconds)
    pub fn meets_latency_target(&self, target_ms: f64) -> bool {
        self.latency.p95_ms <= target_ms
    }

    /// Get a summary string
    pub fn summary(&self) -> String {
        format!(
            "Latency: {:.2}ms (mean), {:.2}ms (p95), {:.2}ms (p99) | Throughput: {:.1} img/s",
            self.latency.mean_ms, self.latency.p95_ms, self.latency.p99_ms, self.throughput
        )
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [batch, channels, height, width] = self.input_shape;
        let timestamp = self.timestamp.get(..19).unwrap_or(&self.timestamp);

        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║              Benchmark Results                               ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Model:     {:51} ║", self.architecture)?;
        writeln!(f, "║ Backend:   {:51} ║", self.device_info.backend)?;
        writeln!(f, "║ Timestamp: {:51} ║", timestamp)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Latency Statistics                                           ║")?;
        writeln!(f, "║   Mean:     {:8.2} ms                                      ║", self.latency.mean_ms)?;
        writeln!(f, "║   Std Dev:  {:8.2} ms                                      ║", self.latency.std_ms)?;
        writeln!(f, "║   Min:      {:8.2} ms                                      ║", self.latency.min_ms)?;
        writeln!(f, "║   Max:      {:8.2} ms                                      ║", self.latency.max_ms)?;
        writeln!(f, "║   P50:      {:8.2} ms                                      ║", self.latency.p50_ms)?;
        writeln!(f, "║   P95:      {:8.2} ms                                      ║", self.latency.p95_ms)?;
        writeln!(f, "║   P99:      {:8.2} ms                                      ║", self.latency.p99_ms)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Throughput: {:8.1} images/second                          ║", self.throughput)?;
        writeln!(f, "║ Pixels:     {:8.2} megapixels/second                      ║", self.megapixels_per_second)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Configuration                                                ║")?;
        writeln!(f, "║   Input:        {:4} x {:4} x {:4} x {:4}                     ║", batch, channels, height, width)?;
        writeln!(f, "║   Parameters:   {:12}                                 ║", self.num_params)?;
        writeln!(f, "║   Iterations:   {:5}                                        ║", self.config.iterations)?;
        writeln!(f, "║   Warmup:       {:5}                                        ║", self.config.warmup_iterations)?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

/// Latency statistics from benchmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Mean latency in milliseconds
    pub mean_ms: f64,
    /// Standard deviation in milliseconds
    pub std_ms: f64,
    /// Minimum latency
    pub min_ms: f64,
    /// Maximum latency
    pub max_ms: f64,
    /// Median (50th percentile)
    pub p50_ms: f64,
    /// 95th percentile
    pub p95_ms: f64,
    /// 99th percentile
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Calculate statistics from a list of durations
    pub fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let mut times_ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        times_ms.sort_by(|a, b| a.total_cmp(b));

        let n = times_ms.len();
        let mean = times_ms.iter().sum::<f64>() / n as f64;
        let variance = times_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: times_ms[0],
            max_ms: times_ms[n - 1],
            p50_ms: percentile(&times_ms, 50.0),
            p95_ms: percentile(&times_ms, 95.0),
            p99_ms: percentile(&times_ms, 99.0),
        }
    }
}

/// Calculate percentile from sorted data
fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[idx.min(sorted_data.len() - 1)]
}

/// Timer utility for benchmarking
pub struct Timer {
    start: Instant,
    times: Vec<Duration>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            times: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.start = Instant::now();
    }

    /// Stop timing and record the duration
    pub fn stop(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        self.times.push(elapsed);
        elapsed
    }

    pub fn times(&self) -> &[Duration] {
        &self.times
    }

    pub fn stats(&self) -> LatencyStats {
        LatencyStats::from_durations(&self.times)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_info() -> DeviceInfo {
        DeviceInfo {
            backend: "NdArray (CPU)".to_string(),
            device: "Cpu".to_string(),
        }
    }

    #[test]
    fn test_latency_stats() {
        let durations: Vec<Duration> = vec![
            Duration::from_millis(10),
            Duration::from_millis(12),
            Duration::from_millis(11),
            Duration::from_millis(15),
            Duration::from_millis(9),
        ];

        let stats = LatencyStats::from_durations(&durations);

        assert!((stats.mean_ms - 11.4).abs() < 0.1);
        assert_eq!(stats.min_ms, 9.0);
        assert_eq!(stats.max_ms, 15.0);
        assert_eq!(stats.p50_ms, 11.0);
    }

    #[test]
    fn test_empty_timings() {
        let stats = LatencyStats::from_durations(&[]);
        assert_eq!(stats.mean_ms, 0.0);
    }

    #[test]
    fn test_benchmark_config_validation() {
        assert!(BenchmarkConfig::default().validate().is_ok());
        assert!(BenchmarkConfig::quick().validate().is_ok());

        let config = BenchmarkConfig {
            iterations: 0,
            ..BenchmarkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timer() {
        let mut timer = Timer::new();

        for _ in 0..5 {
            timer.start();
            std::thread::sleep(Duration::from_millis(1));
            timer.stop();
        }

        assert_eq!(timer.times().len(), 5);
        assert!(timer.stats().mean_ms >= 1.0);
    }

    #[test]
    fn test_throughput_and_pixel_rate() {
        let timings = vec![Duration::from_millis(100); 4];
        let config = BenchmarkConfig {
            batch_size: 2,
            ..BenchmarkConfig::default()
        };

        let result = BenchmarkResult::from_timings(
            "FC-DenseNet56",
            [2, 3, 100, 100],
            1000,
            &timings,
            config,
            device_info(),
        );

        assert!((result.throughput - 20.0).abs() < 1e-6);
        assert!((result.megapixels_per_second - 0.2).abs() < 1e-6);
        assert!(result.meets_latency_target(150.0));
        assert!(!result.meets_latency_target(50.0));
        assert!(result.to_string().contains("FC-DenseNet56"));
    }

    #[test]
    fn test_result_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bench").join("result.json");

        let result = BenchmarkResult::from_timings(
            "FC-DenseNet103",
            [1, 3, 224, 224],
            42,
            &[Duration::from_millis(5)],
            BenchmarkConfig::quick(),
            device_info(),
        );
        result.save(&path).unwrap();

        let loaded = BenchmarkResult::load(&path).unwrap();
        assert_eq!(loaded.architecture, "FC-DenseNet103");
        assert_eq!(loaded.input_shape, [1, 3, 224, 224]);
        assert_eq!(loaded.timestamp, result.timestamp);
    }
}
