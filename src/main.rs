//! Tiramisu CLI
//!
//! Inspect, validate and benchmark FC-DenseNet architectures built with the
//! Burn framework.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::info;

use tiramisu::architecture::audit::{audit, builtin_declaration, Declaration};
use tiramisu::architecture::{ArchitecturePlan, ChannelLayout, ModelSummary, TiramisuConfig};
use tiramisu::utils::format_number;
use tiramisu::utils::logging::{init_logging, LogConfig, LogLevel};

/// One Hundred Layers Tiramisu (FC-DenseNet) for semantic segmentation
#[derive(Parser, Debug)]
#[command(name = "tiramisu")]
#[command(version)]
#[command(about = "FC-DenseNet architecture inspection and benchmarking with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the layer table of an architecture
    Summary {
        #[command(flatten)]
        arch: ArchitectureArgs,

        /// One row per block instead of per layer
        #[arg(long, default_value = "false")]
        per_stage: bool,
    },

    /// Check a configuration and print its inferred channel widths
    Validate {
        #[command(flatten)]
        arch: ArchitectureArgs,
    },

    /// Compare hand-annotated stage widths with the inferred ones
    Audit {
        #[command(flatten)]
        arch: ArchitectureArgs,

        /// Declaration JSON (required unless the blocks are FC-DenseNet103's)
        #[arg(short, long)]
        declaration: Option<PathBuf>,

        /// Exit with an error when any discrepancy is found
        #[arg(long, default_value = "false")]
        strict: bool,
    },

    /// Write the resolved configuration as JSON
    ExportConfig {
        #[command(flatten)]
        arch: ArchitectureArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a declaration template matching the architecture
    Init {
        #[command(flatten)]
        arch: ArchitectureArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Benchmark forward-pass latency
    Benchmark {
        #[command(flatten)]
        arch: ArchitectureArgs,

        /// Path to trained weights (optional - uses random weights if not specified)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Number of timed iterations
        #[arg(short, long, default_value = "20")]
        iterations: usize,

        /// Number of warmup iterations
        #[arg(long, default_value = "3")]
        warmup: usize,

        /// Batch size for inference
        #[arg(short, long, default_value = "1")]
        batch_size: usize,

        /// Output JSON file for benchmark results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    #[value(name = "56")]
    FcDenseNet56,
    #[value(name = "67")]
    FcDenseNet67,
    #[value(name = "103")]
    FcDenseNet103,
}

#[derive(Args, Debug)]
struct ArchitectureArgs {
    /// Architecture preset
    #[arg(short, long, value_enum, default_value = "103")]
    preset: Preset,

    /// Configuration JSON (overrides the preset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Square input resolution
    #[arg(long)]
    image_size: Option<usize>,

    /// Number of segmentation classes
    #[arg(long)]
    num_classes: Option<usize>,
}

impl ArchitectureArgs {
    fn resolve(&self) -> Result<TiramisuConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                TiramisuConfig::load(path)?
            }
            None => match self.preset {
                Preset::FcDenseNet56 => TiramisuConfig::fc_densenet56(),
                Preset::FcDenseNet67 => TiramisuConfig::fc_densenet67(),
                Preset::FcDenseNet103 => TiramisuConfig::fc_densenet103(),
            },
        };

        if let Some(size) = self.image_size {
            config = config.with_input_size(size, size);
        }
        if let Some(num_classes) = self.num_classes {
            config = config.with_num_classes(num_classes);
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Summary { arch, per_stage } => cmd_summary(&arch.resolve()?, per_stage),
        Commands::Validate { arch } => cmd_validate(&arch.resolve()?),
        Commands::Audit {
            arch,
            declaration,
            strict,
        } => cmd_audit(&arch.resolve()?, declaration.as_deref(), strict),
        Commands::ExportConfig { arch, output } => {
            let config = arch.resolve()?;
            config.save(&output)?;
            println!("{} Configuration written to {:?}", "✓".green().bold(), output);
            Ok(())
        }
        Commands::Init { arch, output } => cmd_init(&arch.resolve()?, &output),
        Commands::Benchmark {
            arch,
            model,
            iterations,
            warmup,
            batch_size,
            output,
        } => cmd_benchmark(
            &arch.resolve()?,
            model.as_deref(),
            iterations,
            warmup,
            batch_size,
            output,
        ),
    }
}

fn cmd_summary(config: &TiramisuConfig, per_stage: bool) -> Result<()> {
    let plan = ArchitecturePlan::build(config)?;
    let summary = ModelSummary::new(&plan)
        .with_title(format!("FC-DenseNet{}", config.depth()))
        .per_stage(per_stage);

    println!("{}", summary);
    Ok(())
}

fn cmd_validate(config: &TiramisuConfig) -> Result<()> {
    if let Err(e) = config.validate() {
        println!("{} {}", "✗".red().bold(), e);
        return Err(e.into());
    }

    let layout = ChannelLayout::infer(config)?;
    let plan = ArchitecturePlan::build(config)?;

    println!("{} Configuration is valid", "✓".green().bold());
    println!();
    println!("  Depth:           {}", config.depth());
    println!(
        "  Input:           {} (divisible by {})",
        layout.input,
        config.downsampling_factor()?
    );
    println!("  Stem:            {}", layout.stem.channels);
    println!("  Skip widths:     {:?}", layout.skip_channels());
    println!(
        "  Bottleneck:      {} stacked, {} new",
        layout.bottleneck.stacked().channels,
        layout.bottleneck.new_channels()
    );
    println!("  Up block widths: {:?}", layout.up_block_channels());
    println!("  Output:          {}", layout.output);
    println!(
        "  Parameters:      {} ({} trainable)",
        format_number(plan.total_params()),
        format_number(plan.trainable_params())
    );

    Ok(())
}

fn cmd_audit(config: &TiramisuConfig, declaration: Option<&Path>, strict: bool) -> Result<()> {
    let declaration = match declaration {
        Some(path) => Declaration::load(path)?,
        None => builtin_declaration(config)?,
    };

    let report = audit(config, &declaration)?;

    if report.is_consistent() {
        println!("{} {}", "✓".green().bold(), report);
        return Ok(());
    }

    println!(
        "{} {} stages checked, {} discrepancies",
        "⚠".yellow().bold(),
        report.stages_checked,
        report.findings.len()
    );
    for finding in &report.findings {
        println!("  {} {}", "-".yellow(), finding);
    }

    if strict {
        anyhow::bail!("declaration disagrees with the inferred architecture");
    }
    Ok(())
}

fn cmd_init(config: &TiramisuConfig, output: &Path) -> Result<()> {
    let plan = ArchitecturePlan::build(config)?;
    let declaration = Declaration::from_plan(&plan);
    declaration.save(output)?;

    println!(
        "{} Declaration with {} stages written to {:?}",
        "✓".green().bold(),
        declaration.stages.len(),
        output
    );
    Ok(())
}

fn cmd_benchmark(
    config: &TiramisuConfig,
    model: Option<&Path>,
    iterations: usize,
    warmup: usize,
    batch_size: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    use tiramisu::backend::{backend_name, default_device, DefaultBackend};
    use tiramisu::inference::{run_benchmark, BenchmarkConfig};

    println!("{}", "Initializing Benchmark...".green().bold());
    println!("  Backend: {}", backend_name());
    println!("  Batch size: {}", batch_size);
    println!(
        "  Image size: {}x{}",
        config.input_height, config.input_width
    );
    println!();

    let bench = BenchmarkConfig {
        warmup_iterations: warmup,
        iterations,
        batch_size,
        verbose: false,
        output_path: output,
    };

    let device = default_device();
    let result = run_benchmark::<DefaultBackend>(config, bench, model, &device)?;

    println!("{}", result);
    Ok(())
}
