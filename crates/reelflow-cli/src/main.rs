//! CLI binary for running and validating reelflow pipelines.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use reelflow_media::{DryRunEngine, FfmpegEngine, MediaEngine};
use reelflow_pipeline::{
    PipelineConfig, PipelineDefinition, PipelineExecutor, Runtime, Severity, StepDefinition,
    StepReport, ValidationContext,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reelflow", version, about = "JSON-defined media pipelines on top of ffmpeg")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a .json file
    Run {
        /// Path to the pipeline .json file
        pipeline: PathBuf,

        #[command(flatten)]
        dirs: DirArgs,

        /// Record jobs and touch empty outputs instead of calling ffmpeg
        #[arg(long)]
        dry_run: bool,

        /// Path to the ffmpeg binary (default: looked up on PATH)
        #[arg(long)]
        ffmpeg: Option<PathBuf>,

        /// Path to the ffprobe binary (default: looked up on PATH)
        #[arg(long)]
        ffprobe: Option<PathBuf>,

        /// Seconds a step may spend resolving its inputs
        #[arg(long)]
        resolution_timeout: Option<u64>,

        /// Empty the output directory before running
        #[arg(long)]
        clear_output: bool,

        /// Print pipeline events as JSON lines
        #[arg(long)]
        events: bool,
    },

    /// Validate a pipeline .json file
    Validate {
        /// Path to the pipeline .json file
        pipeline: PathBuf,

        #[command(flatten)]
        dirs: DirArgs,
    },

    /// Show the step tree of a pipeline
    Info {
        /// Path to the pipeline .json file
        pipeline: PathBuf,
    },
}

#[derive(Args)]
struct DirArgs {
    /// JSON config file; flags given here override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory for per-step folders
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Input directory for literal inputs and @resources
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory for archived files
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl DirArgs {
    fn load_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.workspace {
            config.workspace_dir = dir.clone();
        }
        if let Some(dir) = &self.input {
            config.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            pipeline,
            dirs,
            dry_run,
            ffmpeg,
            ffprobe,
            resolution_timeout,
            clear_output,
            events,
        } => {
            let mut config = dirs.load_config()?;
            if resolution_timeout.is_some() {
                config.resolution_timeout = resolution_timeout;
            }
            if clear_output {
                config.clear_output = true;
            }
            let engine: Arc<dyn MediaEngine> = if dry_run {
                Arc::new(DryRunEngine::new())
            } else {
                match (ffmpeg, ffprobe) {
                    (None, None) => Arc::new(FfmpegEngine::from_path()?),
                    (ffmpeg, ffprobe) => Arc::new(FfmpegEngine::new(
                        ffmpeg.unwrap_or_else(|| PathBuf::from("ffmpeg")),
                        ffprobe.unwrap_or_else(|| PathBuf::from("ffprobe")),
                    )),
                }
            };
            cmd_run(&pipeline, config, engine, events).await?;
        }
        Commands::Validate { pipeline, dirs } => {
            // Literal inputs are only checked when an input directory was named.
            let check_inputs = dirs.config.is_some() || dirs.input.is_some();
            cmd_validate(&pipeline, dirs.load_config()?, check_inputs)?;
        }
        Commands::Info { pipeline } => {
            cmd_info(&pipeline)?;
        }
    }

    Ok(())
}

async fn cmd_run(
    path: &Path,
    config: PipelineConfig,
    engine: Arc<dyn MediaEngine>,
    print_events: bool,
) -> anyhow::Result<()> {
    let definition = PipelineDefinition::load(path)?;

    println!(
        "Running pipeline: {}",
        definition.name.as_deref().unwrap_or_else(|| file_stem(path))
    );
    println!("Engine: {}", engine.name());
    println!("Input: {}", config.input_dir.display());
    println!("Output: {}", config.output_dir.display());

    let executor = PipelineExecutor::new(Runtime::new(config, engine));

    let printer = print_events.then(|| {
        let mut rx = executor.runtime().events().subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "Could not serialize event"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let result = executor.run(&definition).await;
    drop(executor);
    if let Some(printer) = printer {
        // The channel closes once the runtime is dropped.
        let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    }
    let report = result?;

    println!("\nPipeline completed in {}ms (run {})", report.duration_ms(), report.run_id);
    for step in &report.steps {
        print_step_report(step, 1);
    }
    if !report.archived.is_empty() {
        println!("Archived:");
        for file in &report.archived {
            println!("  {}", file.display());
        }
    }

    Ok(())
}

fn print_step_report(step: &StepReport, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}[{}] {} {} ({} output file(s))",
        step.id,
        step.name,
        step.status,
        step.outputs.len()
    );
    if let Some(error) = &step.error {
        println!("{indent}  error: {error}");
    }
    for nested in &step.steps {
        print_step_report(nested, depth + 1);
    }
}

fn cmd_validate(path: &Path, config: PipelineConfig, check_inputs: bool) -> anyhow::Result<()> {
    let definition = PipelineDefinition::load(path)?;
    let runtime = Runtime::new(config, Arc::new(DryRunEngine::new()));
    let ctx = if check_inputs {
        ValidationContext::for_runtime(&runtime)
    } else {
        ValidationContext::new(runtime.registry(), runtime.selectors())
    };
    let diagnostics = reelflow_pipeline::validate(&definition, &ctx);

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let definition = PipelineDefinition::load(path)?;

    println!(
        "Pipeline: {}",
        definition.name.as_deref().unwrap_or_else(|| file_stem(path))
    );
    println!("Steps: {}", definition.step_count());
    println!();
    for step in &definition.steps {
        print_definition(step, 1);
    }

    Ok(())
}

fn print_definition(step: &StepDefinition, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}[{}] {} {}", step.id, step.kind, step.name);
    if !step.raw_inputs.is_empty() {
        println!("{indent}  input: {}", step.raw_inputs.join(", "));
    }
    if let Some(archive) = &step.archive {
        let target = archive.target.as_deref().unwrap_or("output directory");
        println!("{indent}  archive: {target} ({})", archive.filter.as_str());
    }
    for nested in &step.steps {
        print_definition(nested, depth + 1);
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("pipeline")
}
