// crates/stagecli/src/main.rs

mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stagecore::{ExecutionEvent, InputBundle, LoggerConfig, StageDescriptor, StageEvent, Value};
use stageruntime::{ParallelismAdvisory, Pipeline, StageRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagegraph")]
#[command(about = "Stage graph pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run a pipeline
    Run {
        /// Configuration files, merged in order
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Input bundle as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Number of runs over the same built graph
        #[arg(short, long, default_value_t = 1)]
        runs: usize,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Build a pipeline without running it
    Validate {
        /// Configuration files, merged in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List available stage types
    Stages,

    /// Create a new example pipeline
    Init {
        /// Output file path
        #[arg(short, long, default_value = "pipeline.json")]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool, logger: Option<&LoggerConfig>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug".to_string()
        } else {
            logger
                .and_then(|l| l.level.clone())
                .unwrap_or_else(|| "info".to_string())
        };
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    stagenodes::register_all(&mut registry);
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            files,
            input,
            runs,
            verbose,
        } => {
            let config = config::load_config(&files)?;
            init_tracing(verbose, config.logger.as_ref());
            run_pipeline(config, input, runs).await?;
        }

        Commands::Validate { files } => {
            let config = config::load_config(&files)?;
            init_tracing(false, config.logger.as_ref());
            validate_pipeline(config).await?;
        }

        Commands::Stages => {
            list_stages();
        }

        Commands::Init { output } => {
            create_example_pipeline(output)?;
        }
    }

    Ok(())
}

fn parse_input(input: Option<String>) -> Result<Option<InputBundle>> {
    let Some(input_str) = input else {
        return Ok(None);
    };
    let json: serde_json::Value = serde_json::from_str(&input_str)?;
    let serde_json::Value::Object(obj) = json else {
        return Err(anyhow::anyhow!("Input must be a JSON object"));
    };
    Ok(Some(
        obj.into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect(),
    ))
}

async fn run_pipeline(
    config: stagecore::PipelineConfig,
    input: Option<String>,
    runs: usize,
) -> Result<()> {
    let input = parse_input(input)?;

    ParallelismAdvisory::global().set_hook(|| {
        tracing::info!("Branching topology detected; shared resources switch to thread-safe mode");
    });

    let mut pipeline = Pipeline::new(Arc::new(default_registry()), config.settings.clone());
    pipeline.build_from_config(&config).await?;

    // Subscribe to events for real-time output
    let mut events = pipeline.subscribe_events();
    let event_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event printer fell behind, {} events dropped", missed);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event {
                ExecutionEvent::RunStarted { stage_count, .. } => {
                    println!("▶️  Run started ({} stages)", stage_count);
                }
                ExecutionEvent::StageStarted {
                    stage_id,
                    stage_type,
                    ..
                } => {
                    println!("  ⚡ Starting stage: {} ({})", stage_id, stage_type);
                }
                ExecutionEvent::StageCompleted {
                    stage_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Stage {} completed in {}ms", stage_id, duration_ms);
                }
                ExecutionEvent::StageFailed {
                    stage_id, error, ..
                } => {
                    println!("  ❌ Stage {} failed: {}", stage_id, error);
                }
                ExecutionEvent::StageSkipped {
                    stage_id, reason, ..
                } => {
                    println!("  ⏭️  Stage {} skipped: {:?}", stage_id, reason);
                }
                ExecutionEvent::StageEvent {
                    stage_id, event, ..
                } => match event {
                    StageEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", stage_id, message);
                    }
                    StageEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", stage_id, message);
                    }
                    StageEvent::Progress { percent, message } => match message {
                        Some(msg) => println!("     📊 [{}] {}% - {}", stage_id, percent, msg),
                        None => println!("     📊 [{}] {}%", stage_id, percent),
                    },
                },
                ExecutionEvent::RunCompleted {
                    succeeded,
                    failed,
                    skipped,
                    duration_ms,
                    ..
                } => {
                    println!(
                        "✨ Run finished in {}ms: {} ok, {} failed, {} skipped",
                        duration_ms, succeeded, failed, skipped
                    );
                }
            }
        }
    });

    let mut any_failed = false;
    for run in 1..=runs {
        let outcome = pipeline.run(input.as_ref()).await?;
        any_failed |= !outcome.is_success();

        let snapshot = pipeline.store().serialize_all();
        println!();
        println!("📤 Data products after run {}:", run);
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    pipeline.store().clear();

    // Dropping the pipeline closes the event bus; the printer exits after
    // draining what is already queued.
    drop(pipeline);
    event_task.await?;

    if any_failed {
        return Err(anyhow::anyhow!("One or more stages failed"));
    }
    Ok(())
}

async fn validate_pipeline(config: stagecore::PipelineConfig) -> Result<()> {
    let mut pipeline = Pipeline::new(Arc::new(default_registry()), config.settings.clone());
    pipeline.build_from_config(&config).await?;

    pipeline
        .inspect(|graph| {
            println!("✅ Pipeline is valid:");
            println!("   Stages: {}", graph.len());
            println!("   Edges: {}", graph.edge_count());
            println!("   Start nodes: {}", graph.start_nodes().join(", "));
            println!("   Execution order: {}", graph.topological_order().join(" -> "));
            println!("   Branching: {}", graph.is_branching());
            let inputs = graph.input_stage_ids();
            if !inputs.is_empty() {
                println!("   Input stages: {}", inputs.join(", "));
            }
        })
        .await?;

    Ok(())
}

fn list_stages() {
    println!("📦 Available Stage Types:");
    println!();

    let registry = default_registry();
    for stage_type in registry.list_stage_types() {
        if let Some(metadata) = registry.get_metadata(&stage_type) {
            println!("  • {} ({})", stage_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", stage_type);
        }
    }
}

fn create_example_pipeline(output: PathBuf) -> Result<()> {
    let pipeline = vec![
        StageDescriptor::new("source", "input.bundle")
            .with_parameter("prefix", "input.")
            .then("left")
            .then("right"),
        StageDescriptor::new("left", "product.constant")
            .with_parameter("key", "left")
            .with_parameter("value", 1)
            .then("join"),
        StageDescriptor::new("right", "time.delay")
            .with_parameter("delay_ms", 50)
            .then("join"),
        StageDescriptor::new("join", "product.merge")
            .with_parameter("inputs", serde_json::json!(["input.name", "left"]))
            .with_parameter("output", "summary")
            .then("report"),
        StageDescriptor::new("report", "debug.log").with_parameter("message", "pipeline done"),
    ];

    let json = serde_json::json!({
        "pipeline": pipeline,
        "logger": { "level": "info" },
    });
    std::fs::write(&output, serde_json::to_string_pretty(&json)?)?;

    println!("✨ Created example pipeline: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  stagegraph run --file {} --input '{{\"name\": \"demo\"}}'",
        output.display()
    );

    Ok(())
}
