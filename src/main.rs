use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pipeline_pool::{PipelineOptions, PoolConfig, Pooling, ProgressEvent, TaskKind};
use tensorpool::config::EnvDefaults;
use tensorpool::embedder::embed_document;
use tensorpool::logger::init_tracing;
use tensorpool::markdown::to_sections;
use tensorpool::schema::write_schemas;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    name = "tensorpool",
    about = "Pooled inference runtime for document embedding",
    version = "0.1.0"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed a markdown document across a worker pool
    Run(RunArgs),

    /// Print the section split of a document
    Sections(SectionsArgs),

    /// Emit JSON Schemas for config and protocol types
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Markdown file to embed
    file: PathBuf,

    /// Pool size; defaults to TENSORPOOL_WORKERS or 10
    #[arg(long)]
    workers: Option<usize>,

    /// Model identifier; defaults to TENSORPOOL_MODEL or Supabase/gte-small
    #[arg(long)]
    model: Option<String>,

    /// Task kind (e.g. feature-extraction)
    #[arg(long, default_value = "feature-extraction")]
    task: String,

    /// Embedding width
    #[arg(long)]
    dims: Option<usize>,

    /// Pooling strategy: none, mean or cls
    #[arg(long, default_value = "mean")]
    pooling: String,

    /// Skip L2 normalization of the pooled vector
    #[arg(long)]
    no_normalize: bool,

    /// Write embeddings to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory for rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SectionsArgs {
    /// Markdown file to split
    file: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Output directory
    #[arg(long, default_value = "schemas")]
    out_dir: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Sections(args) => {
            let _guard = init_tracing(&args.log_level, None)?;
            let text = fs::read_to_string(&args.file)
                .with_context(|| format!("unable to read {}", args.file.display()))?;
            let sections = to_sections(&text);
            println!("{}", serde_json::to_string_pretty(&sections)?);
            Ok(())
        }
        Commands::Schema(args) => {
            let _guard = init_tracing(&args.log_level, None)?;
            let written = write_schemas(&args.out_dir)?;
            for path in written {
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let defaults = EnvDefaults::load();
    let log_dir = args.log_dir.clone().or(defaults.log_dir.clone());
    let _guard = init_tracing(&args.log_level, log_dir.as_deref())?;

    let task: TaskKind = args
        .task
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown task kind: {}", args.task))?;
    let pooling: Pooling = args
        .pooling
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown pooling strategy: {}", args.pooling))?;

    let mut options = PipelineOptions {
        pooling,
        normalize: !args.no_normalize,
        ..PipelineOptions::default()
    };
    if let Some(dims) = args.dims {
        options.dims = dims;
    }

    let model = args.model.unwrap_or(defaults.model);
    let workers = args.workers.unwrap_or(defaults.workers);
    let config = PoolConfig::new(task, model).with_options(options);

    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("unable to read {}", args.file.display()))?;

    let (progress_tx, mut progress_rx) = unbounded_channel::<ProgressEvent>();
    let reporter = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            match event {
                ProgressEvent::Load { worker, progress } => {
                    debug!(%worker, status = %progress.status, file = ?progress.file, "loading");
                }
                ProgressEvent::Item { completed, total } => {
                    info!(
                        completed,
                        total,
                        percent = completed * 100 / total,
                        "embedding progress"
                    );
                }
            }
        }
    });

    let embeddings = embed_document(&text, config, workers, Some(progress_tx)).await?;
    let _ = reporter.await;

    let json = serde_json::to_string_pretty(&embeddings)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("unable to write {}", path.display()))?;
            info!(embeddings = embeddings.len(), output = %path.display(), "done");
        }
        None => println!("{json}"),
    }

    Ok(())
}
