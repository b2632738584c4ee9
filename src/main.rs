use anyhow::{Context, Result};
use clap::Parser;
use docsum::{
    config::{self, SizeUnit},
    logging,
    processing::{Chunker, PipelineError, QuerySettings, SummaryPipeline},
    summarization::GroqClient,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "docsum",
    version,
    about = "Summarize a document of any size with a rate-limited remote model"
)]
struct Cli {
    /// Document to summarize (plain text, HTML, or PDF).
    file: PathBuf,
    /// Maximum chunk size, in `--size-unit`.
    #[arg(long)]
    max_chunk_size: Option<usize>,
    /// Unit chunk sizes are measured in: characters, words, or tokens.
    #[arg(long)]
    size_unit: Option<SizeUnit>,
    /// Total submissions of the same text before giving up.
    #[arg(long)]
    retry_limit: Option<u32>,
    /// Initial backoff between retries, in seconds.
    #[arg(long)]
    retry_delay: Option<u64>,
    /// Model identifier passed to the summarizer.
    #[arg(long)]
    model: Option<String>,
    /// Print run counters as JSON on stderr when done.
    #[arg(long)]
    stats: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing();

    match run(cli).await {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let mut config = config::load_config().context("failed to load configuration")?;
    if let Some(size) = cli.max_chunk_size {
        config.max_chunk_size = size;
    }
    if let Some(unit) = cli.size_unit {
        config.size_unit = unit;
    }
    if let Some(limit) = cli.retry_limit {
        config.retry_limit = limit;
    }
    if let Some(secs) = cli.retry_delay {
        config.retry_delay = Duration::from_secs(secs);
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    config.validate().context("invalid command-line override")?;

    let client = GroqClient::from_config(&config).context("failed to build Groq client")?;
    let chunker = Chunker::new(config.size_unit).context("failed to build chunker")?;
    let pipeline = SummaryPipeline::new(
        Box::new(client),
        chunker,
        QuerySettings::from_config(&config),
    );

    let outcome = pipeline.summarize_file(&cli.file).await;
    let stats = pipeline.metrics_snapshot();
    tracing::info!(
        remote_calls = stats.remote_calls,
        retries = stats.retries,
        rate_limit_waits = stats.rate_limit_waits,
        subdivisions = stats.subdivisions,
        chunks = stats.chunks,
        "Run finished"
    );
    if cli.stats {
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }

    let summary = outcome
        .with_context(|| format!("failed to summarize {}", cli.file.display()))?;
    Ok(summary)
}
