use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_aggregator::{
    config::{Config, defaults::DEFAULT_CONFIG_FILE},
    engine::{AggregationEngine, describe_primaries},
    errors::AppError,
    input,
    output::{self, OutputFormat},
};

#[derive(Parser)]
#[command(name = "m3u-aggregator")]
#[command(version)]
#[command(about = "Merge IPTV channel listings, probe their streams and write ranked failover playlists")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Raw entries as a JSON array or JSON lines ("-" for stdin)
    #[arg(short, long, value_name = "FILE", required_unless_present = "print_default_config")]
    entries: Option<PathBuf>,

    /// Score snapshot from the previous run
    #[arg(long, value_name = "FILE")]
    prior_scores: Option<PathBuf>,

    /// Where to write the updated score snapshot (defaults to --prior-scores)
    #[arg(long, value_name = "FILE")]
    scores_out: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format: json, m3u or txt
    #[arg(short, long, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Also write the run report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,
}

fn init_logging(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("m3u_aggregator={level}").into());

    let plain = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let structured = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    if cli.print_default_config {
        print!("{}", Config::default().to_toml_string()?);
        return Ok(());
    }

    info!("Starting m3u-aggregator v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_from_file(&cli.config)?;
    let entries_path = cli.entries.as_deref().context("--entries is required")?;
    let entries = input::read_entries(entries_path)
        .await
        .with_context(|| format!("failed to read entries from {}", entries_path.display()))?;

    let prior = match &cli.prior_scores {
        Some(path) => input::read_snapshot(path)
            .await
            .with_context(|| format!("failed to read score snapshot {}", path.display()))?,
        None => None,
    };

    let engine = AggregationEngine::new(config)?;
    let (outcome, exhausted) = match engine.run(entries, prior.as_ref()).await {
        Ok(outcome) => (outcome, None),
        Err(AppError::DeadlineExhausted { pending, partial }) => (*partial, Some(pending)),
        Err(e) => return Err(e.into()),
    };

    for line in describe_primaries(&outcome) {
        debug!("{}", line);
    }

    let document = output::render(&outcome, cli.format)?;
    match &cli.output {
        Some(path) => {
            tokio::fs::write(path, &document)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                "Wrote {} output with {} channels to {}",
                cli.format,
                output::renderable_channels(&outcome.playlist),
                path.display()
            );
        }
        None => print!("{document}"),
    }

    if let Some(path) = cli.scores_out.as_ref().or(cli.prior_scores.as_ref()) {
        input::write_snapshot(path, &outcome.updated_scores)
            .await
            .with_context(|| format!("failed to write score snapshot {}", path.display()))?;
    }

    if let Some(path) = &cli.report {
        tokio::fs::write(path, serde_json::to_string_pretty(&outcome.report)?)
            .await
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    if let Some(pending) = exhausted {
        warn!("Partial output written; no probe completed before the run deadline");
        anyhow::bail!("run deadline exhausted before any probe completed ({pending} URLs pending)");
    }

    Ok(())
}
