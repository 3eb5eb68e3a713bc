mod config;
mod logging;
mod statsd;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Serves pre-aggregated customer summaries from BigQuery")]
enum CliCommand {
    /// Run the customer summary service
    Serve {
        /// Path to the YAML config file
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Metrics(#[from] statsd::MetricsError),
    #[error("could not start runtime: {0}")]
    Runtime(std::io::Error),
    #[error(transparent)]
    Summary(#[from] summary::SummaryError),
}

fn main() -> Result<(), CliError> {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Serve { config } => serve(&config),
    }
}

fn serve(path: &std::path::Path) -> Result<(), CliError> {
    let config = config::Config::from_file(path)?;

    // Held until exit so buffered Sentry events are flushed.
    let _sentry = logging::init(&config.common.logging);

    if let Some(metrics_config) = &config.common.metrics {
        statsd::init(metrics_config)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    tracing::info!(config = %path.display(), "starting customer summary service");
    rt.block_on(summary::run(config.customer_summary))
        .inspect_err(|e| tracing::error!(error = %e, "customer summary service stopped"))?;

    Ok(())
}
