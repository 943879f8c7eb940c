use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

mod config;
mod error;
mod llm;
mod pipeline;
mod telemetry;

use config::Config;
use error::AppResult;
use pipeline::{FailurePolicy, PacingPolicy, ReportGenerator, RunOptions};
use telemetry::init_telemetry;

#[derive(Debug, Parser)]
#[command(name = "risk-report-bot")]
#[command(version, about = "Generate six-month country risk outlooks and a scenario summary table")]
struct Cli {
    /// Country list, one name per line; blank lines and `#` comments are skipped
    #[arg(long, env = "COUNTRIES_FILE", default_value = "List_of_Countries.txt")]
    countries: PathBuf,

    /// Markdown file to write, replacing any previous content
    #[arg(long, env = "OUTPUT_FILE", default_value = "Risk_Report.md")]
    output: PathBuf,

    /// Seconds to wait between countries
    #[arg(long, env = "PACE_SECS", default_value_t = 1.0)]
    pace_secs: f64,

    /// Handling of countries whose report could not be generated
    #[arg(long, env = "ON_FAILURE", value_enum, default_value_t = FailurePolicy::Placeholder)]
    on_failure: FailurePolicy,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            pacing: PacingPolicy {
                delay: Duration::try_from_secs_f64(self.pace_secs).unwrap_or(Duration::ZERO),
            },
            failure_policy: self.on_failure,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Loads `.env` before the CLI reads its env fallbacks; errors wait until after `--help`.
    let config = Config::from_env();
    let cli = Cli::parse();

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    let telemetry_guard = match init_telemetry(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize telemetry: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Starting risk-report-bot"
    );

    let code = match execute(&cli, &config).await {
        Ok(()) => {
            tracing::info!("Bot run complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "Run failed");
            ExitCode::from(err.exit_code() as u8)
        }
    };

    telemetry_guard.shutdown();
    code
}

async fn execute(cli: &Cli, config: &Config) -> AppResult<()> {
    let countries = pipeline::countries::read_countries(&cli.countries).await?;

    let client = Arc::new(llm::build_client(config)?);
    let generator = ReportGenerator::new(client, config.llm_model.clone(), config.sampling);

    let outcome = pipeline::run(&generator, &countries, &cli.run_options()).await;

    if outcome.failed > 0 {
        tracing::warn!(
            failed = outcome.failed,
            succeeded = outcome.succeeded,
            policy = ?cli.on_failure,
            "Some country reports could not be generated"
        );
    }

    pipeline::assemble::write_document(&cli.output, &outcome.document).await
}
