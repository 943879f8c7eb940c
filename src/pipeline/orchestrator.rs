use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;

use crate::telemetry::metrics::{COUNTRIES_PROCESSED, RUN_DURATION};

use super::aggregate::{ScenarioRecord, aggregate};
use super::assemble::{assemble, format_timestamp};
use super::generate::{CountryReport, ReportGenerator};
use super::table::render;

/// What to do with a country whose report could not be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Keep an error placeholder report in the document.
    #[default]
    Placeholder,
    /// Drop the country from the document and the summary table.
    Omit,
}

/// Flat delay between countries to stay under backend rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub delay: Duration,
}

impl PacingPolicy {
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub pacing: PacingPolicy,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub document: String,
    pub reports: Vec<CountryReport>,
    pub records: Vec<ScenarioRecord>,
    pub succeeded: usize,
    pub failed: usize,
}

#[tracing::instrument(
    name = "pipeline run",
    skip_all,
    fields(
        run.countries = countries.len(),
        run.succeeded,
        run.failed,
        run.duration_ms,
    )
)]
pub async fn run(
    generator: &ReportGenerator,
    countries: &[String],
    options: &RunOptions,
) -> RunOutcome {
    let start = Instant::now();
    let total = countries.len();
    let mut reports = Vec::with_capacity(total);
    let mut failed = 0;

    for (i, country) in countries.iter().enumerate() {
        match generator.generate(country).await {
            Ok(report) => {
                COUNTRIES_PROCESSED.add(1, &[KeyValue::new("outcome", "generated")]);
                tracing::debug!(country = %report.country, chars = report.body.len(), "Report collected");
                reports.push(report);
            }
            Err(failure) => {
                failed += 1;
                COUNTRIES_PROCESSED.add(
                    1,
                    &[
                        KeyValue::new("outcome", "failed"),
                        KeyValue::new("error.type", failure.kind.as_str()),
                    ],
                );
                match options.failure_policy {
                    FailurePolicy::Placeholder => reports.push(CountryReport::placeholder(country)),
                    FailurePolicy::Omit => {
                        tracing::warn!(country = %country, "Omitting country from the report")
                    }
                }
            }
        }

        tracing::info!("Completed {} ({}/{})", country, i + 1, total);

        if i + 1 < total {
            options.pacing.wait().await;
        }
    }

    tracing::info!("All country reports have been generated");

    let records = aggregate(&reports);
    let table = render(&records);
    let document = assemble(&format_timestamp(Utc::now()), &table, &reports);

    let succeeded = total - failed;
    let duration = start.elapsed();
    RUN_DURATION.record(duration.as_secs_f64(), &[]);

    let span = tracing::Span::current();
    span.record("run.succeeded", succeeded);
    span.record("run.failed", failed);
    span.record("run.duration_ms", duration.as_millis() as u64);

    RunOutcome {
        document,
        reports,
        records,
        succeeded,
        failed,
    }
}
