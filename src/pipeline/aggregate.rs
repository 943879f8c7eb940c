use crate::telemetry::metrics::SCENARIOS_EXTRACTED;

use super::extract::extract;
use super::generate::CountryReport;

pub const NOT_AVAILABLE: &str = "N/A";
pub const NO_DATA_MESSAGE: &str = "No scenario data found";

/// One summary-table row. Missing fields render as blank cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScenarioRecord {
    pub country: Option<String>,
    pub name: Option<String>,
    pub probability: Option<String>,
    pub affected: Option<String>,
}

impl ScenarioRecord {
    /// Row standing in for an empty table.
    pub fn no_data() -> Self {
        Self {
            country: Some(NOT_AVAILABLE.to_string()),
            name: Some(NO_DATA_MESSAGE.to_string()),
            probability: Some(NOT_AVAILABLE.to_string()),
            affected: Some(NOT_AVAILABLE.to_string()),
        }
    }

    fn country_key(&self) -> &str {
        self.country.as_deref().unwrap_or("")
    }
}

/// Every scenario from every parsed block, in encounter order, then stably
/// sorted by country name.
pub fn collect_records(reports: &[CountryReport]) -> Vec<ScenarioRecord> {
    let mut records: Vec<ScenarioRecord> = reports
        .iter()
        .flat_map(|report| extract(&report.body))
        .flat_map(|block| {
            let country = block.country;
            block
                .scenarios
                .into_iter()
                .map(move |scenario| ScenarioRecord {
                    country: country.clone(),
                    name: scenario.name,
                    probability: scenario.probability,
                    affected: scenario.affected,
                })
        })
        .collect();

    records.sort_by(|a, b| a.country_key().cmp(b.country_key()));
    records
}

#[tracing::instrument(
    name = "pipeline_stage aggregate",
    skip(reports),
    fields(pipeline.stage = "aggregate", reports.count = reports.len(), scenarios.count)
)]
pub fn aggregate(reports: &[CountryReport]) -> Vec<ScenarioRecord> {
    let records = collect_records(reports);

    tracing::Span::current().record("scenarios.count", records.len());
    SCENARIOS_EXTRACTED.add(records.len() as u64, &[]);

    if records.is_empty() {
        tracing::warn!("No scenario data blocks found in any report");
        return vec![ScenarioRecord::no_data()];
    }

    tracing::info!(scenarios = records.len(), "Scenario data aggregated");
    records
}
