use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::AppError;

use super::generate::CountryReport;

pub const DOCUMENT_TITLE: &str = "# Global Risk Analysis Report";
pub const REPORT_SEPARATOR: &str = "\n\n---\n\n";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Title, timestamp, summary table, then every report in generation order.
pub fn assemble(timestamp: &str, table: &str, reports: &[CountryReport]) -> String {
    let combined = reports
        .iter()
        .map(|r| r.body.as_str())
        .collect::<Vec<_>>()
        .join(REPORT_SEPARATOR);

    format!(
        "{DOCUMENT_TITLE}\n\n\
         **Generated on:** {timestamp}\n\n\
         ## Summary Table\n\n{table}\n\n\
         ---\n\n\
         # Individual Country Reports\n\n{combined}"
    )
}

/// Replaces whatever is at `path` with `document`.
#[tracing::instrument(name = "pipeline_stage write", skip(document), fields(bytes = document.len()))]
pub async fn write_document(path: &Path, document: &str) -> Result<(), AppError> {
    tokio::fs::write(path, document)
        .await
        .map_err(|source| AppError::Output {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::info!(path = %path.display(), "Final report saved");
    Ok(())
}
