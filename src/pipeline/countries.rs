use std::path::Path;

use crate::error::AppError;

/// One country per line. Blank lines and `#` comments are skipped; order and duplicates are kept.
pub fn parse_countries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[tracing::instrument(name = "pipeline_stage read_countries", fields(countries.count))]
pub async fn read_countries(path: &Path) -> Result<Vec<String>, AppError> {
    tracing::info!(path = %path.display(), "Reading country list");

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AppError::Input {
            path: path.to_path_buf(),
            source,
        })?;

    let countries = parse_countries(&text);
    tracing::Span::current().record("countries.count", countries.len());

    if countries.is_empty() {
        tracing::warn!(path = %path.display(), "Country list is empty");
    } else {
        tracing::info!(count = countries.len(), "Found countries to process");
    }

    Ok(countries)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let text = "# West Africa\nChad\n\n   \nAlbania\n  # disabled: Peru\nFiji\n";
        assert_eq!(parse_countries(text), vec!["Chad", "Albania", "Fiji"]);
    }

    #[test]
    fn test_parse_trims_and_keeps_duplicates() {
        let text = "  Chad  \r\nChad\n";
        assert_eq!(parse_countries(text), vec!["Chad", "Chad"]);
    }

    #[test]
    fn test_parse_keeps_inner_hash() {
        assert_eq!(parse_countries("Côte d'Ivoire #1\n"), vec!["Côte d'Ivoire #1"]);
    }

    #[tokio::test]
    async fn test_read_countries_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Chad\n\nAlbania").unwrap();

        let countries = tokio_test::assert_ok!(read_countries(file.path()).await);
        assert_eq!(countries, vec!["Chad", "Albania"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_countries(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Input { .. }));
    }
}
