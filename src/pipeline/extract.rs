//! Scenario data blocks embedded in report Markdown.
//!
//! Grammar: `<!--` optional-whitespace `SCENARIO_DATA_BLOCK:` payload `-->`, where
//! the payload is a JSON object
//! `{"country": string, "scenarios": [{"name", "probability", "affected"}]}`.
//! The tag is case-sensitive. Blocks never overlap; each payload ends at the
//! first `-->` after its opening marker. Other HTML comments are ignored.

use serde::{Deserialize, Deserializer};

use crate::telemetry::metrics::BLOCKS_REJECTED;

const COMMENT_OPEN: &str = "<!--";
const BLOCK_TAG: &str = "SCENARIO_DATA_BLOCK:";
pub const BLOCK_CLOSE: &str = "-->";

/// Opening marker in the form the prompt asks for.
#[cfg(test)]
pub const BLOCK_OPEN: &str = "<!-- SCENARIO_DATA_BLOCK:";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioBlock {
    #[serde(default, deserialize_with = "lenient_text")]
    pub country: Option<String>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioEntry {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub probability: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub affected: Option<String>,
}

/// Accepts strings as-is and other scalars by their JSON text; `null` is absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Raw payloads between marker pairs, in document order. An opening marker
/// with no closing marker after it ends the scan and is returned as `Err`.
pub fn find_payloads(text: &str) -> Vec<Result<&str, &str>> {
    let mut payloads = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(COMMENT_OPEN) {
        let comment = &rest[start + COMMENT_OPEN.len()..];
        let Some(after) = comment.trim_start().strip_prefix(BLOCK_TAG) else {
            rest = comment;
            continue;
        };
        match after.find(BLOCK_CLOSE) {
            Some(end) => {
                payloads.push(Ok(after[..end].trim()));
                rest = &after[end + BLOCK_CLOSE.len()..];
            }
            None => {
                payloads.push(Err(after.trim()));
                break;
            }
        }
    }

    payloads
}

/// Parses every data block in `report`. Malformed blocks are logged and
/// skipped; a report without blocks yields an empty list.
pub fn extract(report: &str) -> Vec<ScenarioBlock> {
    let mut blocks = Vec::new();

    for candidate in find_payloads(report) {
        let payload = match candidate {
            Ok(payload) => payload,
            Err(partial) => {
                BLOCKS_REJECTED.add(1, &[]);
                tracing::warn!(
                    block = %preview(partial),
                    "Skipping unterminated scenario data block"
                );
                continue;
            }
        };

        match serde_json::from_str::<ScenarioBlock>(payload) {
            Ok(block) => blocks.push(block),
            Err(e) => {
                BLOCKS_REJECTED.add(1, &[]);
                tracing::warn!(
                    error = %e,
                    block = %preview(payload),
                    "Skipping malformed scenario data block"
                );
            }
        }
    }

    blocks
}

fn preview(payload: &str) -> String {
    const MAX: usize = 300;
    if payload.len() <= MAX {
        return payload.to_string();
    }
    let cut = (0..=MAX).rev().find(|&i| payload.is_char_boundary(i)).unwrap_or(0);
    format!("{}...", &payload[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(json: &str) -> String {
        format!("{BLOCK_OPEN} {json} {BLOCK_CLOSE}")
    }

    #[test]
    fn test_extract_round_trips_scenario_strings() {
        let report = format!(
            "# **Chad: Six-Month Risk Outlook**\n\n## Sources Consulted\n- a\n\n{}",
            block(
                r#"{"country": "Chad", "scenarios": [{"name": "Lake Chad flooding", "probability": "35%", "affected": "120,000 people (70,000 children)"}]}"#
            )
        );

        let blocks = extract(&report);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].country.as_deref(), Some("Chad"));
        let scenario = &blocks[0].scenarios[0];
        assert_eq!(scenario.name.as_deref(), Some("Lake Chad flooding"));
        assert_eq!(scenario.probability.as_deref(), Some("35%"));
        assert_eq!(
            scenario.affected.as_deref(),
            Some("120,000 people (70,000 children)")
        );
    }

    #[test]
    fn test_absent_block_is_empty() {
        assert!(extract("# Fiji\n\nNo data here.").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_malformed_block_skipped_others_kept() {
        let report = format!(
            "{}\n{}\n{}",
            block(r#"{"country": "Chad", "scenarios": [{"name": "Drought"}]}"#),
            block(r#"{"country": "Chad", "scenarios": [{"name": "unescaped "quote""}]}"#),
            block(r#"{"country": "Chad", "scenarios": [{"name": "Unrest"}]}"#),
        );

        let blocks = extract(&report);
        let names: Vec<_> = blocks
            .iter()
            .flat_map(|b| b.scenarios.iter())
            .filter_map(|s| s.name.as_deref())
            .collect();
        assert_eq!(names, vec!["Drought", "Unrest"]);
    }

    #[test]
    fn test_truncated_json_skipped() {
        let report = block(r#"{"country": "Chad", "scenarios": [{"name": "Dro"#);
        assert!(extract(&report).is_empty());
    }

    #[test]
    fn test_unterminated_block_skipped() {
        let report = format!(
            "{}\n{BLOCK_OPEN} {{\"country\": \"Fiji\"",
            block(r#"{"country": "Chad", "scenarios": []}"#)
        );
        let payloads = find_payloads(&report);
        assert_eq!(payloads.len(), 2);
        assert!(payloads[1].is_err());
        assert_eq!(extract(&report).len(), 1);
    }

    #[test]
    fn test_missing_fields_and_scalars() {
        let report = block(
            r#"{"country": "Fiji", "scenarios": [{"name": "Cyclone", "probability": 60, "affected": null}, {}]}"#,
        );
        let blocks = extract(&report);
        let scenarios = &blocks[0].scenarios;
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].probability.as_deref(), Some("60"));
        assert_eq!(scenarios[0].affected, None);
        assert_eq!(scenarios[1], ScenarioEntry {
            name: None,
            probability: None,
            affected: None,
        });
    }

    #[test]
    fn test_block_without_scenarios_list() {
        let blocks = extract(&block(r#"{"country": "Albania"}"#));
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].scenarios.is_empty());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(extract(&block(r#""Chad""#)).is_empty());
        assert!(extract(&block("42")).is_empty());
        assert!(extract(&block(r#"{"country": "Chad", "scenarios": ["Drought"]}"#)).is_empty());
    }

    #[test]
    fn test_multiline_payload() {
        let report = format!(
            "{BLOCK_OPEN}\n{{\n  \"country\": \"Albania\",\n  \"scenarios\": [\n    {{\"name\": \"Floods\"}}\n  ]\n}}\n{BLOCK_CLOSE}"
        );
        assert_eq!(extract(&report)[0].scenarios.len(), 1);
    }

    #[test]
    fn test_marker_whitespace_is_optional() {
        let json = r#"{"country": "Chad", "scenarios": [{"name": "Flood"}]}"#;
        for opening in [
            "<!--SCENARIO_DATA_BLOCK:",
            "<!--   SCENARIO_DATA_BLOCK:",
            "<!--\n  SCENARIO_DATA_BLOCK:",
        ] {
            let blocks = extract(&format!("{opening} {json} {BLOCK_CLOSE}"));
            assert_eq!(blocks.len(), 1, "opening {opening:?}");
            assert_eq!(blocks[0].scenarios[0].name.as_deref(), Some("Flood"));
        }
    }

    #[test]
    fn test_other_comments_ignored() {
        let report = format!(
            "<!-- editor note -->\n<!-- scenario_data_block: {{}} -->\n{}",
            block(r#"{"country": "Fiji", "scenarios": []}"#)
        );
        let payloads = find_payloads(&report);
        assert_eq!(payloads.len(), 1);
        assert_eq!(extract(&report)[0].country.as_deref(), Some("Fiji"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(400);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert!(shown.len() <= 303);
    }
}
