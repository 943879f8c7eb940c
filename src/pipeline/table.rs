use super::aggregate::ScenarioRecord;

pub const HEADER: &str = "| Country | Scenario Name | Probability | People Affected |";
pub const SEPARATOR: &str = "|---|---|---|---|";

/// Makes a model-supplied value safe for a single table cell: pipes are
/// escaped and line breaks collapse to one space.
pub fn escape_cell(value: &str) -> String {
    let single_line = value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    single_line.replace('|', "\\|")
}

fn cell(value: &Option<String>) -> String {
    value.as_deref().map(escape_cell).unwrap_or_default()
}

pub fn render(records: &[ScenarioRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push(HEADER.to_string());
    lines.push(SEPARATOR.to_string());
    lines.extend(records.iter().map(|r| {
        format!(
            "| {} | {} | {} | {} |",
            cell(&r.country),
            cell(&r.name),
            cell(&r.probability),
            cell(&r.affected)
        )
    }));
    lines.join("\n")
}
