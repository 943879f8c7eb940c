pub const COUNTRY_PLACEHOLDER: &str = "{country}";

const COUNTRY_ANALYSIS_TEMPLATE: &str = include_str!("../../data/country-analysis-prompt.md");

/// Fills every `{country}` placeholder in the analysis template.
pub fn render_country_prompt(country: &str) -> String {
    COUNTRY_ANALYSIS_TEMPLATE.replace(COUNTRY_PLACEHOLDER, country)
}
