use std::sync::Arc;

use crate::llm::{GenerateRequest, GenerationFailure, LlmClient, SamplingConfig};

use super::prompt::render_country_prompt;

const FENCE: &str = "```";

/// Cleaned model output for one country, or the placeholder written in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryReport {
    pub country: String,
    pub body: String,
    pub generated: bool,
}

impl CountryReport {
    /// Stand-in body for a country whose generation failed outright.
    pub fn placeholder(country: &str) -> Self {
        Self {
            country: country.to_string(),
            body: format!(
                "# **{country}: Six-Month Risk Outlook**\n\n## ERROR\n\n\
                 An error occurred while generating the report for this country. \
                 Please review the logs."
            ),
            generated: false,
        }
    }
}

pub struct ReportGenerator {
    client: Arc<LlmClient>,
    model: String,
    sampling: SamplingConfig,
}

impl ReportGenerator {
    pub fn new(client: Arc<LlmClient>, model: impl Into<String>, sampling: SamplingConfig) -> Self {
        Self {
            client,
            model: model.into(),
            sampling,
        }
    }

    #[tracing::instrument(
        name = "pipeline_stage generate",
        skip(self),
        fields(
            pipeline.stage = "generate",
            report.chars,
            gen_ai.provider.name,
        )
    )]
    pub async fn generate(&self, country: &str) -> Result<CountryReport, GenerationFailure> {
        tracing::info!(country, "Generating report");

        let resp = self
            .client
            .generate(&GenerateRequest {
                model: self.model.clone(),
                prompt: render_country_prompt(country),
                sampling: self.sampling,
                stage: "country_report".to_string(),
            })
            .await
            .inspect_err(|failure| {
                tracing::error!(country, error = %failure, "Report generation failed");
            })?;

        let body = clean_response(&resp.content);

        let span = tracing::Span::current();
        span.record("report.chars", body.len());
        span.record("gen_ai.provider.name", resp.provider.as_str());

        tracing::info!(
            country,
            provider = %resp.provider,
            output_tokens = resp.output_tokens,
            "Report generated"
        );

        Ok(CountryReport {
            country: country.to_string(),
            body,
            generated: true,
        })
    }
}

/// Trims the text and removes a wrapping code fence: an opening fence line
/// (with optional language tag) at the very start and a closing fence at the
/// very end. Fences elsewhere in the body are left alone.
pub fn clean_response(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        let (first_line, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
        let is_tag = first_line
            .trim()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if is_tag {
            text = remainder;
        }
    }

    if let Some(rest) = text.trim_end().strip_suffix(FENCE) {
        text = rest;
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::RetryPolicy;
    use crate::llm::testing::ScriptedProvider;

    fn generator(provider: Arc<ScriptedProvider>) -> ReportGenerator {
        let client = LlmClient {
            primary: provider,
            fallback: None,
            primary_provider: "google".to_string(),
            fallback_provider: "none".to_string(),
            fallback_model: String::new(),
            retry: RetryPolicy::immediate(3),
        };
        ReportGenerator::new(
            Arc::new(client),
            "gemini-2.5-pro",
            SamplingConfig {
                temperature: 0.2,
                top_p: 1.0,
                top_k: 1,
                max_tokens: 8192,
            },
        )
    }

    #[test]
    fn test_clean_strips_wrapping_fence() {
        let raw = "  ```markdown\n# **Chad: Six-Month Risk Outlook**\n\nBody\n```  \n";
        assert_eq!(clean_response(raw), "# **Chad: Six-Month Risk Outlook**\n\nBody");
    }

    #[test]
    fn test_clean_keeps_inner_fences() {
        let raw = "```markdown\n# Title\n\n```json\n{\"a\": 1}\n```\n\nClosing words\n```";
        let cleaned = clean_response(raw);
        assert!(!cleaned.starts_with(FENCE));
        assert!(!cleaned.ends_with(FENCE));
        assert!(cleaned.contains("```json\n{\"a\": 1}\n```"));
        assert!(cleaned.ends_with("Closing words"));
    }

    #[test]
    fn test_clean_plain_text_untouched() {
        assert_eq!(clean_response("\n# Title\nBody\n"), "# Title\nBody");
    }

    #[test]
    fn test_clean_bare_fence_without_tag() {
        assert_eq!(clean_response("```\n# Title\n```"), "# Title");
    }

    #[test]
    fn test_clean_does_not_eat_inline_code_at_start() {
        let raw = "```rm -rf``` is dangerous";
        assert_eq!(clean_response(raw), raw);
    }

    #[test]
    fn test_placeholder_names_country() {
        let report = CountryReport::placeholder("Fiji");
        assert!(!report.generated);
        assert!(report.body.starts_with("# **Fiji: Six-Month Risk Outlook**"));
        assert!(report.body.contains("## ERROR"));
    }

    #[tokio::test]
    async fn test_generate_renders_prompt_and_cleans() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("```markdown\n# Chad\n```")]));
        let report = tokio_test::assert_ok!(generator(provider.clone()).generate("Chad").await);

        assert_eq!(report.country, "Chad");
        assert_eq!(report.body, "# Chad");
        assert!(report.generated);
        assert!(provider.prompts()[0].contains("### Country\nChad\n"));
    }

    #[tokio::test]
    async fn test_retried_report_matches_immediate_success() {
        let body = "```markdown\n# Chad\n\nText\n```";
        let flaky = Arc::new(ScriptedProvider::new(vec![Err("500"), Err("timeout"), Ok(body)]));
        let steady = Arc::new(ScriptedProvider::new(vec![Ok(body)]));

        let retried = tokio_test::assert_ok!(generator(flaky).generate("Chad").await);
        let immediate = tokio_test::assert_ok!(generator(steady).generate("Chad").await);
        assert_eq!(retried, immediate);
    }

    #[tokio::test]
    async fn test_generate_surfaces_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err("500"), Err("500"), Err("500")]));
        let failure = tokio_test::assert_err!(generator(provider).generate("Chad").await);
        assert_eq!(failure.attempts, 3);
    }
}
