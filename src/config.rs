use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::llm::{RetryPolicy, SamplingConfig};

const MIN_ATTEMPTS: u32 = 3;
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub llm_provider: String,
    pub llm_model: String,
    pub fallback_provider: String,
    pub fallback_model: String,
    pub ollama_base_url: String,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
    pub sampling: SamplingConfig,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_var(&lookup, "RETRY_MAX_ATTEMPTS", defaults.max_attempts)?
                .clamp(MIN_ATTEMPTS, MAX_ATTEMPTS),
            initial_delay: Duration::from_secs(parse_var(
                &lookup,
                "RETRY_INITIAL_DELAY_SECS",
                defaults.initial_delay.as_secs(),
            )?),
            multiplier: parse_var(&lookup, "RETRY_MULTIPLIER", defaults.multiplier)?.max(1),
            max_delay: Duration::from_secs(parse_var(
                &lookup,
                "RETRY_MAX_DELAY_SECS",
                defaults.max_delay.as_secs(),
            )?),
            jitter: defaults.jitter,
            attempt_timeout: Duration::from_secs(
                parse_var(
                    &lookup,
                    "LLM_TIMEOUT_SECS",
                    defaults.attempt_timeout.as_secs(),
                )?
                .max(1),
            ),
        };

        let sampling = SamplingConfig {
            temperature: parse_var(&lookup, "GENERATION_TEMPERATURE", 0.2)?,
            top_p: parse_var(&lookup, "GENERATION_TOP_P", 1.0)?,
            top_k: parse_var(&lookup, "GENERATION_TOP_K", 1)?,
            max_tokens: parse_var(&lookup, "GENERATION_MAX_TOKENS", 8192)?,
        };

        let config = Self {
            environment: var("APP_ENVIRONMENT", "development"),
            llm_provider: var("LLM_PROVIDER", "google").to_lowercase(),
            llm_model: var("LLM_MODEL", "gemini-2.5-pro"),
            fallback_provider: var("FALLBACK_PROVIDER", "none").to_lowercase(),
            fallback_model: var("FALLBACK_MODEL", "gpt-4.1"),
            ollama_base_url: var("OLLAMA_BASE_URL", "http://localhost:11434"),
            gemini_api_key: secret("GEMINI_API_KEY"),
            openai_api_key: secret("OPENAI_API_KEY"),
            otel_service_name: var("OTEL_SERVICE_NAME", "risk-report-bot"),
            otel_exporter_endpoint: secret("OTEL_EXPORTER_OTLP_ENDPOINT"),
            sampling,
            retry,
        };

        config.require_credentials(&config.llm_provider)?;
        if config.has_fallback() {
            config.require_credentials(&config.fallback_provider)?;
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn has_fallback(&self) -> bool {
        !matches!(self.fallback_provider.as_str(), "" | "none")
    }

    fn require_credentials(&self, provider: &str) -> Result<(), AppError> {
        match provider {
            "google" if self.gemini_api_key.is_none() => Err(AppError::Config(
                "GEMINI_API_KEY must be set for the google provider".into(),
            )),
            "openai" if self.openai_api_key.is_none() => Err(AppError::Config(
                "OPENAI_API_KEY must be set for the openai provider".into(),
            )),
            "google" | "openai" | "ollama" => Ok(()),
            other => Err(AppError::Config(format!("unknown LLM provider: {other}"))),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}
