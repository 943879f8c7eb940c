pub mod client;
pub mod gemini;
pub mod openai;
#[cfg(test)]
pub mod testing;

use std::sync::Arc;

pub use client::{GenerationFailure, LlmClient, RetryPolicy};

use crate::config::Config;
use crate::error::AppError;

/// Sampling parameters sent with every generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub sampling: SamplingConfig,
    pub stage: String,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
    pub provider: String,
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
    fn name(&self) -> &str;
}

pub fn build_provider(name: &str, config: &Config) -> Result<Arc<dyn Provider>, AppError> {
    let missing = |key: &str| AppError::Config(format!("{key} must be set for the {name} provider"));

    let provider: Arc<dyn Provider> = match name {
        "google" => Arc::new(gemini::GeminiProvider::new(
            config
                .gemini_api_key
                .as_deref()
                .ok_or_else(|| missing("GEMINI_API_KEY"))?,
        )),
        "openai" => Arc::new(openai::OpenAIProvider::new(
            config
                .openai_api_key
                .as_deref()
                .ok_or_else(|| missing("OPENAI_API_KEY"))?,
        )),
        "ollama" => Arc::new(openai::OpenAIProvider::new_ollama(&config.ollama_base_url)),
        other => return Err(AppError::Config(format!("unknown LLM provider: {other}"))),
    };

    Ok(provider)
}

/// Builds the primary provider and, when configured, the fallback.
pub fn build_client(config: &Config) -> Result<LlmClient, AppError> {
    let primary = build_provider(&config.llm_provider, config)?;
    let fallback = if config.has_fallback() {
        Some(build_provider(&config.fallback_provider, config)?)
    } else {
        None
    };

    tracing::info!(
        primary_provider = primary.name(),
        model = %config.llm_model,
        fallback_provider = %config.fallback_provider,
        "LLM client initialized"
    );

    Ok(LlmClient {
        primary,
        fallback,
        primary_provider: config.llm_provider.clone(),
        fallback_provider: config.fallback_provider.clone(),
        fallback_model: config.fallback_model.clone(),
        retry: config.retry.clone(),
    })
}
