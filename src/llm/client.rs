use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{GenerateRequest, GenerateResponse, Provider};
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_FALLBACK_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RETRY_COUNT,
    GEN_AI_TOKEN_USAGE,
};

/// Exponential backoff between attempts against a single provider.
/// Each attempt is abandoned after `attempt_timeout` and counts as a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub jitter: bool,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            multiplier: 2,
            max_delay: Duration::from_secs(120),
            jitter: true,
            attempt_timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
            jitter: false,
            attempt_timeout: Duration::from_secs(300),
        }
    }

    /// Delay before the retry that follows the zero-based `attempt`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(self.multiplier.saturating_pow(attempt))
            .min(self.max_delay)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        // up to 25% jitter
        let jitter_ms = fastrand::u64(0..=base.as_millis() as u64 / 4);
        base + Duration::from_millis(jitter_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    Timeout,
    Auth,
    InvalidRequest,
    Server,
    Network,
    Blocked,
    Unknown,
}

impl FailureKind {
    pub fn classify(err: &anyhow::Error) -> Self {
        let msg = err.to_string().to_lowercase();
        if msg.contains("rate limit") || msg.contains("429") || msg.contains("resource_exhausted")
        {
            Self::RateLimit
        } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline")
        {
            Self::Timeout
        } else if msg.contains("blocked") || msg.contains("safety") {
            Self::Blocked
        } else if msg.contains("401")
            || msg.contains("403")
            || msg.contains("auth")
            || msg.contains("api key")
            || msg.contains("permission_denied")
        {
            Self::Auth
        } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
            Self::InvalidRequest
        } else if msg.contains("500")
            || msg.contains("502")
            || msg.contains("503")
            || msg.contains("server")
            || msg.contains("unavailable")
        {
            Self::Server
        } else if msg.contains("connect")
            || msg.contains("dns")
            || msg.contains("network")
            || msg.contains("reset")
        {
            Self::Network
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Auth => "auth_error",
            Self::InvalidRequest => "invalid_request",
            Self::Server => "server_error",
            Self::Network => "network_error",
            Self::Blocked => "blocked",
            Self::Unknown => "unknown_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a generation call whose retry budget (and fallback, if any) ran out.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider} failed after {attempts} attempt(s) [{kind}]: {message}")]
pub struct GenerationFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub attempts: u32,
    pub message: String,
}

pub struct LlmClient {
    pub primary: Arc<dyn Provider>,
    pub fallback: Option<Arc<dyn Provider>>,
    pub primary_provider: String,
    pub fallback_provider: String,
    pub fallback_model: String,
    pub retry: RetryPolicy,
}

impl LlmClient {
    pub async fn generate_once(
        &self,
        provider: &dyn Provider,
        provider_name: &str,
        req: &GenerateRequest,
    ) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %format!("gen_ai.chat {}", req.model),
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            gen_ai.request.temperature = req.sampling.temperature,
            gen_ai.request.top_p = req.sampling.top_p,
            gen_ai.request.top_k = req.sampling.top_k as i64,
            gen_ai.request.max_tokens = req.sampling.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        span.add_event(
            "gen_ai.user.message",
            vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))],
        );

        let timeout = self.retry.attempt_timeout;
        let result = match tokio::time::timeout(timeout, provider.generate(req))
            .instrument(span.clone())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("request timed out after {timeout:?}")),
        };
        let duration = start.elapsed().as_secs_f64();

        let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name.to_string());
        let model_kv = KeyValue::new("gen_ai.request.model", req.model.clone());

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name.to_string();

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                for (token_type, count) in [("input", resp.input_tokens), ("output", resp.output_tokens)] {
                    GEN_AI_TOKEN_USAGE.record(
                        f64::from(count),
                        &[
                            KeyValue::new("gen_ai.token.type", token_type),
                            provider_kv.clone(),
                            model_kv.clone(),
                        ],
                    );
                }
                GEN_AI_OPERATION_DURATION.record(duration, &[provider_kv, model_kv]);

                Ok(resp)
            }
            Err(err) => {
                let kind = FailureKind::classify(&err);
                span.record("otel.status_code", "ERROR");
                span.record("error.type", kind.as_str());

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        provider_kv,
                        model_kv,
                        KeyValue::new("error.type", kind.as_str()),
                    ],
                );

                Err(err)
            }
        }
    }

    pub async fn generate_with_retry(
        &self,
        provider: &dyn Provider,
        provider_name: &str,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, GenerationFailure> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                GEN_AI_RETRY_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name.to_string()),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                    ],
                );
            }

            match self.generate_once(provider, provider_name, req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        provider = provider_name,
                        model = %req.model,
                        error = %err,
                        "LLM call failed"
                    );

                    last_err = Some(err);

                    if attempt + 1 < max_attempts {
                        let delay = self.retry.delay(attempt);
                        tracing::info!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("all retries exhausted"));
        Err(GenerationFailure {
            provider: provider_name.to_string(),
            kind: FailureKind::classify(&err),
            attempts: max_attempts,
            message: err.to_string(),
        })
    }

    pub async fn generate(
        &self,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, GenerationFailure> {
        let primary_err = match self
            .generate_with_retry(self.primary.as_ref(), &self.primary_provider, req)
            .await
        {
            Ok(resp) => return Ok(resp),
            Err(err) => err,
        };

        let Some(fallback) = self.fallback.as_ref() else {
            return Err(primary_err);
        };

        tracing::warn!(
            primary_provider = %self.primary_provider,
            fallback_provider = %self.fallback_provider,
            error = %primary_err,
            "Primary provider failed, falling back"
        );

        GEN_AI_FALLBACK_COUNT.add(1, &[]);

        let fallback_req = GenerateRequest {
            model: self.fallback_model.clone(),
            ..req.clone()
        };

        self.generate_with_retry(fallback.as_ref(), &self.fallback_provider, &fallback_req)
            .await
            .map_err(|fallback_err| GenerationFailure {
                attempts: primary_err.attempts + fallback_err.attempts,
                ..fallback_err
            })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}
