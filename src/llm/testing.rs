use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{GenerateRequest, GenerateResponse, Provider, SamplingConfig};

/// Provider that replays a fixed script of outcomes, one per call.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicU32,
    last_model: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<&str, &str>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicU32::new(0),
            last_model: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Script built from owned report bodies, all succeeding.
    pub fn replying(bodies: Vec<String>) -> Self {
        let provider = Self::new(vec![]);
        provider
            .script
            .lock()
            .unwrap()
            .extend(bodies.into_iter().map(Ok));
        provider
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock().unwrap() = Some(req.model.clone());
        self.prompts.lock().unwrap().push(req.prompt.clone());

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()));

        match next {
            Ok(content) => Ok(GenerateResponse {
                content,
                model: req.model.clone(),
                input_tokens: 10,
                output_tokens: 20,
                finish_reason: "stop".to_string(),
                provider: String::new(),
            }),
            Err(msg) => Err(anyhow::anyhow!("{msg}")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Provider whose calls never complete.
pub struct StalledProvider;

#[async_trait::async_trait]
impl Provider for StalledProvider {
    async fn generate(&self, _req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

pub fn sample_request() -> GenerateRequest {
    GenerateRequest {
        model: "gemini-2.5-pro".to_string(),
        prompt: "Assess Chad".to_string(),
        sampling: SamplingConfig {
            temperature: 0.2,
            top_p: 1.0,
            top_k: 1,
            max_tokens: 8192,
        },
        stage: "country_report".to_string(),
    }
}
