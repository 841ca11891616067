use crate::insight::clean;
use crate::prompt::build_review_prompt;
use async_trait::async_trait;
use routelens_core::{AIInsight, AnalysisPayload, ModelConfig, Result, RouteLensError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const BACKOFF_BASE_MS: u64 = 500;

/// Seam for the one outbound network call in the pipeline. One request per
/// payload; the response is free text expected to contain one JSON object.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;
}

/// Chat-completions client for an OpenAI-compatible service.
pub struct OpenAiCompatClient {
    config: ModelConfig,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Fails fast when no API key is configured: retrying cannot fix a
    /// missing credential, so this is surfaced before any network attempt.
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RouteLensError::Configuration(
                "model API key is not set (ROUTELENS__MODEL__API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RouteLensError::Configuration(format!("building HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Returns a new client targeting a different model identifier. The
    /// original configuration is untouched, so concurrent runs cannot
    /// contaminate each other through shared mutable state.
    pub fn with_model(&self, model: &str) -> Self {
        let mut config = self.config.clone();
        config.model = model.to_string();
        Self {
            config,
            client: self.client.clone(),
        }
    }

    async fn try_request(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
            top_p: self.config.top_p,
            top_k: self.config.top_k,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RouteLensError::ModelTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RouteLensError::ModelTransport(format!(
                "model API error ({}): {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RouteLensError::ModelTransport(format!("decoding response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                RouteLensError::ModelTransport("model response contained no choices".to_string())
            })
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.try_request(prompt).await
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Raw model text plus the recovered insight for one payload.
#[derive(Debug, Clone)]
pub struct ModelReview {
    pub raw: String,
    pub insight: AIInsight,
}

/// Runs one payload through the model under the bounded retry policy and
/// recovers the structured insight. An unparsable reply is NOT retried: that
/// is a response-recovery problem handled by the adapter, not a transport
/// failure.
pub async fn analyze(
    client: &dyn ModelClient,
    payload: &AnalysisPayload,
    max_attempts: u32,
) -> Result<ModelReview> {
    let prompt = build_review_prompt(payload);
    let raw = generate_with_retry(client, &prompt, max_attempts).await?;
    let insight = clean(&raw);
    Ok(ModelReview { raw, insight })
}

async fn generate_with_retry(
    client: &dyn ModelClient,
    prompt: &str,
    max_attempts: u32,
) -> Result<String> {
    let attempts = max_attempts.max(1);
    let mut last_error: Option<RouteLensError> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            // Monotonically non-decreasing backoff: 500ms, 1s, 2s, ...
            // capped so a large retry budget cannot overflow the multiplier.
            let delay = Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow((attempt - 1).min(10)));
            tokio::time::sleep(delay).await;
        }
        match client.generate(prompt).await {
            Ok(raw) => return Ok(raw),
            Err(e @ RouteLensError::Configuration(_)) => return Err(e),
            Err(e) => {
                warn!(
                    "model request failed (attempt {}/{}): {}",
                    attempt + 1,
                    attempts,
                    e
                );
                last_error = Some(e);
            }
        }
    }

    Err(RouteLensError::ModelExhausted {
        attempts,
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt recorded".to_string()),
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    // Accepted by several OpenAI-compatible servers; omitted when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
