use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{LlmConfig, ProviderConfig, ProviderKind};
use crate::HTTP_CLIENT;

/// Hard ceiling applied to every generated text.
pub const MAX_POST_CHARS: usize = 280;

/// Opaque text generation: a role instruction plus a task prompt in, short text out.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} error ({status}): {message}")]
    Status {
        provider: &'static str,
        status: u16,
        message: String,
    },
    #[error("Network failure while reaching {provider}: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned an unexpected response format")]
    Malformed { provider: &'static str },
    #[error("Received an empty response from the model")]
    Empty,
    #[error("No configured provider with a valid API key is available")]
    NoProvider,
}

impl LlmError {
    /// Auth, rate-limit and server failures hand over to the next provider.
    pub fn can_fall_back(&self) -> bool {
        matches!(self, LlmError::Status { status, .. } if *status == 401 || *status == 429 || (500..=599).contains(status))
    }
}

/// Chat-completions client that walks the configured providers in order.
#[derive(Debug, Clone)]
pub struct LlmRouter {
    providers: Vec<ProviderConfig>,
    temperature: f32,
    timeout: Duration,
}

impl LlmRouter {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            providers: config.providers.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let mut last_failure = None;

        for (attempt, provider) in self.providers.iter().filter(|p| p.has_key()).enumerate() {
            match self.request(provider, system_prompt, user_prompt).await {
                Ok(text) => {
                    if attempt > 0 {
                        log::warn!(
                            "🔁 Primary provider failed. Response served by {} ({}).",
                            provider.kind.label(),
                            provider.model()
                        );
                    }
                    let clipped = clip(&text, MAX_POST_CHARS);
                    if clipped.is_empty() {
                        return Err(LlmError::Empty);
                    }
                    return Ok(clipped);
                }
                Err(e) if e.can_fall_back() => {
                    log::warn!("⚠️ {}", e);
                    last_failure = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_failure.unwrap_or(LlmError::NoProvider))
    }

    async fn request(
        &self,
        provider: &ProviderConfig,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        let label = provider.kind.label();
        let payload = json!({
            "model": provider.model(),
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "temperature": self.temperature,
            "stream": false
        });

        let mut request = HTTP_CLIENT
            .post(provider.endpoint())
            .bearer_auth(&provider.api_key)
            .timeout(self.timeout)
            .json(&payload);
        if provider.kind == ProviderKind::OpenRouter {
            request = request.header("X-Title", "chirp");
        }

        let response = request.send().await.map_err(|source| LlmError::Transport {
            provider: label,
            source,
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| LlmError::Transport {
            provider: label,
            source,
        })?;

        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(|p| p["error"]["message"].as_str().or_else(|| p["message"].as_str()))
                .map(str::to_string)
                .unwrap_or_else(|| format!("non-JSON or unknown provider error: {}", body.trim()));
            return Err(LlmError::Status {
                provider: label,
                status: status.as_u16(),
                message,
            });
        }

        parsed
            .as_ref()
            .and_then(extract_content)
            .ok_or(LlmError::Malformed { provider: label })
    }
}

#[async_trait]
impl ContentGenerator for LlmRouter {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        Ok(self.complete(system_prompt, user_prompt).await?)
    }
}

/// Accepts either a plain string or an array of text chunks.
fn extract_content(payload: &Value) -> Option<String> {
    let content = &payload["choices"][0]["message"]["content"];
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    let chunks = content.as_array()?;
    let joined: String = chunks
        .iter()
        .map(|chunk| {
            chunk
                .as_str()
                .or_else(|| chunk["text"].as_str())
                .unwrap_or("")
        })
        .collect();
    Some(joined)
}

/// First `limit` characters of the trimmed text, trimmed again.
pub fn clip(text: &str, limit: usize) -> String {
    let head: String = text.trim().chars().take(limit).collect();
    head.trim().to_string()
}
