use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};
use crate::llm::providers::{ChatMessage, ChatRequest, ChatResponse};
use crate::llm::Completer;

const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";

/// Locally-served models behind LM Studio's OpenAI-compatible endpoint. The
/// server ignores the API key, so a placeholder is sent.
pub struct LmStudioProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LmStudioProvider {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let base_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Provider {
                provider: "lmstudio".to_string(),
                endpoint: base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Completer for LmStudioProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        debug!(model = %self.model, url = %self.base_url, "sending chat completion request to LM Studio");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", "Bearer not-needed")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() || e.is_connect() {
                    format!(
                        "Cannot connect to lmstudio at {}. Make sure the server is running.",
                        self.base_url
                    )
                } else {
                    format!("request to lmstudio failed: {}", e)
                };
                AppError::Provider {
                    provider: "lmstudio".to_string(),
                    endpoint: self.base_url.clone(),
                    message,
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "LM Studio request failed: {}", body);

            // The local server answers with a model-centric error when
            // nothing is loaded; surface that as an operator instruction.
            let message = if body.to_lowercase().contains("model") {
                format!(
                    "Model '{}' not found in LM Studio. Please load a model in LM Studio first.",
                    self.model
                )
            } else {
                format!("lmstudio responded with status {}: {}", status, body)
            };
            return Err(AppError::Provider {
                provider: "lmstudio".to_string(),
                endpoint: self.base_url.clone(),
                message,
            });
        }

        let completion: ChatResponse = response.json().await.map_err(|e| AppError::Provider {
            provider: "lmstudio".to_string(),
            endpoint: self.base_url.clone(),
            message: format!("failed to read lmstudio response: {}", e),
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Provider {
                provider: "lmstudio".to_string(),
                endpoint: self.base_url.clone(),
                message: "no choices in lmstudio response".to_string(),
            })
    }

    fn provider_name(&self) -> &str {
        "lmstudio"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
