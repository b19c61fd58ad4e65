use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};
use crate::llm::providers::{ChatMessage, ChatRequest, ChatResponse};
use crate::llm::Completer;

/// Any other OpenAI-compatible endpoint: the caller supplies the base URL,
/// the key is optional.
pub struct CompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompatibleProvider {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let base_url = config.api_url.clone().ok_or_else(|| AppError::Provider {
            provider: "openai-compatible".to_string(),
            endpoint: String::new(),
            message: "api_url must be set when using openai-compatible provider".to_string(),
        })?;

        let api_key = config
            .api_key
            .clone()
            .unwrap_or_else(|| "not-needed".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Provider {
                provider: "openai-compatible".to_string(),
                endpoint: base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Completer for CompatibleProvider {
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

        debug!(model = %self.model, url = %self.base_url, "sending chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() || e.is_connect() {
                    format!(
                        "Cannot connect to openai-compatible at {}. Make sure the server is running.",
                        self.base_url
                    )
                } else {
                    format!("request to openai-compatible endpoint failed: {}", e)
                };
                AppError::Provider {
                    provider: "openai-compatible".to_string(),
                    endpoint: self.base_url.clone(),
                    message,
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider {
                provider: "openai-compatible".to_string(),
                endpoint: self.base_url.clone(),
                message: format!("endpoint responded with status {}: {}", status, body),
            });
        }

        let completion: ChatResponse = response.json().await.map_err(|e| AppError::Provider {
            provider: "openai-compatible".to_string(),
            endpoint: self.base_url.clone(),
            message: format!("failed to read response: {}", e),
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Provider {
                provider: "openai-compatible".to_string(),
                endpoint: self.base_url.clone(),
                message: "no choices in response".to_string(),
            })
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
