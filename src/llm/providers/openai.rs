use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};
use crate::llm::providers::{ChatMessage, ChatRequest, ChatResponse};
use crate::llm::Completer;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Hosted OpenAI backend. The only mode that insists on a real API key.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Provider {
            provider: "openai".to_string(),
            endpoint: DEFAULT_BASE_URL.to_string(),
            message: "OpenAI API key is required when using openai provider".to_string(),
        })?;

        let base_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Provider {
                provider: "openai".to_string(),
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
impl Completer for OpenAiProvider {
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

        debug!(model = %self.model, "sending chat completion request to OpenAI");

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
                        "Cannot connect to openai at {}. Make sure the endpoint is reachable.",
                        self.base_url
                    )
                } else {
                    format!("request to openai failed: {}", e)
                };
                AppError::Provider {
                    provider: "openai".to_string(),
                    endpoint: self.base_url.clone(),
                    message,
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider {
                provider: "openai".to_string(),
                endpoint: self.base_url.clone(),
                message: format!("openai responded with status {}: {}", status, body),
            });
        }

        let completion: ChatResponse = response.json().await.map_err(|e| AppError::Provider {
            provider: "openai".to_string(),
            endpoint: self.base_url.clone(),
            message: format!("failed to read openai response: {}", e),
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Provider {
                provider: "openai".to_string(),
                endpoint: self.base_url.clone(),
                message: "no choices in openai response".to_string(),
            })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
