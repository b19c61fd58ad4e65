pub mod prompt;
pub mod providers;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{error, info};

use crate::config::LlmConfig;
use crate::db::introspect::SchemaInfo;
use crate::error::{AppError, AppResult};
use crate::llm::providers::ChatMessage;

/// Capability boundary to the language model: an ordered message list in, a
/// single text completion out. One implementation is chosen at startup.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String>;

    fn provider_name(&self) -> &str;
    fn model(&self) -> &str;
    fn endpoint(&self) -> &str;
}

/// Output of NL-to-SQL generation. The visualization hint stays a raw string
/// here; the execution pipeline validates it against the closed set.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub explanation: String,
    pub visualization_hint: String,
    pub confidence: f64,
}

/// Connectivity probe report. Failures are carried inside the report, not as
/// errors, so operators always get provider/model/endpoint context.
#[derive(Debug, Serialize)]
pub struct AiStatus {
    pub status: String,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

pub struct LlmManager {
    completer: Box<dyn Completer>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let completer: Box<dyn Completer> = match config.provider.as_str() {
            "openai" => Box::new(providers::openai::OpenAiProvider::new(config)?),
            "lmstudio" => Box::new(providers::lm_studio::LmStudioProvider::new(config)?),
            "openai-compatible" => Box::new(providers::compatible::CompatibleProvider::new(config)?),
            other => {
                return Err(AppError::Provider {
                    provider: other.to_string(),
                    endpoint: config.api_url.clone().unwrap_or_default(),
                    message: format!("Unsupported AI provider: {}", other),
                });
            }
        };

        Ok(Self {
            completer,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Converts a natural-language question into SQL grounded on the given
    /// schema. Model output is unreliable and provider-dependent, so the
    /// parsed reply goes through a multi-stage repair pipeline before it can
    /// fail.
    pub async fn generate(
        &self,
        question: &str,
        schema: &SchemaInfo,
    ) -> AppResult<GeneratedQuery> {
        let user_prompt = prompt::build_prompt(question, schema);
        let messages = vec![
            ChatMessage::system(
                "You are an expert SQL query generator. Always respond with valid JSON.",
            ),
            ChatMessage::user(user_prompt),
        ];

        let content = self
            .completer
            .complete(&messages, self.temperature, self.max_tokens)
            .await?;

        let generated = parse_response(&content)?;
        info!(
            provider = self.completer.provider_name(),
            confidence = generated.confidence,
            "generated SQL from natural language"
        );
        Ok(generated)
    }

    /// Sends a minimal probe prompt and reports the outcome either way.
    pub async fn test_connectivity(&self) -> AiStatus {
        let messages = vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("Say 'Hello' if you can understand this."),
        ];

        let provider = self.completer.provider_name().to_string();
        let model = self.completer.model().to_string();
        let base_url = self.completer.endpoint().to_string();

        match self.completer.complete(&messages, 0.1, 50).await {
            Ok(content) => AiStatus {
                status: "success".to_string(),
                message: format!("Successfully connected to {}", provider),
                provider,
                model,
                base_url,
                response: Some(content.trim().to_string()),
                error: None,
            },
            Err(err) => {
                error!("AI connectivity probe failed: {}", err);
                AiStatus {
                    status: "error".to_string(),
                    message: err.to_string(),
                    provider,
                    model,
                    base_url,
                    response: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

fn json_span_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Non-greedy, dot matches newlines. Deliberately stops at the first
    // closing brace; nested objects fall through to the whole-reply parse.
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*?\}").unwrap())
}

fn strip_code_fences(content: &str) -> &str {
    let mut stripped = content.trim();
    if let Some(rest) = stripped.strip_prefix("```json") {
        stripped = rest;
    } else if let Some(rest) = stripped.strip_prefix("```") {
        stripped = rest;
    }
    if let Some(rest) = stripped.strip_suffix("```") {
        stripped = rest;
    }
    stripped.trim()
}

/// The repair pipeline, applied in order: strip code fences, parse the first
/// `{...}` span, parse the whole reply, and finally a heuristic SQL
/// extraction with fixed low confidence. Only a reply that parses as JSON
/// but lacks required fields is rejected.
fn parse_response(content: &str) -> AppResult<GeneratedQuery> {
    let stripped = strip_code_fences(content);

    let parsed: Option<Value> = json_span_pattern()
        .find(stripped)
        .and_then(|span| serde_json::from_str(span.as_str()).ok())
        .or_else(|| serde_json::from_str(stripped).ok());

    match parsed {
        Some(value) => validate_fields(value),
        None => {
            error!("failed to parse model response as JSON, extracting SQL heuristically");
            Ok(heuristic_fallback(stripped))
        }
    }
}

fn validate_fields(value: Value) -> AppResult<GeneratedQuery> {
    let field = |name: &str| -> AppResult<String> {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::ResponseValidation(format!("missing required field '{}'", name))
            })
    };

    let sql = field("sql")?;
    let explanation = field("explanation")?;
    let visualization_hint = field("visualization_hint")?;

    // Smaller local models often omit the confidence score
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.8);

    Ok(GeneratedQuery {
        sql,
        explanation,
        visualization_hint,
        confidence,
    })
}

fn heuristic_fallback(content: &str) -> GeneratedQuery {
    let sql = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ");

    GeneratedQuery {
        sql,
        explanation: "Generated SQL query from natural language".to_string(),
        visualization_hint: "table".to_string(),
        confidence: 0.7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_json_reply() {
        let reply = r#"{"sql": "SELECT 1", "explanation": "one", "visualization_hint": "kpi", "confidence": 0.92}"#;
        let generated = parse_response(reply).unwrap();
        assert_eq!(generated.sql, "SELECT 1");
        assert_eq!(generated.visualization_hint, "kpi");
        assert!((generated.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn fenced_json_parses_identically_to_unfenced() {
        let bare = r#"{"sql": "SELECT * FROM t", "explanation": "all rows", "visualization_hint": "table"}"#;
        let fenced = format!("```json\n{}\n```", bare);

        let from_bare = parse_response(bare).unwrap();
        let from_fenced = parse_response(&fenced).unwrap();
        assert_eq!(from_bare.sql, from_fenced.sql);
        assert_eq!(from_bare.explanation, from_fenced.explanation);
        assert_eq!(from_bare.visualization_hint, from_fenced.visualization_hint);
    }

    #[test]
    fn extracts_the_json_span_out_of_surrounding_prose() {
        let reply = "Here is your query:\n{\"sql\": \"SELECT a FROM t\", \"explanation\": \"x\", \"visualization_hint\": \"table\"}\nHope that helps!";
        let generated = parse_response(reply).unwrap();
        assert_eq!(generated.sql, "SELECT a FROM t");
    }

    #[test]
    fn confidence_defaults_when_the_model_omits_it() {
        let reply = r#"{"sql": "SELECT 1", "explanation": "one", "visualization_hint": "kpi"}"#;
        let generated = parse_response(reply).unwrap();
        assert!((generated.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_required_fields_fail_validation() {
        let reply = r#"{"sql": "SELECT 1", "confidence": 0.9}"#;
        let err = parse_response(reply).unwrap_err();
        assert!(matches!(err, AppError::ResponseValidation(_)));
    }

    #[test]
    fn unparseable_prose_falls_back_to_heuristic_extraction() {
        let reply = "# thinking out loud\nSELECT name\nFROM users\nWHERE active = 1\n";
        let generated = parse_response(reply).unwrap();
        assert_eq!(generated.sql, "SELECT name FROM users WHERE active = 1");
        assert_eq!(generated.visualization_hint, "table");
        assert!((generated.confidence - 0.7).abs() < f64::EPSILON);
        assert_eq!(
            generated.explanation,
            "Generated SQL query from natural language"
        );
    }
}
