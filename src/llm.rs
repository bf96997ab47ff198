use crate::config::{LlmConfig, Provider};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

lazy_static! {
    // qwen3 and other reasoning models emit their chain of thought inline
    static ref THINK_BLOCK: Regex = Regex::new(r"(?is)<think>.*?</think>").unwrap();
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[a-zA-Z]*\s*\n?(.*?)```").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Whether the model is asked for free text or a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// A hosted chat model. Every workflow step goes through this seam.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// HTTP client for Ollama or any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check that the model server answers at all.
    pub async fn health_check(&self) -> bool {
        let url = match self.config.provider {
            Provider::Ollama => format!("{}/api/tags", self.config.base_url),
            Provider::OpenAi => format!("{}/models", self.config.base_url),
        };
        let mut request = self.client.get(&url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("Model server health check failed: {}", e);
                false
            }
        }
    }

    async fn call_ollama(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.config.temperature },
        });
        if format == ResponseFormat::Json {
            body["format"] = serde_json::json!("json");
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AssistantError::Llm(format!("Ollama error ({}): {}", status, error_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("Failed to parse Ollama response: {}", e)))?;
        parse_ollama_body(&json)
    }

    async fn call_openai(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });
        if format == ResponseFormat::Json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AssistantError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("Failed to parse LLM response: {}", e)))?;
        parse_openai_body(&json)
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
        debug!(
            "Calling {} model {} with {} messages",
            self.config.provider,
            self.config.model,
            messages.len()
        );
        match self.config.provider {
            Provider::Ollama => self.call_ollama(messages, format).await,
            Provider::OpenAi => self.call_openai(messages, format).await,
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn parse_ollama_body(json: &serde_json::Value) -> Result<String> {
    if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
        return Err(AssistantError::Llm(format!("Ollama error: {}", error)));
    }
    let content = json["message"]["content"]
        .as_str()
        .ok_or_else(|| AssistantError::Llm(format!("No message content in Ollama response: {}", json)))?;
    if content.trim().is_empty() {
        return Err(AssistantError::Llm("Empty content in Ollama response".to_string()));
    }
    Ok(content.to_string())
}

fn parse_openai_body(json: &serde_json::Value) -> Result<String> {
    if let Some(error) = json.get("error") {
        return Err(AssistantError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| AssistantError::Llm(format!("No choices in LLM response: {}", json)))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(AssistantError::Llm("LLM response was filtered by content policy".to_string()))
        }
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| AssistantError::Llm(format!("No content in LLM response: {}", json)))?;
    if content.trim().is_empty() {
        return Err(AssistantError::Llm("Empty content in LLM response".to_string()));
    }
    Ok(content.to_string())
}

/// Remove `<think>` blocks, keeping the rest of the reply as written.
pub fn strip_reasoning(raw: &str) -> String {
    THINK_BLOCK.replace_all(raw, "").trim().to_string()
}

/// Remove reasoning blocks and markdown fences from raw model text.
pub fn clean_response(raw: &str) -> String {
    let trimmed = strip_reasoning(raw);
    if let Some(caps) = CODE_FENCE.captures(&trimmed) {
        return caps[1].trim().to_string();
    }
    trimmed
}

/// Pull the outermost JSON object or array out of a model reply.
pub fn extract_json(raw: &str) -> String {
    let cleaned = clean_response(raw);
    let object = cleaned.find('{').zip(cleaned.rfind('}'));
    let array = cleaned.find('[').zip(cleaned.rfind(']'));

    let span = match (object, array) {
        (Some(o), Some(a)) => Some(if o.0 < a.0 { o } else { a }),
        (Some(o), None) => Some(o),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };

    match span {
        Some((start, end)) if start < end => cleaned[start..=end].to_string(),
        _ => cleaned,
    }
}

/// Ask for JSON and deserialize it into `T`.
pub async fn chat_json<T>(model: &dyn ChatModel, messages: &[ChatMessage]) -> Result<T>
where
    T: DeserializeOwned,
{
    let response = model.chat(messages, ResponseFormat::Json).await?;
    let json = extract_json(&response);
    serde_json::from_str(&json).map_err(|e| {
        let shown: String = json.chars().take(500).collect();
        AssistantError::StructuredOutput(format!("{}. Response: {}", e, shown))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_response_strips_think_and_fences() {
        let raw = "<think>\nthe user wants counts\n</think>\n```sql\nSELECT COUNT(*) FROM orders;\n```";
        assert_eq!(clean_response(raw), "SELECT COUNT(*) FROM orders;");
    }

    #[test]
    fn test_strip_reasoning_keeps_fences() {
        let raw = "<think>hmm</think>Use this:\n```sql\nSELECT 1\n```";
        assert_eq!(strip_reasoning(raw), "Use this:\n```sql\nSELECT 1\n```");
    }

    #[test]
    fn test_clean_response_plain_text_untouched() {
        assert_eq!(clean_response("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let raw = "Sure! Here you go: {\"needs_graph\": true, \"graph_type\": \"bar\"} hope it helps";
        assert_eq!(extract_json(raw), "{\"needs_graph\": true, \"graph_type\": \"bar\"}");
    }

    #[test]
    fn test_extract_json_array_first() {
        let raw = "[{\"a\": 1}, {\"a\": 2}]";
        assert_eq!(extract_json(raw), raw);
    }

    #[test]
    fn test_parse_ollama_body() {
        let body = serde_json::json!({"message": {"role": "assistant", "content": "SELECT 1"}, "done": true});
        assert_eq!(parse_ollama_body(&body).unwrap(), "SELECT 1");

        let err = serde_json::json!({"error": "model 'qwen3:8b' not found"});
        assert!(parse_ollama_body(&err).unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_parse_openai_body() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}]
        });
        assert_eq!(parse_openai_body(&body).unwrap(), "hello");

        let empty = serde_json::json!({"choices": []});
        assert!(parse_openai_body(&empty).is_err());

        let filtered = serde_json::json!({
            "choices": [{"message": {"content": "x"}, "finish_reason": "content_filter"}]
        });
        assert!(parse_openai_body(&filtered).is_err());
    }

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::system("hi")).unwrap();
        assert_eq!(json["role"], "system");
    }
}
