//! Runtime configuration, read from the environment (after `.env` is loaded).

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which wire protocol the model server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Ollama `/api/chat`
    Ollama,
    /// OpenAI-compatible `/chat/completions`
    OpenAi,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for Provider {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" | "openai-compatible" => Ok(Provider::OpenAi),
            other => Err(AssistantError::Config(format!(
                "unknown provider '{}', expected 'ollama' or 'openai'",
                other
            ))),
        }
    }
}

/// Model connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub db_path: PathBuf,
    pub max_iterations: u32,
    pub recursion_limit: usize,
    pub max_result_rows: usize,
    pub guardrails_enabled: bool,
    pub history_db: Option<PathBuf>,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: Provider::Ollama,
                model: "qwen3:8b".to_string(),
                base_url: Provider::Ollama.default_base_url().to_string(),
                api_key: None,
                temperature: 0.1,
            },
            db_path: PathBuf::from("ecommerce.db"),
            max_iterations: 3,
            recursion_limit: 50,
            max_result_rows: 200,
            guardrails_enabled: false,
            history_db: None,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("TEXT2SQL_PROVIDER") {
            config.llm.provider = provider.parse()?;
            config.llm.base_url = config.llm.provider.default_base_url().to_string();
        }
        if let Some(model) = get("TEXT2SQL_MODEL") {
            config.llm.model = model;
        }
        if let Some(url) = get("TEXT2SQL_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        config.llm.api_key = get("OPENAI_API_KEY");
        if let Some(t) = get("TEXT2SQL_TEMPERATURE") {
            config.llm.temperature = parse_value("TEXT2SQL_TEMPERATURE", &t)?;
        }
        if let Some(db) = get("TEXT2SQL_DB") {
            config.db_path = PathBuf::from(db);
        }
        if let Some(n) = get("TEXT2SQL_MAX_ITERATIONS") {
            config.max_iterations = parse_value("TEXT2SQL_MAX_ITERATIONS", &n)?;
        }
        if let Some(n) = get("TEXT2SQL_RECURSION_LIMIT") {
            config.recursion_limit = parse_value("TEXT2SQL_RECURSION_LIMIT", &n)?;
        }
        if let Some(n) = get("TEXT2SQL_MAX_RESULT_ROWS") {
            config.max_result_rows = parse_value("TEXT2SQL_MAX_RESULT_ROWS", &n)?;
        }
        if let Some(flag) = get("TEXT2SQL_GUARDRAILS") {
            config.guardrails_enabled = parse_bool("TEXT2SQL_GUARDRAILS", &flag)?;
        }
        config.history_db = get("TEXT2SQL_HISTORY_DB").map(PathBuf::from);
        if let Some(addr) = get("TEXT2SQL_BIND") {
            config.bind_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(AssistantError::Config("model name must not be empty".to_string()));
        }
        if self.recursion_limit == 0 {
            return Err(AssistantError::Config("recursion limit must be positive".to_string()));
        }
        if self.max_result_rows == 0 {
            return Err(AssistantError::Config("max result rows must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AssistantError::Config(format!(
                "temperature {} out of range 0.0-2.0",
                self.llm.temperature
            )));
        }
        if self.llm.provider == Provider::OpenAi && self.llm.api_key.is_none() {
            return Err(AssistantError::Config(
                "OPENAI_API_KEY is required for the openai provider".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AssistantError::Config(format!("invalid value for {}: '{}'", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AssistantError::Config(format!("invalid value for {}: '{}'", key, raw))),
    }
}
