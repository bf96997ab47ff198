//! Workflow steps. Each reads and updates the shared `AgentState`.

pub mod analysis;
pub mod decide_graph;
pub mod error_correction;
pub mod execute;
pub mod guardrails;
pub mod sql_generation;
pub mod visualization;

pub use analysis::analyze_results;
pub use decide_graph::decide_graph_need;
pub use error_correction::correct_sql;
pub use execute::execute_query;
pub use guardrails::check_guardrails;
pub use sql_generation::generate_sql;
pub use visualization::visualize;

use serde::{Deserialize, Deserializer};

/// Accept `true`, `"true"`, `"True"`, `1`; models are loose with JSON booleans.
pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Number(n) => Ok(n.as_i64().map(|n| n != 0).unwrap_or(false)),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("expected a boolean, got '{}'", other))),
        },
        serde_json::Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("expected a boolean, got {}", other))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::error::{AssistantError, Result};
    use crate::llm::{ChatMessage, ChatModel, ResponseFormat};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with canned responses in order and records every prompt.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[ChatMessage], _format: ResponseFormat) -> Result<String> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AssistantError::Llm("script exhausted".to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}
