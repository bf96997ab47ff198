use crate::agents::lenient_bool;
use crate::error::Result;
use crate::llm::{chat_json, ChatModel};
use crate::prompts::{self, GREETING_ANSWER, OUT_OF_SCOPE_ANSWER};
use crate::state::AgentState;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct GuardrailsVerdict {
    #[serde(deserialize_with = "lenient_bool")]
    pub is_in_scope: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_greeting: bool,
    #[serde(default)]
    pub reason: String,
}

/// Classify the question as greeting, in scope or out of scope.
pub async fn check_guardrails(model: &dyn ChatModel, state: &mut AgentState) -> Result<()> {
    let verdict: GuardrailsVerdict = chat_json(model, &prompts::guardrails(&state.question)).await?;
    info!(
        "Guardrails: in_scope={} greeting={} ({})",
        verdict.is_in_scope, verdict.is_greeting, verdict.reason
    );

    if verdict.is_greeting {
        state.is_in_scope = false;
        state.final_answer = GREETING_ANSWER.to_string();
    } else if !verdict.is_in_scope {
        state.is_in_scope = false;
        state.final_answer = OUT_OF_SCOPE_ANSWER.to_string();
    } else {
        state.is_in_scope = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedModel;

    #[tokio::test]
    async fn test_greeting() {
        let model = ScriptedModel::new(&[r#"{"is_in_scope": false, "is_greeting": true, "reason": "hello"}"#]);
        let mut state = AgentState::new("hey");
        check_guardrails(&model, &mut state).await.unwrap();
        assert!(!state.is_in_scope);
        assert_eq!(state.final_answer, GREETING_ANSWER);
    }

    #[tokio::test]
    async fn test_out_of_scope() {
        let model = ScriptedModel::new(&[r#"{"is_in_scope": false, "is_greeting": false, "reason": "geography"}"#]);
        let mut state = AgentState::new("can you tell me where is Pune?");
        check_guardrails(&model, &mut state).await.unwrap();
        assert!(!state.is_in_scope);
        assert!(state.final_answer.contains("out of scope"));
    }

    #[tokio::test]
    async fn test_in_scope_leaves_answer_empty() {
        let model = ScriptedModel::new(&[r#"{"is_in_scope": true, "is_greeting": false, "reason": "orders"}"#]);
        let mut state = AgentState::new("how many orders were delivered?");
        check_guardrails(&model, &mut state).await.unwrap();
        assert!(state.is_in_scope);
        assert!(state.final_answer.is_empty());
    }
}
