use crate::agents::lenient_bool;
use crate::error::Result;
use crate::llm::{chat_json, ChatModel};
use crate::prompts;
use crate::state::{AgentState, GraphType};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct GraphDecision {
    #[serde(deserialize_with = "lenient_bool")]
    needs_graph: bool,
    #[serde(default)]
    graph_type: String,
}

/// Decide whether a chart would help, and which kind.
pub async fn decide_graph_need(model: &dyn ChatModel, state: &mut AgentState) -> Result<()> {
    if !state.has_rows() || state.has_error() {
        info!("Nothing to chart, skipping graph decision");
        state.needs_graph = false;
        state.graph_type.clear();
        state.graph_json.clear();
        return Ok(());
    }

    let decision: GraphDecision =
        chat_json(model, &prompts::graph_decision(&state.question, &state.query_result)).await?;

    let graph_type = decision.graph_type.parse::<GraphType>().unwrap_or_else(|e| {
        warn!("{}, treating as none", e);
        GraphType::None
    });

    state.needs_graph = decision.needs_graph && graph_type != GraphType::None;
    state.graph_type = graph_type.as_str().to_string();
    info!("Graph needed: {} ({})", state.needs_graph, state.graph_type);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedModel;
    use crate::state::NO_RESULTS;

    fn state_with_rows() -> AgentState {
        let mut state = AgentState::new("top 5 states by customers");
        state.query_result = r#"[{"customer_state": "SP", "n": 41746}]"#.to_string();
        state
    }

    #[tokio::test]
    async fn test_skips_model_without_rows() {
        let model = ScriptedModel::new(&[]);
        let mut state = AgentState::new("q");
        state.query_result = NO_RESULTS.to_string();
        state.graph_json = "{}".to_string();
        decide_graph_need(&model, &mut state).await.unwrap();
        assert_eq!(model.call_count(), 0);
        assert!(!state.needs_graph);
        assert!(state.graph_json.is_empty());
    }

    #[tokio::test]
    async fn test_parses_decision() {
        let model = ScriptedModel::new(&[r#"{"needs_graph": "True", "graph_type": "bar"}"#]);
        let mut state = state_with_rows();
        decide_graph_need(&model, &mut state).await.unwrap();
        assert!(state.needs_graph);
        assert_eq!(state.graph_type(), GraphType::Bar);
    }

    #[tokio::test]
    async fn test_graph_type_none_means_no_graph() {
        let model = ScriptedModel::new(&[r#"<think>single number</think>{"needs_graph": true, "graph_type": "none"}"#]);
        let mut state = state_with_rows();
        decide_graph_need(&model, &mut state).await.unwrap();
        assert!(!state.needs_graph);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_an_error() {
        let model = ScriptedModel::new(&["a bar chart would be nice"]);
        let mut state = state_with_rows();
        assert!(decide_graph_need(&model, &mut state).await.is_err());
    }
}
