use crate::error::Result;
use crate::llm::{strip_reasoning, ChatModel, ResponseFormat};
use crate::prompts;
use crate::state::AgentState;
use tracing::info;

/// Turn the raw query result into a natural-language answer.
pub async fn analyze_results(model: &dyn ChatModel, state: &mut AgentState) -> Result<()> {
    info!("Summarizing query result");

    let messages = prompts::analysis(&state.question, &state.sql_query, &state.query_result);
    let raw = model.chat(&messages, ResponseFormat::Text).await?;
    state.final_answer = strip_reasoning(&raw);
    Ok(())
}
