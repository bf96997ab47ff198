use crate::error::Result;
use crate::llm::{clean_response, ChatModel, ResponseFormat};
use crate::prompts;
use crate::state::AgentState;
use tracing::{debug, info};

/// Ask the model to repair the failing query. Counts as one iteration.
pub async fn correct_sql(model: &dyn ChatModel, state: &mut AgentState) -> Result<()> {
    state.iteration += 1;
    info!("Correcting SQL (attempt {}) after error: {}", state.iteration, state.error);

    let messages = prompts::error_correction(&state.question, &state.sql_query, &state.error, state.iteration);
    let raw = model.chat(&messages, ResponseFormat::Text).await?;
    state.sql_query = clean_response(&raw);

    debug!("Corrected SQL:\n{}", state.sql_query);
    Ok(())
}
