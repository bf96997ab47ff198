use crate::error::Result;
use crate::llm::{clean_response, ChatModel, ResponseFormat};
use crate::prompts;
use crate::state::AgentState;
use tracing::{debug, info};

/// Generate SQL for the question.
pub async fn generate_sql(model: &dyn ChatModel, state: &mut AgentState) -> Result<()> {
    info!("Generating SQL with {}", model.model_name());

    let raw = model
        .chat(&prompts::sql_generation(&state.question), ResponseFormat::Text)
        .await?;
    state.sql_query = clean_response(&raw);

    debug!("Generated SQL:\n{}", state.sql_query);
    Ok(())
}
