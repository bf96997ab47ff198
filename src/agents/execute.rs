use crate::db::QueryExecutor;
use crate::error::Result;
use crate::state::AgentState;
use tracing::{info, warn};

/// Run `state.sql_query`, storing rows in `query_result` or the failure in `error`.
pub fn execute_query(executor: &QueryExecutor, state: &mut AgentState) -> Result<()> {
    if state.sql_query.trim().is_empty() {
        warn!("No SQL to execute");
        state.query_result.clear();
        state.error = "Empty SQL query".to_string();
        return Ok(());
    }

    match executor.execute(&state.sql_query) {
        Ok(outcome) => {
            info!(
                "Query returned {} rows across {} statement(s) in {}ms",
                outcome.total_rows(),
                outcome.statements.len(),
                outcome.execution_time_ms
            );
            state.query_result = outcome.to_result_text()?;
            state.error.clear();
        }
        Err(message) => {
            warn!("Query failed: {}", message);
            state.query_result.clear();
            state.error = message;
        }
    }
    Ok(())
}
