pub mod agents;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod render;
pub mod schema_info;
pub mod sql_guard;
pub mod state;
pub mod workflow;

pub use config::AppConfig;
pub use error::{AssistantError, Result};
pub use state::AgentState;
pub use workflow::{Workflow, WorkflowEvent};
