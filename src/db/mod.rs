//! Local SQLite store: dataset loading, query execution and run history.

pub mod executor;
pub mod history;
pub mod loader;

pub use executor::{QueryExecutor, QueryOutcome, StatementResult};
pub use history::{HistoryEntry, QueryHistory, RunStatus};
pub use loader::{DatasetLoader, LoadedTable};
