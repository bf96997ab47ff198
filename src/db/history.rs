//! Query history repository for storing assistant runs

use crate::error::Result;
use crate::state::AgentState;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Answered,
    Failed,
    Declined,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Answered => "answered",
            RunStatus::Failed => "failed",
            RunStatus::Declined => "declined",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "answered" => RunStatus::Answered,
            "declined" => RunStatus::Declined,
            _ => RunStatus::Failed,
        }
    }

    /// Classify a finished run.
    pub fn of(state: &AgentState) -> Self {
        if !state.is_in_scope {
            RunStatus::Declined
        } else if state.has_error() || state.final_answer.trim().is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Answered
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub question: String,
    pub sql_query: String,
    pub status: RunStatus,
    pub iterations: u32,
    pub error: Option<String>,
    pub graph_type: Option<String>,
    pub created_at: String,
}

pub struct QueryHistory {
    db: Mutex<Connection>,
}

impl QueryHistory {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS query_history (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                sql_query TEXT NOT NULL,
                status TEXT NOT NULL,
                iterations INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                graph_type TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_query_history_created ON query_history(created_at);
            "#,
        )?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn record(&self, state: &AgentState) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let status = RunStatus::of(state);
        let error = Some(state.error.as_str()).filter(|e| !e.trim().is_empty());
        let graph_type = Some(state.graph_type.as_str()).filter(|g| state.needs_graph && !g.is_empty());

        let db = self.db.lock().unwrap_or_else(|p| p.into_inner());
        db.execute(
            r#"
            INSERT INTO query_history
                (id, question, sql_query, status, iterations, error_message, graph_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                id.to_string(),
                state.question,
                state.sql_query,
                status.as_str(),
                state.iteration,
                error,
                graph_type,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// Most recent runs first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let db = self.db.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = db.prepare(
            r#"
            SELECT id, question, sql_query, status, iterations, error_message, graph_type, created_at
            FROM query_history
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    sql_query: row.get(2)?,
                    status: RunStatus::from_db(&row.get::<_, String>(3)?),
                    iterations: row.get(4)?,
                    error: row.get(5)?,
                    graph_type: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_list() {
        let history = QueryHistory::in_memory().unwrap();

        let mut answered = AgentState::new("how many orders?");
        answered.sql_query = "SELECT COUNT(*) FROM orders".to_string();
        answered.final_answer = "There are 99441 orders.".to_string();
        history.record(&answered).unwrap();

        let mut failed = AgentState::new("broken");
        failed.error = "no such table: order".to_string();
        failed.iteration = 3;
        history.record(&failed).unwrap();

        let entries = history.recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].question, "broken");
        assert_eq!(entries[0].status, RunStatus::Failed);
        assert_eq!(entries[0].iterations, 3);
        assert_eq!(entries[1].status, RunStatus::Answered);
        assert!(entries[1].error.is_none());
    }

    #[test]
    fn test_declined_status() {
        let mut state = AgentState::new("hi");
        state.is_in_scope = false;
        state.final_answer = "Hi there!".to_string();
        assert_eq!(RunStatus::of(&state), RunStatus::Declined);
    }
}
