//! SQL execution against the local SQLite store.

use crate::error::Result;
use crate::sql_guard;
use crate::state::NO_RESULTS;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};

/// Rows returned by one statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementResult {
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    /// True when rows were dropped to respect the row cap.
    pub truncated: bool,
}

/// Outcome of running a (possibly multi-statement) SQL string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub statements: Vec<StatementResult>,
    pub execution_time_ms: u64,
}

impl QueryOutcome {
    pub fn total_rows(&self) -> usize {
        self.statements.iter().map(|s| s.rows.len()).sum()
    }

    /// Render as the text stored in `AgentState::query_result`.
    ///
    /// One statement gives an array of row objects, several give an array of
    /// `{query, rows}` objects, and no rows at all gives `NO_RESULTS`.
    pub fn to_result_text(&self) -> Result<String> {
        if self.total_rows() == 0 {
            return Ok(NO_RESULTS.to_string());
        }
        let text = if self.statements.len() == 1 {
            serde_json::to_string_pretty(&self.statements[0].rows)?
        } else {
            let sets: Vec<Value> = self
                .statements
                .iter()
                .map(|s| serde_json::json!({ "query": s.query, "rows": s.rows }))
                .collect();
            serde_json::to_string_pretty(&sets)?
        };
        Ok(text)
    }
}

/// Runs read-only SQL and converts rows to JSON objects.
pub struct QueryExecutor {
    conn: Mutex<Connection>,
    max_rows: usize,
}

impl QueryExecutor {
    /// Open an existing database file read-only.
    pub fn open(path: impl AsRef<Path>, max_rows: usize) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Opened database {} (read-only)", path.display());
        Ok(Self::from_connection(conn, max_rows))
    }

    /// Wrap an already-open connection, e.g. an in-memory database.
    pub fn from_connection(conn: Connection, max_rows: usize) -> Self {
        Self {
            conn: Mutex::new(conn),
            max_rows: max_rows.max(1),
        }
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Execute model-generated SQL.
    ///
    /// Failures come back as the message the correction step should see.
    pub fn execute(&self, sql: &str) -> std::result::Result<QueryOutcome, String> {
        let statements = sql_guard::prepare(sql)?;
        let started = Instant::now();
        let conn = self.lock();

        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            let result = self.run_statement(&conn, &statement).map_err(|e| e.to_string())?;
            results.push(result);
        }

        Ok(QueryOutcome {
            statements: results,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn run_statement(&self, conn: &Connection, sql: &str) -> rusqlite::Result<StatementResult> {
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
                Some("only read-only SELECT queries may be run".to_string()),
            ));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        let mut truncated = false;

        while let Some(row) = rows.next()? {
            if out.len() >= self.max_rows {
                truncated = true;
                break;
            }
            let mut obj = Map::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                obj.insert(name.clone(), value_to_json(row.get_ref(idx)?));
            }
            out.push(obj);
        }

        if truncated {
            warn!("Result truncated to {} rows for: {}", self.max_rows, sql);
        }

        Ok(StatementResult {
            query: sql.to_string(),
            columns,
            rows: out,
            truncated,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
