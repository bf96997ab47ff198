//! Builds the SQLite database from the Olist CSV export.

use crate::error::{AssistantError, Result};
use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// CSV files shipped with the dataset, in load order.
pub const DATASET_FILES: &[&str] = &[
    "olist_customers_dataset.csv",
    "olist_orders_dataset.csv",
    "olist_order_items_dataset.csv",
    "olist_order_payments_dataset.csv",
    "olist_order_reviews_dataset.csv",
    "olist_products_dataset.csv",
    "olist_sellers_dataset.csv",
    "olist_geolocation_dataset.csv",
    "product_category_name_translation.csv",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Widen this type so that `cell` still fits.
    fn widen(self, cell: &str) -> ColumnType {
        let cell = cell.trim();
        if cell.is_empty() {
            return self;
        }
        match self {
            ColumnType::Integer if cell.parse::<i64>().is_ok() => ColumnType::Integer,
            ColumnType::Integer | ColumnType::Real if cell.parse::<f64>().is_ok() => ColumnType::Real,
            _ => ColumnType::Text,
        }
    }
}

/// Summary of one loaded table.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedTable {
    pub table: String,
    pub rows: usize,
    pub columns: Vec<(String, ColumnType)>,
}

/// `olist_order_items_dataset.csv` becomes `order_items`.
pub fn table_name_for(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".csv").unwrap_or(file_name);
    let stem = stem.strip_prefix("olist_").unwrap_or(stem);
    let stem = stem.strip_suffix("_dataset").unwrap_or(stem);
    stem.to_string()
}

pub struct DatasetLoader {
    data_dir: PathBuf,
}

impl DatasetLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    /// Replace `db_path` with a fresh database built from every dataset file.
    pub fn create_database(&self, db_path: &Path) -> Result<Vec<LoadedTable>> {
        let missing: Vec<&str> = DATASET_FILES
            .iter()
            .copied()
            .filter(|f| !self.data_dir.join(f).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(AssistantError::Dataset(format!(
                "missing files in {}: {}",
                self.data_dir.display(),
                missing.join(", ")
            )));
        }

        if db_path.exists() {
            warn!("Replacing existing database {}", db_path.display());
            fs::remove_file(db_path)?;
        }
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(db_path)?;
        let mut loaded = Vec::with_capacity(DATASET_FILES.len());
        for file in DATASET_FILES {
            loaded.push(self.load_file(&mut conn, file)?);
        }
        info!("Database created: {}", db_path.display());
        Ok(loaded)
    }

    /// Load one CSV file into a table of the same (shortened) name.
    pub fn load_file(&self, conn: &mut Connection, file_name: &str) -> Result<LoadedTable> {
        let path = self.data_dir.join(file_name);
        let table = table_name_for(file_name);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        if headers.is_empty() {
            return Err(AssistantError::Dataset(format!("{} has no header row", path.display())));
        }

        let records = reader.records().collect::<std::result::Result<Vec<StringRecord>, _>>()?;
        let columns = infer_columns(&headers, &records);
        load_records(conn, &table, &columns, &records)?;

        info!("Loaded {} rows into {}", records.len(), table);
        Ok(LoadedTable {
            table,
            rows: records.len(),
            columns,
        })
    }
}

fn infer_columns(headers: &[String], records: &[StringRecord]) -> Vec<(String, ColumnType)> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let kind = records
                .iter()
                .filter_map(|r| r.get(idx))
                .fold(ColumnType::Integer, ColumnType::widen);
            (name.clone(), kind)
        })
        .collect()
}

fn coerce(cell: Option<&str>, kind: ColumnType) -> SqlValue {
    let cell = cell.map(str::trim).unwrap_or("");
    if cell.is_empty() {
        return SqlValue::Null;
    }
    match kind {
        ColumnType::Integer => cell.parse().map(SqlValue::Integer).unwrap_or(SqlValue::Null),
        ColumnType::Real => cell.parse().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        ColumnType::Text => SqlValue::Text(cell.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn load_records(
    conn: &mut Connection,
    table: &str,
    columns: &[(String, ColumnType)],
    records: &[StringRecord],
) -> Result<()> {
    let tx = conn.transaction()?;

    let column_defs = columns
        .iter()
        .map(|(name, kind)| format!("{} {}", quote_ident(name), kind.as_sql()))
        .join(", ");
    tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;
    tx.execute(&format!("CREATE TABLE {} ({})", quote_ident(table), column_defs), [])?;

    {
        let placeholders = (1..=columns.len()).map(|i| format!("?{}", i)).join(", ");
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(table),
            placeholders
        ))?;
        for record in records {
            let values = columns
                .iter()
                .enumerate()
                .map(|(idx, (_, kind))| coerce(record.get(idx), *kind));
            insert.execute(params_from_iter(values))?;
        }
    }

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(table_name_for("olist_customers_dataset.csv"), "customers");
        assert_eq!(table_name_for("olist_order_items_dataset.csv"), "order_items");
        assert_eq!(
            table_name_for("product_category_name_translation.csv"),
            "product_category_name_translation"
        );
    }

    #[test]
    fn test_type_widening() {
        assert_eq!(ColumnType::Integer.widen("42"), ColumnType::Integer);
        assert_eq!(ColumnType::Integer.widen("4.2"), ColumnType::Real);
        assert_eq!(ColumnType::Real.widen("7"), ColumnType::Real);
        assert_eq!(ColumnType::Real.widen("SP"), ColumnType::Text);
        assert_eq!(ColumnType::Text.widen("1"), ColumnType::Text);
        assert_eq!(ColumnType::Integer.widen(""), ColumnType::Integer);
    }

    #[test]
    fn test_load_file_infers_types_and_nulls() {
        let dir = std::env::temp_dir().join(format!("text2sql_loader_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("olist_sellers_dataset.csv"),
            "seller_id,seller_zip_code_prefix,seller_city,seller_state,rating\n\
             s1,13023,campinas,SP,4.5\n\
             s2,,curitiba,PR,\n",
        )
        .unwrap();

        let loader = DatasetLoader::new(&dir);
        let mut conn = Connection::open_in_memory().unwrap();
        let loaded = loader.load_file(&mut conn, "olist_sellers_dataset.csv").unwrap();

        assert_eq!(loaded.table, "sellers");
        assert_eq!(loaded.rows, 2);
        assert_eq!(loaded.columns[1], ("seller_zip_code_prefix".to_string(), ColumnType::Integer));
        assert_eq!(loaded.columns[4].1, ColumnType::Real);

        let nulls: i64 = conn
            .query_row("SELECT COUNT(*) FROM sellers WHERE seller_zip_code_prefix IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nulls, 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_create_database_replaces_stale_file() {
        let dir = std::env::temp_dir().join(format!("text2sql_full_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        for file in DATASET_FILES {
            fs::write(dir.join(file), "id,name,amount\n1,first,1.5\n2,second,\n").unwrap();
        }

        let db_path = dir.join("ecommerce.db");
        {
            let stale = Connection::open(&db_path).unwrap();
            stale
                .execute_batch("CREATE TABLE leftover (x INTEGER); INSERT INTO leftover VALUES (1);")
                .unwrap();
        }

        let loaded = DatasetLoader::new(&dir).create_database(&db_path).unwrap();
        assert_eq!(loaded.len(), DATASET_FILES.len());
        assert!(loaded.iter().all(|t| t.rows == 2));

        let conn = Connection::open(&db_path).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert!(!tables.contains(&"leftover".to_string()));
        let mut expected: Vec<String> = crate::schema_info::TABLES.iter().map(|t| t.to_string()).collect();
        expected.sort();
        assert_eq!(tables, expected);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM order_reviews WHERE amount IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);

        drop(stmt);
        drop(conn);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_create_database_reports_missing_files() {
        let dir = std::env::temp_dir().join(format!("text2sql_empty_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let err = DatasetLoader::new(&dir)
            .create_database(&dir.join("ecommerce.db"))
            .unwrap_err();
        assert!(err.to_string().contains("olist_customers_dataset.csv"));
        fs::remove_dir_all(&dir).ok();
    }
}
