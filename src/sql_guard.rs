//! Read-only guard for model-generated SQL.
//!
//! Splits a model reply into statements by slicing the original text at
//! top-level semicolons and rejects anything that is not a query. Text the
//! parser cannot handle is passed through untouched so SQLite reports its
//! own syntax error, which is what the correction step needs to see.

use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Token, Tokenizer};
use tracing::debug;

/// Split SQL text at top-level semicolons, preserving each statement's text.
pub fn split_statements(sql: &str) -> Vec<String> {
    let dialect = SQLiteDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!("Tokenizer rejected SQL, keeping it whole: {}", e);
            return non_empty(vec![sql.to_string()]);
        }
    };

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let mut statements = Vec::new();
    let mut start = 0;
    for token in tokens.iter().filter(|t| t.token == Token::SemiColon) {
        let offset = byte_offset(sql, &line_starts, &token.location);
        if offset < start || !sql[offset..].starts_with(';') {
            debug!("Semicolon location {:?} does not match the text, keeping SQL whole", token.location);
            return non_empty(vec![sql.to_string()]);
        }
        statements.push(sql[start..offset].to_string());
        start = offset + 1;
    }
    statements.push(sql[start..].to_string());
    non_empty(statements)
}

/// Byte offset of a 1-based line/column (columns count chars).
fn byte_offset(sql: &str, line_starts: &[usize], location: &Location) -> usize {
    let Some(&line_start) = line_starts.get((location.line as usize).saturating_sub(1)) else {
        return sql.len();
    };
    sql[line_start..]
        .char_indices()
        .nth((location.column as usize).saturating_sub(1))
        .map(|(i, _)| line_start + i)
        .unwrap_or(sql.len())
}

fn non_empty(statements: Vec<String>) -> Vec<String> {
    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Check that a single statement only reads data.
///
/// Returns the rejection message on failure.
pub fn ensure_read_only(statement: &str) -> Result<(), String> {
    let dialect = SQLiteDialect {};
    let parsed = match Parser::parse_sql(&dialect, statement) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Parser rejected statement, deferring to SQLite: {}", e);
            return Ok(());
        }
    };

    for stmt in &parsed {
        if !is_read_only(stmt) {
            let keyword = stmt
                .to_string()
                .split_whitespace()
                .next()
                .unwrap_or("statement")
                .to_uppercase();
            return Err(format!(
                "{} statements are not permitted; the database is read-only, only SELECT queries may be run",
                keyword
            ));
        }
    }
    Ok(())
}

fn is_read_only(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(_) => true,
        Statement::Explain { statement, .. } => is_read_only(statement),
        _ => false,
    }
}

/// Split and validate in one pass.
pub fn prepare(sql: &str) -> Result<Vec<String>, String> {
    let statements = split_statements(sql);
    if statements.is_empty() {
        return Err("Empty SQL query".to_string());
    }
    for statement in &statements {
        ensure_read_only(statement)?;
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_multiple_statements() {
        let sql = "SELECT COUNT(*) FROM orders;\nSELECT AVG(review_score) FROM order_reviews;";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "SELECT COUNT(*) FROM orders");
        assert_eq!(statements[1], "SELECT AVG(review_score) FROM order_reviews");
    }

    #[test]
    fn test_split_ignores_semicolon_in_literal() {
        let sql = "SELECT * FROM customers WHERE customer_city = 'a;b'";
        assert_eq!(split_statements(sql).len(), 1);
    }

    #[test]
    fn test_split_keeps_escaped_quotes() {
        let sql = "SELECT COUNT(*) FROM customers WHERE customer_city = 'santa barbara d''oeste';\n\
                   SELECT 'it''s'";
        let statements = split_statements(sql);
        assert_eq!(
            statements[0],
            "SELECT COUNT(*) FROM customers WHERE customer_city = 'santa barbara d''oeste'"
        );
        assert_eq!(statements[1], "SELECT 'it''s'");
    }

    #[test]
    fn test_split_keeps_text_after_multibyte_chars() {
        let sql = "SELECT 'São Paulo' AS c;  SELECT  2";
        assert_eq!(split_statements(sql), vec!["SELECT 'São Paulo' AS c", "SELECT  2"]);
    }

    #[test]
    fn test_select_and_cte_allowed() {
        assert!(ensure_read_only("SELECT 1").is_ok());
        assert!(ensure_read_only("WITH t AS (SELECT 1 AS n) SELECT n FROM t").is_ok());
    }

    #[test]
    fn test_writes_rejected() {
        let err = ensure_read_only("DELETE FROM orders").unwrap_err();
        assert!(err.starts_with("DELETE"));
        assert!(ensure_read_only("DROP TABLE customers").is_err());
        assert!(ensure_read_only("INSERT INTO sellers VALUES ('x', 1, 'c', 's')").is_err());
    }

    #[test]
    fn test_explain_allowed() {
        assert!(ensure_read_only("EXPLAIN SELECT * FROM orders").is_ok());
        assert!(ensure_read_only("EXPLAIN DELETE FROM orders").is_err());
    }

    #[test]
    fn test_write_hidden_after_select_rejected() {
        let err = prepare("SELECT 1; DELETE FROM orders").unwrap_err();
        assert!(err.starts_with("DELETE"));
    }

    #[test]
    fn test_prepare_rejects_empty() {
        assert!(prepare("  ;  ").is_err());
    }

    #[test]
    fn test_unparseable_sql_passes_through() {
        let statements = prepare("SELEC customer_state FRM customers").unwrap();
        assert_eq!(statements.len(), 1);
    }
}
