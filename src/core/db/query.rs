/// Query Result Module
///
/// The outcome of a statement as reported by the driver, the per-query result
/// bookkeeping kept by the facade, and statement normalization.

use super::rows::RowSet;

/// What a driver reports after running one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// The statement produced a result set
    Rows(RowSet),
    /// The statement changed rows
    Affected { count: u64, last_insert_id: Option<i64> },
}

/// Result of the most recently executed statement.
///
/// Exactly one side is populated: `affected_rows`/`insert_id` for mutating
/// statements, `num_rows` for row-producing ones. `row_count` mirrors
/// whichever side applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Query text as supplied by the caller
    pub query: String,
    /// Whether the statement completed
    pub success: bool,
    /// Rows changed by a mutating statement
    pub affected_rows: u64,
    /// Rows returned by a row-producing statement
    pub num_rows: u64,
    /// Rowid of the last row inserted by this statement
    pub insert_id: Option<i64>,
    /// `affected_rows` or `num_rows`, whichever applies
    pub row_count: u64,
}

impl QueryResult {
    pub fn for_rows(query: &str, num_rows: u64) -> Self {
        QueryResult {
            query: query.to_string(),
            success: true,
            num_rows,
            row_count: num_rows,
            ..QueryResult::default()
        }
    }

    pub fn for_affected(query: &str, count: u64, last_insert_id: Option<i64>) -> Self {
        QueryResult {
            query: query.to_string(),
            success: true,
            affected_rows: count,
            insert_id: last_insert_id,
            row_count: count,
            ..QueryResult::default()
        }
    }
}

/// Trims trailing whitespace and strips one trailing `;`.
///
/// Only a single terminator is removed; `"SELECT 1;;"` becomes `"SELECT 1;"`.
pub fn normalize_statement(sql: &str) -> &str {
    let sql = sql.trim_end();
    sql.strip_suffix(';').unwrap_or(sql)
}
