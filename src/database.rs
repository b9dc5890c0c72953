//! Database Facade
//!
//! Owns the links it opened, runs text queries against the active one, keeps
//! the outcome of the last query and optionally retains row-handles for reuse.
//! Mutating calls return `&mut Self` so they chain:
//!
//! ```no_run
//! use dbfacade::Database;
//!
//! let mut db = Database::in_memory();
//! db.connect("localhost", "app", "secret", "shop", None)?
//!     .execute("SELECT 1 AS x")?;
//! let rows = db.fetch_all_rows();
//! # Ok::<(), dbfacade::DbError>(())
//! ```
//!
//! A facade is single-threaded; share it by passing `&mut Database` around
//! or give each thread its own.

use crate::config::Config;
use crate::core::db::{
    normalize_statement, ConnectTarget, ConnectionSet, Driver, FetchedRow, QueryResult,
    ResultMode, RowSet, SqliteDriver, StatementOutcome, Value,
};
use crate::core::{DbError, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

/// Row-handle that fetch calls read from
#[derive(Debug)]
enum ActiveRows {
    Fresh(RowSet),
    Cached(usize),
}

/// A retained row-handle and the query that produced it
#[derive(Debug)]
struct CachedResult {
    query: String,
    rows: RowSet,
}

pub struct Database<D: Driver = SqliteDriver> {
    driver: D,
    links: ConnectionSet<D::Link>,
    result: QueryResult,
    rows: Option<ActiveRows>,
    cache: Vec<CachedResult>,
    mode: Option<ResultMode>,
}

impl Database<SqliteDriver> {
    /// Facade over in-memory SQLite databases
    pub fn in_memory() -> Self {
        Database::new(SqliteDriver::in_memory())
    }

    /// Builds the driver from `[sqlite]` and connects every profile in order.
    ///
    /// The last profile's link ends up active.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut db = Database::new(config.sqlite.driver());
        for profile in &config.connections {
            db.connect_target(&profile.target())?;
        }
        Ok(db)
    }
}

impl<D: Driver> Database<D> {
    pub fn new(driver: D) -> Self {
        Database {
            driver,
            links: ConnectionSet::new(),
            result: QueryResult::default(),
            rows: None,
            cache: Vec::new(),
            mode: None,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Opens a new link, selects `database` on it and makes it active.
    ///
    /// The result mode is reset to [`ResultMode::Assoc`]. When the database
    /// cannot be selected the link is closed again and nothing is appended.
    pub fn connect(
        &mut self,
        host: &str,
        login: &str,
        password: &str,
        database: &str,
        port: Option<u16>,
    ) -> Result<&mut Self> {
        let target = ConnectTarget {
            host: host.to_string(),
            login: login.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            port,
        };
        self.connect_target(&target)
    }

    pub fn connect_target(&mut self, target: &ConnectTarget) -> Result<&mut Self> {
        require_text("host", &target.host)?;
        require_text("login", &target.login)?;
        require_text("password", &target.password)?;
        require_text("database", &target.database)?;
        if target.port == Some(0) {
            return Err(DbError::Config("port must be a positive integer".to_string()));
        }

        let mut link = self.driver.connect(target).map_err(|e| DbError::Connection {
            database: target.database.clone(),
            message: e.message,
        })?;
        if let Err(e) = self.driver.select_database(&mut link, &target.database) {
            self.driver.close(link);
            return Err(DbError::Connection {
                database: target.database.clone(),
                message: e.message,
            });
        }

        let index = self.links.push(link);
        self.mode = Some(ResultMode::Assoc);
        debug!(
            "Connection {} open to {} (database {})",
            index,
            target.address(),
            target.database
        );
        Ok(self)
    }

    /// Makes the link at `index` the one subsequent operations use.
    pub fn select_active_connection(&mut self, index: usize) -> Result<&mut Self> {
        self.links.select(index)?;
        debug!("Connection {} is now active", index);
        Ok(self)
    }

    /// Selects another database on the active link
    pub fn select_database(&mut self, name: &str) -> Result<&mut Self> {
        require_text("database", name)?;
        let link = self.links.active_mut()?;
        self.driver
            .select_database(link, name)
            .map_err(|e| DbError::Connection {
                database: name.to_string(),
                message: e.message,
            })?;
        Ok(self)
    }

    /// Runs `sql` on the active link.
    ///
    /// The previous result is cleared first and stays cleared if the
    /// statement fails. One trailing `;` is stripped before the statement is
    /// sent.
    pub fn execute(&mut self, sql: &str) -> Result<&mut Self> {
        self.run(sql, false)
    }

    /// Like [`Database::execute`], but a row-producing statement's handle is
    /// also appended to the result cache.
    pub fn execute_cached(&mut self, sql: &str) -> Result<&mut Self> {
        self.run(sql, true)
    }

    fn run(&mut self, sql: &str, cache: bool) -> Result<&mut Self> {
        require_text("query", sql)?;
        self.result = QueryResult::default();
        self.rows = None;

        let statement = normalize_statement(sql);
        if statement.trim().is_empty() {
            return Err(DbError::Config("query must not be empty".to_string()));
        }

        let link = self.links.active_mut()?;
        let outcome = self
            .driver
            .execute(link, statement)
            .map_err(|e| DbError::Query {
                query: sql.to_string(),
                message: e.message,
            })?;

        match outcome {
            StatementOutcome::Affected { count, last_insert_id } => {
                debug!("Statement affected {} rows", count);
                self.result = QueryResult::for_affected(sql, count, last_insert_id);
            }
            StatementOutcome::Rows(rows) => {
                debug!("Statement returned {} rows", rows.len());
                self.result = QueryResult::for_rows(sql, rows.len() as u64);
                if cache {
                    self.cache.push(CachedResult {
                        query: sql.to_string(),
                        rows,
                    });
                    let id = self.cache.len() - 1;
                    debug!("Cached result {}", id);
                    self.rows = Some(ActiveRows::Cached(id));
                } else {
                    self.rows = Some(ActiveRows::Fresh(rows));
                }
            }
        }
        Ok(self)
    }

    /// Index of the newest cache entry
    pub fn last_cache_id(&self) -> Option<usize> {
        self.cache.len().checked_sub(1)
    }

    /// Makes a cached row-handle current again.
    ///
    /// The handle is rewound to its first row and the row counts are taken
    /// from it, so `num_rows` and `row_count` describe the cached result.
    pub fn use_cached_query(&mut self, cache_id: usize) -> Result<&mut Self> {
        let cached_count = self.cache.len();
        let cached = self.cache.get_mut(cache_id).ok_or_else(|| {
            DbError::State(format!(
                "no cached result with id {} ({} cached)",
                cache_id, cached_count
            ))
        })?;
        cached.rows.rewind();
        self.result = QueryResult::for_rows(&cached.query, cached.rows.len() as u64);
        self.rows = Some(ActiveRows::Cached(cache_id));
        Ok(self)
    }

    pub fn set_result_mode(&mut self, mode: ResultMode) -> &mut Self {
        self.mode = Some(mode);
        self
    }

    /// Current result mode; `None` until the first connect
    pub fn result_mode(&self) -> Option<ResultMode> {
        self.mode
    }

    /// Next row in the current result mode, or `None` when there is no
    /// row-handle or it is exhausted.
    pub fn fetch_row(&mut self) -> Option<FetchedRow> {
        let mode = self.mode.unwrap_or_default();
        self.current_rows()?.next_row(mode)
    }

    /// Drains the remaining rows, collecting `column` from each.
    ///
    /// Rows are read by name whatever the result mode; a missing column
    /// yields [`Value::Null`].
    pub fn fetch_column(&mut self, column: &str) -> Vec<Value> {
        let mut values = Vec::new();
        if let Some(rows) = self.current_rows() {
            while let Some(row) = rows.next_row(ResultMode::Assoc) {
                values.push(row.get(column).unwrap_or(Value::Null));
            }
        }
        values
    }

    /// Drains the remaining rows in the current result mode
    pub fn fetch_all_rows(&mut self) -> Vec<FetchedRow> {
        let mode = self.mode.unwrap_or_default();
        let mut fetched = Vec::new();
        if let Some(rows) = self.current_rows() {
            while let Some(row) = rows.next_row(mode) {
                fetched.push(row);
            }
        }
        fetched
    }

    /// Drains the remaining rows into a `key_column -> value_column` map.
    ///
    /// Rows are read by name; the caller's result mode is left untouched.
    /// Later rows overwrite earlier ones with the same key.
    pub fn fetch_key_value_map(
        &mut self,
        key_column: &str,
        value_column: &str,
    ) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        if let Some(rows) = self.current_rows() {
            while let Some(row) = rows.next_row(ResultMode::Assoc) {
                let key = row.get(key_column).unwrap_or(Value::Null).as_key();
                map.insert(key, row.get(value_column).unwrap_or(Value::Null));
            }
        }
        map
    }

    /// Next row decoded into `T`, whatever the result mode.
    pub fn fetch_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.current_rows().and_then(|rows| rows.next_row(ResultMode::Record)) {
            Some(FetchedRow::Record(record)) => record.deserialize().map(Some),
            _ => Ok(None),
        }
    }

    /// Escapes `text` for a single-quoted literal using the active link's driver.
    ///
    /// Text the driver cannot represent in a literal is rejected rather than
    /// altered.
    pub fn escape(&self, text: &str) -> Result<String> {
        let link = self.links.active()?;
        self.driver
            .escape(link, text)
            .map_err(|e| DbError::Config(format!("cannot escape text: {}", e.message)))
    }

    /// Closes the active link only. Returns `false` if there was nothing
    /// open to close or the driver failed to close it.
    pub fn close(&mut self) -> bool {
        match self.links.take_active() {
            Some(link) => self.driver.close(link),
            None => false,
        }
    }

    /// Closes every link still open. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        for link in self.links.take_all() {
            self.driver.close(link);
        }
    }

    pub fn query_result(&self) -> &QueryResult {
        &self.result
    }

    pub fn affected_rows(&self) -> u64 {
        self.result.affected_rows
    }

    pub fn num_rows(&self) -> u64 {
        self.result.num_rows
    }

    pub fn row_count(&self) -> u64 {
        self.result.row_count
    }

    pub fn insert_id(&self) -> Option<i64> {
        self.result.insert_id
    }

    pub fn last_query(&self) -> &str {
        &self.result.query
    }

    pub fn succeeded(&self) -> bool {
        self.result.success
    }

    /// Links opened so far, closed ones included
    pub fn connection_count(&self) -> usize {
        self.links.len()
    }

    pub fn active_connection(&self) -> Option<usize> {
        self.links.active_index()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn current_rows(&mut self) -> Option<&mut RowSet> {
        match self.rows.as_mut()? {
            ActiveRows::Fresh(rows) => Some(rows),
            ActiveRows::Cached(id) => self.cache.get_mut(*id).map(|cached| &mut cached.rows),
        }
    }
}

impl<D: Driver> Drop for Database<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn require_text(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DbError::Config(format!("{} must not be empty", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(database: &str) -> Database {
        let mut db = Database::in_memory();
        db.connect("localhost", "u", "p", database, None).unwrap();
        db
    }

    #[test]
    fn test_connect_appends_and_activates() {
        let mut db = Database::in_memory();
        assert_eq!(db.result_mode(), None);
        assert_eq!(db.connection_count(), 0);

        db.connect("localhost", "u", "p", "facade_connect", None).unwrap();
        assert_eq!(db.connection_count(), 1);
        assert_eq!(db.active_connection(), Some(0));
        assert_eq!(db.result_mode(), Some(ResultMode::Assoc));

        db.set_result_mode(ResultMode::Positional);
        db.connect("localhost", "u", "p", "facade_connect", Some(3306)).unwrap();
        assert_eq!(db.connection_count(), 2);
        assert_eq!(db.active_connection(), Some(1));
        assert_eq!(db.result_mode(), Some(ResultMode::Assoc));
    }

    #[test]
    fn test_connect_validation() {
        let mut db = Database::in_memory();
        for (host, login, password, database, port) in [
            ("", "u", "p", "d", None),
            ("h", "", "p", "d", None),
            ("h", "u", "", "d", None),
            ("h", "u", "p", "", None),
            ("h", "u", "p", "d", Some(0)),
        ] {
            match db.connect(host, login, password, database, port) {
                Err(DbError::Config(_)) => {}
                other => panic!("Expected Config error, got {:?}", other.err()),
            }
        }
        assert_eq!(db.connection_count(), 0);
    }

    #[test]
    fn test_blank_password_is_text() {
        let mut db = Database::in_memory();
        db.connect("localhost", "u", " ", "facade_blank_password", None).unwrap();
        assert_eq!(db.connection_count(), 1);
    }

    #[test]
    fn test_failed_selection_appends_nothing() {
        let mut db = Database::in_memory();
        match db.connect("localhost", "u", "p", "bad/name", None) {
            Err(DbError::Connection { database, message }) => {
                assert_eq!(database, "bad/name");
                assert!(message.contains("Unknown database"));
            }
            other => panic!("Expected Connection error, got {:?}", other.err()),
        }
        assert_eq!(db.connection_count(), 0);
        assert_eq!(db.result_mode(), None);
    }

    #[test]
    fn test_operations_without_connection() {
        let mut db = Database::in_memory();
        assert!(matches!(db.execute("SELECT 1"), Err(DbError::State(_))));
        assert!(matches!(db.escape("x"), Err(DbError::State(_))));
        assert!(matches!(db.select_database("x"), Err(DbError::State(_))));
        assert!(db.fetch_row().is_none());
        assert!(!db.close());
    }

    #[test]
    fn test_execute_rejects_empty_query() {
        let mut db = connected("facade_empty");
        assert!(matches!(db.execute(""), Err(DbError::Config(_))));
        assert!(matches!(db.execute("   "), Err(DbError::Config(_))));
        assert!(matches!(db.execute(";"), Err(DbError::Config(_))));
    }

    #[test]
    fn test_failed_query_leaves_result_reset() {
        let mut db = connected("facade_failed");
        db.execute("SELECT 1 AS x").unwrap();
        assert_eq!(db.num_rows(), 1);

        match db.execute("SELECT * FROM nowhere") {
            Err(DbError::Query { query, message }) => {
                assert_eq!(query, "SELECT * FROM nowhere");
                assert!(message.contains("no such table"));
            }
            other => panic!("Expected Query error, got {:?}", other.err()),
        }
        assert_eq!(db.query_result(), &QueryResult::default());
        assert!(db.fetch_row().is_none());
    }

    #[test]
    fn test_mutating_statement_counts() {
        let mut db = connected("facade_mutating");
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap()
            .execute("INSERT INTO t (id, name) VALUES (5, 'five');")
            .unwrap();
        assert_eq!(db.affected_rows(), 1);
        assert_eq!(db.insert_id(), Some(5));
        assert!(db.succeeded());

        db.execute("DELETE FROM t WHERE id=5").unwrap();
        assert_eq!(db.affected_rows(), 1);
        assert_eq!(db.row_count(), 1);
        assert_eq!(db.num_rows(), 0);
        assert_eq!(db.last_query(), "DELETE FROM t WHERE id=5");
    }

    #[test]
    fn test_cache_and_reuse() {
        let mut db = connected("facade_cache");
        assert_eq!(db.last_cache_id(), None);

        db.execute_cached("SELECT 1 AS x UNION ALL SELECT 2").unwrap();
        assert_eq!(db.cache_len(), 1);
        assert_eq!(db.last_cache_id(), Some(0));

        db.execute("SELECT 'other' AS y").unwrap();
        assert_eq!(db.cache_len(), 1);

        db.use_cached_query(0).unwrap();
        assert_eq!(db.num_rows(), 2);
        assert_eq!(db.row_count(), 2);
        assert_eq!(
            db.fetch_column("x"),
            vec![Value::Integer(1), Value::Integer(2)]
        );

        // Reusing rewinds the handle
        db.use_cached_query(0).unwrap();
        assert_eq!(db.fetch_all_rows().len(), 2);

        assert!(matches!(db.use_cached_query(1), Err(DbError::State(_))));
    }

    #[test]
    fn test_mutating_statement_is_never_cached() {
        let mut db = connected("facade_cache_mut");
        db.execute_cached("CREATE TABLE c (id INTEGER)").unwrap();
        assert_eq!(db.cache_len(), 0);
        assert_eq!(db.last_cache_id(), None);
    }

    #[test]
    fn test_key_value_map_keeps_mode() {
        let mut db = connected("facade_kv");
        db.set_result_mode(ResultMode::Positional);
        db.execute("SELECT 'a' AS k, 1 AS v UNION ALL SELECT 'b', 2 UNION ALL SELECT 'a', 3")
            .unwrap();

        let map = db.fetch_key_value_map("k", "v");
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], Value::Integer(3));
        assert_eq!(map["b"], Value::Integer(2));
        assert_eq!(db.result_mode(), Some(ResultMode::Positional));
    }

    #[test]
    fn test_close_and_teardown() {
        let mut db = connected("facade_close");
        db.connect("localhost", "u", "p", "facade_close", None).unwrap();

        assert!(db.close());
        assert!(!db.close());
        assert_eq!(db.connection_count(), 2);
        assert!(matches!(db.execute("SELECT 1"), Err(DbError::State(_))));

        db.select_active_connection(0).unwrap();
        db.execute("SELECT 1").unwrap();

        db.teardown();
        db.teardown();
        assert!(matches!(db.execute("SELECT 1"), Err(DbError::State(_))));
    }

    #[test]
    fn test_escape_through_active_link() {
        let db = connected("facade_escape");
        assert_eq!(db.escape("it's").unwrap(), "it''s");

        match db.escape("a\0b") {
            Err(DbError::Config(msg)) => assert!(msg.contains("NUL")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_counts_belong_to_each_statement() {
        let mut db = connected("facade_stale_counts");
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        assert_eq!(db.affected_rows(), 0);
        assert_eq!(db.insert_id(), None);

        db.execute("INSERT INTO t (id, name) VALUES (5, 'a'), (6, 'b'), (7, 'c')")
            .unwrap();
        assert_eq!(db.affected_rows(), 3);
        assert_eq!(db.insert_id(), Some(7));

        db.execute("CREATE TABLE other (a)").unwrap();
        assert_eq!(db.affected_rows(), 0);
        assert_eq!(db.row_count(), 0);
        assert_eq!(db.insert_id(), None);

        db.execute("DELETE FROM t WHERE id=5").unwrap();
        assert_eq!(db.affected_rows(), 1);
        assert_eq!(db.row_count(), 1);
        assert_eq!(db.insert_id(), None);

        db.execute("UPDATE t SET name = 'z' WHERE id = 99").unwrap();
        assert_eq!(db.affected_rows(), 0);
        assert_eq!(db.insert_id(), None);

        db.execute("UPDATE t SET name = 'z'").unwrap();
        assert_eq!(db.affected_rows(), 2);
        assert_eq!(db.insert_id(), None);
    }
}
