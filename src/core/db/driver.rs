/// Driver Module
///
/// The boundary between the facade and a database driver, and the SQLite
/// implementation of it built on rusqlite.

use super::query::StatementOutcome;
use super::rows::{RowSet, Value};
use crate::core::DriverError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Database names a driver will accept
static DATABASE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").unwrap());

/// File extension used for databases under a directory root
const DATABASE_FILE_EXTENSION: &str = "sqlite3";

/// Where to connect and which database to select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub login: String,
    pub password: String,
    pub database: String,
    pub port: Option<u16>,
}

impl ConnectTarget {
    pub fn new(
        host: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        ConnectTarget {
            host: host.into(),
            login: login.into(),
            password: password.into(),
            database: database.into(),
            port: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// `host` or `host:port`
    pub fn address(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

/// Operations the facade needs from a database driver.
///
/// Every call blocks until the driver answers.
pub trait Driver {
    /// One open connection
    type Link;

    /// Opens a connection to the target's host. Database selection is a
    /// separate step.
    fn connect(&self, target: &ConnectTarget) -> Result<Self::Link, DriverError>;

    fn select_database(&self, link: &mut Self::Link, name: &str) -> Result<(), DriverError>;

    /// Runs one statement and reports either its rows or its changes.
    fn execute(&self, link: &mut Self::Link, sql: &str) -> Result<StatementOutcome, DriverError>;

    /// Escapes text for use inside a single-quoted literal.
    fn escape(&self, link: &Self::Link, text: &str) -> Result<String, DriverError>;

    /// Closes the link, reporting whether the driver closed it cleanly.
    fn close(&self, link: Self::Link) -> bool;
}

/// Where SQLite databases live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataRoot {
    /// Named shared-cache in-memory databases
    #[default]
    Memory,
    /// One `<name>.sqlite3` file per database under this directory
    Directory(PathBuf),
}

/// SQLite driver.
///
/// SQLite has no server or accounts: host and login only label the link in
/// logs, and the password is ignored.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    root: DataRoot,
    create_missing: bool,
    busy_timeout: Option<Duration>,
}

/// An open SQLite link.
#[derive(Debug)]
pub struct SqliteLink {
    host: String,
    connection: Connection,
    database: Option<String>,
}

impl SqliteLink {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Currently selected database, if any
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl SqliteDriver {
    /// Driver over in-memory databases
    pub fn in_memory() -> Self {
        SqliteDriver::default()
    }

    /// Driver over database files in `root`
    pub fn in_directory(root: impl Into<PathBuf>) -> Self {
        SqliteDriver {
            root: DataRoot::Directory(root.into()),
            ..SqliteDriver::default()
        }
    }

    /// Create database files that do not exist yet on selection
    pub fn with_create_missing(mut self, create_missing: bool) -> Self {
        self.create_missing = create_missing;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn root(&self) -> &DataRoot {
        &self.root
    }

    fn open(&self, name: &str) -> Result<Connection, DriverError> {
        let connection = match &self.root {
            DataRoot::Memory => {
                let uri = format!("file:{}?mode=memory&cache=shared", name);
                Connection::open_with_flags(
                    uri,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?
            }
            DataRoot::Directory(root) => {
                let path = root.join(format!("{}.{}", name, DATABASE_FILE_EXTENSION));
                if !self.create_missing && !path.is_file() {
                    return Err(DriverError::new(format!("Unknown database '{}'", name)));
                }
                let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                if self.create_missing {
                    flags |= OpenFlags::SQLITE_OPEN_CREATE;
                }
                Connection::open_with_flags(path, flags)?
            }
        };

        if let Some(timeout) = self.busy_timeout {
            connection.busy_timeout(timeout)?;
        }
        Ok(connection)
    }
}

fn total_changes(connection: &Connection) -> Result<i64, DriverError> {
    Ok(connection.query_row("SELECT total_changes()", [], |row| row.get(0))?)
}

/// Statements whose rows get fresh rowids
fn is_insert(sql: &str) -> bool {
    let keyword = sql.split_whitespace().next().unwrap_or("");
    keyword.eq_ignore_ascii_case("INSERT") || keyword.eq_ignore_ascii_case("REPLACE")
}

impl Driver for SqliteDriver {
    type Link = SqliteLink;

    fn connect(&self, target: &ConnectTarget) -> Result<SqliteLink, DriverError> {
        if let DataRoot::Directory(root) = &self.root {
            if !root.is_dir() {
                return Err(DriverError::new(format!(
                    "Can't connect to '{}': data directory {:?} does not exist",
                    target.address(),
                    root
                )));
            }
        }

        // Scratch session until a database is selected
        let connection = Connection::open_in_memory()?;
        debug!("Connected to {} as {}", target.address(), target.login);
        Ok(SqliteLink {
            host: target.address(),
            connection,
            database: None,
        })
    }

    fn select_database(&self, link: &mut SqliteLink, name: &str) -> Result<(), DriverError> {
        if !DATABASE_NAME.is_match(name) {
            return Err(DriverError::new(format!("Unknown database '{}'", name)));
        }

        link.connection = self.open(name)?;
        link.database = Some(name.to_string());
        debug!("Selected database {} on {}", name, link.host);
        Ok(())
    }

    fn execute(&self, link: &mut SqliteLink, sql: &str) -> Result<StatementOutcome, DriverError> {
        let mut stmt = link.connection.prepare(sql)?;

        if stmt.column_count() == 0 {
            // changes() and last_insert_rowid() keep their values across
            // statements that touch no rows
            let changes_before = total_changes(&link.connection)?;
            let rowid_before = link.connection.last_insert_rowid();
            let executed = stmt.execute([])?;
            let count = if total_changes(&link.connection)? == changes_before {
                0
            } else {
                executed as u64
            };

            let rowid_after = link.connection.last_insert_rowid();
            let last_insert_id = if count > 0 && (is_insert(sql) || rowid_after != rowid_before) {
                Some(rowid_after)
            } else {
                None
            };
            return Ok(StatementOutcome::Affected { count, last_insert_id });
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();
        let mut rows = stmt.query([])?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(Value::from(row.get_ref(i)?));
            }
            collected.push(values);
        }

        Ok(StatementOutcome::Rows(RowSet::new(columns, collected)))
    }

    fn escape(&self, link: &SqliteLink, text: &str) -> Result<String, DriverError> {
        // quote() stops at the first NUL
        if text.contains('\0') {
            return Err(DriverError::new("text contains a NUL character"));
        }

        let quoted: String = link
            .connection
            .query_row("SELECT quote(?1)", [text], |row| row.get(0))?;
        quoted
            .strip_prefix('\'')
            .and_then(|q| q.strip_suffix('\''))
            .map(str::to_string)
            .ok_or_else(|| DriverError::new(format!("unexpected quote() result: {}", quoted)))
    }

    fn close(&self, link: SqliteLink) -> bool {
        match link.connection.close() {
            Ok(()) => {
                debug!("Closed connection to {}", link.host);
                true
            }
            Err((_, e)) => {
                warn!("Failed to close connection to {}: {}", link.host, e);
                false
            }
        }
    }
}
