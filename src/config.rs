use crate::core::db::{ConnectTarget, SqliteDriver};
use crate::core::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionProfile>,
}

/// SQLite driver configuration.
#[derive(Debug, Default, Deserialize)]
pub struct SqliteConfig {
    /// Directory holding `<database>.sqlite3` files; in-memory when absent
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub create_missing: bool,
    pub busy_timeout_ms: Option<u64>,
}

impl SqliteConfig {
    /// Builds the driver this section describes.
    pub fn driver(&self) -> SqliteDriver {
        let driver = match &self.root {
            Some(root) => SqliteDriver::in_directory(root.clone()),
            None => SqliteDriver::in_memory(),
        };
        let driver = driver.with_create_missing(self.create_missing);
        match self.busy_timeout_ms {
            Some(ms) => driver.with_busy_timeout(Duration::from_millis(ms)),
            None => driver,
        }
    }
}

/// One connection to open at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionProfile {
    pub host: String,
    pub login: String,
    pub password: String,
    pub database: String,
    pub port: Option<u16>,
}

impl ConnectionProfile {
    pub fn target(&self) -> ConnectTarget {
        ConnectTarget {
            host: self.host.clone(),
            login: self.login.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            port: self.port,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = dbfacade::config::load_config("dbfacade.toml")?;
/// let db = dbfacade::Database::from_config(&config)?;
/// # Ok::<(), dbfacade::DbError>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}

/// `<config dir>/dbfacade/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dbfacade").join("config.toml"))
}
