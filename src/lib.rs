// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod database;

pub use crate::core::db::{
    ConnectTarget, DataRoot, Driver, FetchedRow, QueryResult, ResultMode, SqliteDriver, Value,
};
pub use crate::core::{DbError, DriverError, Result};
pub use database::Database;
