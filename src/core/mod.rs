/// Core Module
///
/// Shared infrastructure for the facade: the error taxonomy and the database
/// layer (driver boundary, connection slots, query results and row shapes).

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, DriverError, Result};
