/// Database Module
///
/// The database layer behind the facade, split into focused submodules:
/// - **Driver** (`driver.rs`): the driver boundary and the SQLite driver
/// - **Connection Slots** (`connection.rs`): opened links and the active pointer
/// - **Query Results** (`query.rs`): statement outcomes and per-query bookkeeping
/// - **Row Shapes** (`rows.rs`): values, row-handles and fetched row shapes
///
/// All operations report failures through `DbError`.
pub mod connection;
pub mod driver;
pub mod query;
pub mod rows;

pub use connection::*;
pub use driver::*;
pub use query::*;
pub use rows::*;
