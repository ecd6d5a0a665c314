/// Database Module
///
/// This module provides the data-access core of recdb, organized into
/// focused submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): the `Registry` of named handles
/// - **Query Execution** (`query.rs`): the statement cache, `ResultSet` and `Row`
/// - **Row Codec** (`codec.rs`): records to bindable values and rows back to records
/// - **Value Conversion** (`value.rs`): SQLite values rendered as JSON
///
/// ## Error Handling
///
/// All database operations use `RecdbError`; driver errors are carried
/// unchanged in `RecdbError::Database`.
pub mod codec;
pub mod connection;
pub mod query;
pub mod value;

pub use codec::{from_row, to_params};
pub use connection::*;
pub use query::*;
pub use value::*;
