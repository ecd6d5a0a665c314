//! A small SQLite data-access layer.
//!
//! - [`Registry`] owns one handle per configuration name and opens it on
//!   first use.
//! - Each [`Db`] caches prepared statements by exact query text and offers
//!   row, rows, column and field helpers over positional parameters.
//! - [`entity::Entity`] turns a serde record type into something that can
//!   be loaded by key, validated and saved.

// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod entity;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::config::{load_config, Config, DbConfig};
pub use crate::core::db::{Attributes, Db, PreparedStatement, Registry, ResultSet, Row, DEFAULT_NAME};
pub use crate::core::{RecdbError, Result};
pub use crate::entity::{Bound, Entity, Key};
pub use rusqlite::types::Value;
pub use rusqlite::Connection;
