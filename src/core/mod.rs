/// Core Module for Recdb
///
/// This module contains the connection registry, the statement cache and
/// the error type the rest of the crate builds on.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{RecdbError, Result};
