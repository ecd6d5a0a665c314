/// Recdb Error Module
///
/// This module defines the error type shared by the registry, the statement
/// cache and the entity layer. Driver failures pass through untouched; the
/// remaining variants are the conditions this layer raises on its own.
use thiserror::Error;

/// Error type for every fallible operation in recdb.
///
/// - Driver failures (connect, prepare, bind, execute)
/// - Missing or unusable configuration
/// - Entity validation failures raised by `Entity::validate`
/// - Attribute and key mismatches while hydrating or binding entities
/// - Config file loading
#[derive(Error, Debug)]
pub enum RecdbError {
    /// Errors reported by SQLite, propagated unchanged
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Missing configuration, unsupported driver or incomplete entity declaration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Raised by entity types that override `validate`
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown attribute names or values that cannot be converted
    #[error("Attribute error: {0}")]
    Attribute(String),

    /// Key identifiers that do not line up with the declared key columns
    #[error("Key error: {0}")]
    Key(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML config parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON conversion errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Result to use RecdbError as the error type.
pub type Result<T> = std::result::Result<T, RecdbError>;
