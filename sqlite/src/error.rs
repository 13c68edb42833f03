//! Error types for SQL generation, execution, and persistence.
//!
//! Provides a unified error type covering metadata failures, the safety rails
//! of the statement builders, transport failures, and configuration loading.

use relata_core::{EntityKey, MappingError};
use thiserror::Error;

/// Errors that can occur while generating or executing statements.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Metadata lookup or relation resolution failure, including
    /// [`MappingError::EntityNotRegistered`].
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// `remove` called on an entity without a primary key value.
    #[error("cannot remove {entity}: primary key is not set")]
    MissingPrimaryKey { entity: EntityKey },

    /// A filtered mutation was invoked with an empty filter.
    #[error("{operation} requires a non-empty filter")]
    MissingWhereClause { operation: &'static str },

    /// A statement could not be built from the given arguments, e.g. an
    /// update with no columns or an upsert without conflict paths.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// Soft-remove or recover on an entity without a soft-delete column.
    #[error("entity {entity} has no soft-delete column")]
    MissingSoftDeleteColumn { entity: EntityKey },

    /// `transaction` called while another transaction is open.
    #[error("nested transactions are not supported")]
    NestedTransaction,

    /// A lifecycle listener rejected the operation.
    #[error("listener {entity}.{method} failed: {message}")]
    Listener {
        entity: EntityKey,
        method: String,
        message: String,
    },

    /// SQLite database operation failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failure reported by a non-SQLite transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Row value could not be converted.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Configuration file could not be parsed or written.
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results with [`OrmError`].
pub type Result<T> = std::result::Result<T, OrmError>;
