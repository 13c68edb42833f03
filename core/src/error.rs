//! Error types for metadata lookup and relation resolution.

use thiserror::Error;

use crate::metadata::EntityKey;

/// Errors raised while interpreting registered entity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The entity type has no [`TableDescriptor`](crate::TableDescriptor).
    #[error("entity not registered: {0}")]
    EntityNotRegistered(EntityKey),

    /// The related-type thunk yielded nothing, or a type without a table.
    #[error("relation {entity}.{property} could not be resolved to a registered entity")]
    UnresolvedRelation { entity: EntityKey, property: String },

    /// No relation with the given property name exists on the entity.
    #[error("entity {entity} has no relation named '{property}'")]
    UnknownRelation { entity: EntityKey, property: String },

    /// No column with the given property name exists on the entity.
    #[error("entity {entity} has no column named '{column}'")]
    UnknownColumn { entity: EntityKey, column: String },

    /// The inverse side of a one-to-many/one-to-one relation is missing, so
    /// only the placeholder foreign key name is available.
    #[error(
        "relation {entity}.{property} has no owning inverse relation; refusing to use placeholder foreign key"
    )]
    MissingInverseRelation { entity: EntityKey, property: String },

    /// A table, column or index name is not a plain SQL identifier.
    #[error("invalid identifier '{0}': must contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),
}

/// Convenience alias for results with [`MappingError`].
pub type Result<T> = std::result::Result<T, MappingError>;
