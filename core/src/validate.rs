//! Registry validation.
//!
//! Catches metadata that would otherwise fail late or, worse, execute against
//! the wrong columns: relations whose related type never resolves, inverse
//! relations that fall back to the placeholder foreign key, duplicate primary
//! columns, and names that cannot be spliced into SQL as identifiers.
//!
//! # Examples
//!
//! ```
//! use relata_core::*;
//!
//! let mut registry = Registry::new();
//! registry.register_table(TableDescriptor::new("User", "users"));
//! registry.register_column(ColumnDescriptor::new("User", "id", ColumnType::Integer).primary());
//! registry.register_relation(RelationDescriptor::to("User", "ghosts", RelationKind::OneToMany, "Ghost"));
//! registry.finalize();
//!
//! let errors = validate_registry(&registry);
//! assert!(errors.iter().any(|e| matches!(e, ValidationError::UnresolvedRelation { .. })));
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::error::{MappingError, Result};
use crate::metadata::{EntityKey, RelationKind};
use crate::registry::Registry;
use crate::relation::{JoinStrategy, RelationResolver};

/// Registry validation findings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A table name, column name or index name is not a plain identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    /// Two entity types registered under the same key.
    #[error("entity registered more than once: {0}")]
    DuplicateEntity(EntityKey),
    /// A table has no columns at all.
    #[error("entity {0} has no columns")]
    NoColumns(EntityKey),
    /// More than one column flagged primary on the same entity.
    #[error("entity {0} declares more than one primary column")]
    DuplicatePrimaryColumn(EntityKey),
    /// A column, relation, index or listener belongs to an unregistered entity.
    #[error("descriptor references unregistered entity {0}")]
    UnregisteredOwner(EntityKey),
    /// The related-type thunk never yields a registered entity.
    #[error("relation {entity}.{property} does not resolve to a registered entity")]
    UnresolvedRelation { entity: EntityKey, property: String },
    /// The inverse FK lookup fell back to the placeholder column.
    #[error("relation {entity}.{property} has no owning inverse relation (placeholder foreign key)")]
    PlaceholderForeignKey { entity: EntityKey, property: String },
    /// A self-referencing many-to-many junction would have two identical columns.
    #[error("junction for {entity}.{property} has colliding column names")]
    JunctionColumnCollision { entity: EntityKey, property: String },
    /// An index lists a column that is not registered on its entity.
    #[error("index on {entity} references unknown column '{column}'")]
    UnknownIndexColumn { entity: EntityKey, column: String },
}

/// Checks that `name` can be used verbatim as an SQL identifier.
///
/// # Examples
///
/// ```
/// use relata_core::validate_identifier;
///
/// assert!(validate_identifier("user_accounts").is_ok());
/// assert!(validate_identifier("drop;--").is_err());
/// assert!(validate_identifier("").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(MappingError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Validates every descriptor in `registry`.
///
/// Returns all findings; an empty vector means the metadata is usable.
pub fn validate_registry(registry: &Registry) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let resolver = RelationResolver::new(registry);

    let mut seen: HashSet<&EntityKey> = HashSet::new();
    for table in registry.tables() {
        if !seen.insert(&table.entity) {
            errors.push(ValidationError::DuplicateEntity(table.entity.clone()));
            continue;
        }
        if validate_identifier(&table.name).is_err() {
            errors.push(ValidationError::InvalidIdentifier(table.name.clone()));
        }

        let columns = registry.find_columns(&table.entity);
        if columns.is_empty() {
            errors.push(ValidationError::NoColumns(table.entity.clone()));
        }
        if columns.iter().filter(|c| c.primary).count() > 1 {
            errors.push(ValidationError::DuplicatePrimaryColumn(table.entity.clone()));
        }
        for column in &columns {
            if validate_identifier(&column.property).is_err() {
                errors.push(ValidationError::InvalidIdentifier(column.property.clone()));
            }
        }

        for index in registry.find_indices(&table.entity) {
            for column in &index.columns {
                if registry.find_column(&table.entity, column).is_none() {
                    errors.push(ValidationError::UnknownIndexColumn {
                        entity: table.entity.clone(),
                        column: column.clone(),
                    });
                }
            }
            if let Some(name) = &index.name {
                if validate_identifier(name).is_err() {
                    errors.push(ValidationError::InvalidIdentifier(name.clone()));
                }
            }
        }

        for relation in registry.find_relations(&table.entity) {
            let resolved = match resolver.resolve(relation) {
                Ok(resolved) => resolved,
                Err(_) => {
                    errors.push(ValidationError::UnresolvedRelation {
                        entity: relation.entity.clone(),
                        property: relation.property.clone(),
                    });
                    continue;
                }
            };
            if resolved.is_placeholder() {
                errors.push(ValidationError::PlaceholderForeignKey {
                    entity: relation.entity.clone(),
                    property: relation.property.clone(),
                });
            }
            if relation.kind == RelationKind::ManyToMany {
                if let JoinStrategy::Junction(junction) = &resolved.join {
                    if junction.owner_column == junction.related_column {
                        errors.push(ValidationError::JunctionColumnCollision {
                            entity: relation.entity.clone(),
                            property: relation.property.clone(),
                        });
                    }
                }
            }
        }
    }

    for listener in registry.listeners() {
        if registry.find_table(&listener.entity).is_none() {
            errors.push(ValidationError::UnregisteredOwner(listener.entity.clone()));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        ColumnDescriptor, ColumnType, IndexDescriptor, ListenerDescriptor, ListenerEvent,
        RelationDescriptor, TableDescriptor,
    };

    fn users() -> Registry {
        let mut registry = Registry::new();
        registry.register_table(TableDescriptor::new("User", "users"));
        registry.register_column(ColumnDescriptor::new("User", "id", ColumnType::Integer).primary());
        registry.register_column(ColumnDescriptor::new("User", "email", ColumnType::String));
        registry
    }

    #[test]
    fn test_valid_registry_has_no_errors() {
        let mut registry = users();
        registry.register_index(IndexDescriptor::new("User", ["email"]).unique());
        registry.finalize();
        assert!(validate_registry(&registry).is_empty());
    }

    #[test]
    fn test_duplicate_primary_detected() {
        let mut registry = users();
        registry.register_column(ColumnDescriptor::new("User", "uuid", ColumnType::String).primary());
        assert!(validate_registry(&registry).contains(&ValidationError::DuplicatePrimaryColumn(
            EntityKey::from("User")
        )));
    }

    #[test]
    fn test_placeholder_foreign_key_detected() {
        let mut registry = users();
        registry.register_table(TableDescriptor::new("Post", "posts"));
        registry.register_column(ColumnDescriptor::new("Post", "id", ColumnType::Integer).primary());
        registry.register_relation(RelationDescriptor::to("User", "posts", RelationKind::OneToMany, "Post"));
        registry.finalize();

        let errors = validate_registry(&registry);
        assert_eq!(
            errors,
            vec![ValidationError::PlaceholderForeignKey {
                entity: EntityKey::from("User"),
                property: "posts".into(),
            }]
        );
    }

    #[test]
    fn test_unknown_index_column_detected() {
        let mut registry = users();
        registry.register_index(IndexDescriptor::new("User", ["nickname"]));
        assert!(matches!(
            validate_registry(&registry).as_slice(),
            [ValidationError::UnknownIndexColumn { .. }]
        ));
    }

    #[test]
    fn test_invalid_table_name_detected() {
        let mut registry = Registry::new();
        registry.register_table(TableDescriptor::new("Bad", "bad table"));
        registry.register_column(ColumnDescriptor::new("Bad", "id", ColumnType::Integer));
        assert!(validate_registry(&registry)
            .contains(&ValidationError::InvalidIdentifier("bad table".into())));
    }

    #[test]
    fn test_listener_on_unregistered_entity_detected() {
        let mut registry = users();
        registry.register_listener(ListenerDescriptor::new(
            "Ghost",
            "boo",
            ListenerEvent::AfterLoad,
            |_| Ok(()),
        ));
        assert!(validate_registry(&registry)
            .contains(&ValidationError::UnregisteredOwner(EntityKey::from("Ghost"))));
    }

    #[test]
    fn test_self_referencing_many_to_many_collision() {
        let mut registry = users();
        registry.register_relation(RelationDescriptor::to("User", "friends", RelationKind::ManyToMany, "User"));
        registry.finalize();
        assert!(validate_registry(&registry).contains(&ValidationError::JunctionColumnCollision {
            entity: EntityKey::from("User"),
            property: "friends".into(),
        }));
    }
}
