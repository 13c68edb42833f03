//! Relation resolution.
//!
//! Given a [`RelationDescriptor`], [`RelationResolver`] decides which side
//! stores the foreign key, what that column (or junction table) is called, and
//! which registered table the relation points at. Rules, in priority order:
//!
//! 1. many-to-one, or one-to-one with a join column: the owner stores the FK,
//!    named by the explicit join column name or `<property>Id`;
//! 2. one-to-many: the related type stores the FK, reusing the column of its
//!    many-to-one back to the owner;
//! 3. one-to-one without a join column: as (2), matching a one-to-one with a
//!    join column on the related type;
//! 4. many-to-many: a junction table `<ownerTable>_<relatedTable>` (or the
//!    registered name) with columns `<ownerTable>Id` and `<relatedTable>Id`.
//!
//! When (2) or (3) finds no inverse relation, the placeholder column name
//! [`PLACEHOLDER_FOREIGN_KEY`] is reported with
//! [`JoinStrategy::Inverse::inverse_property`] set to `None`; callers must
//! treat that as a configuration error.

use crate::error::{MappingError, Result};
use crate::metadata::{EntityKey, RelationDescriptor, RelationKind, TableDescriptor};
use crate::registry::Registry;

/// Column name reported when an inverse foreign key cannot be found.
pub const PLACEHOLDER_FOREIGN_KEY: &str = "foreignKey";

/// Junction table backing a many-to-many relation, oriented from the
/// relation owner's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub table: String,
    /// Column referencing the relation owner's primary key.
    pub owner_column: String,
    /// Column referencing the related entity's primary key.
    pub related_column: String,
    /// `false` when this side reuses the junction declared by the other side.
    pub owning: bool,
}

/// Where the foreign key of a relation lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinStrategy {
    /// The owner's table stores `column`, referencing the related primary key.
    Owner { column: String },
    /// The related table stores `column`, referencing the owner's primary key.
    Inverse {
        column: String,
        /// Property of the related type holding the back reference; `None`
        /// when no inverse relation was found and `column` is the placeholder.
        inverse_property: Option<String>,
    },
    /// A junction table links both sides.
    Junction(Junction),
}

/// A relation together with the tables it connects.
#[derive(Debug, Clone)]
pub struct ResolvedRelation<'r> {
    pub relation: &'r RelationDescriptor,
    pub owner: &'r TableDescriptor,
    pub related: &'r TableDescriptor,
    pub join: JoinStrategy,
}

impl ResolvedRelation<'_> {
    /// `true` when the foreign key had to fall back to the placeholder name.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.join,
            JoinStrategy::Inverse {
                inverse_property: None,
                ..
            }
        )
    }

    /// Fails with [`MappingError::MissingInverseRelation`] for placeholder
    /// joins, so they are diagnosed instead of executed.
    pub fn require_inverse(self) -> Result<Self> {
        if self.is_placeholder() {
            return Err(MappingError::MissingInverseRelation {
                entity: self.relation.entity.clone(),
                property: self.relation.property.clone(),
            });
        }
        Ok(self)
    }

    /// Name of the property on the related type pointing back at the owner.
    pub fn inverse_property(&self) -> Option<&str> {
        match &self.join {
            JoinStrategy::Inverse {
                inverse_property, ..
            } => inverse_property.as_deref(),
            _ => None,
        }
    }
}

/// Applies the relation rules against a [`Registry`].
///
/// # Examples
///
/// ```
/// use relata_core::*;
///
/// let mut registry = Registry::new();
/// registry.register_table(TableDescriptor::new("User", "users"));
/// registry.register_table(TableDescriptor::new("Post", "posts"));
/// registry.register_relation(RelationDescriptor::to("Post", "author", RelationKind::ManyToOne, "User"));
/// registry.register_relation(RelationDescriptor::to("User", "posts", RelationKind::OneToMany, "Post"));
/// registry.finalize();
///
/// let resolver = RelationResolver::new(&registry);
/// let posts = registry.find_relation(&EntityKey::from("User"), "posts").unwrap();
/// let resolved = resolver.resolve(posts).unwrap();
/// assert_eq!(
///     resolved.join,
///     JoinStrategy::Inverse { column: "authorId".into(), inverse_property: Some("author".into()) }
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'r> {
    registry: &'r Registry,
}

impl<'r> RelationResolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// `true` when this side of the relation stores the foreign key column.
    pub fn owns_foreign_key(relation: &RelationDescriptor) -> bool {
        match relation.kind {
            RelationKind::ManyToOne => true,
            RelationKind::OneToOne => relation.join_column,
            _ => false,
        }
    }

    /// FK column name for an owning to-one relation.
    pub fn join_column_name(relation: &RelationDescriptor) -> String {
        relation
            .join_column_name
            .clone()
            .unwrap_or_else(|| format!("{}Id", relation.property))
    }

    /// Resolves the related entity key, caching the first success.
    ///
    /// A thunk that yields nothing, or a key without a registered table,
    /// leaves the relation unresolved.
    pub fn target_key(&self, relation: &RelationDescriptor) -> Option<EntityKey> {
        if let Some(cached) = relation.cached_target() {
            return Some(cached.clone());
        }
        let key = relation.evaluate_target()?;
        self.registry.find_table(&key)?;
        relation.remember_target(key.clone());
        Some(key)
    }

    /// The related table, or [`MappingError::UnresolvedRelation`].
    pub fn target_table(&self, relation: &RelationDescriptor) -> Result<&'r TableDescriptor> {
        self.target_key(relation)
            .and_then(|key| self.registry.find_table(&key))
            .ok_or_else(|| MappingError::UnresolvedRelation {
                entity: relation.entity.clone(),
                property: relation.property.clone(),
            })
    }

    /// Resolves `property` on `entity` by name.
    pub fn resolve_property(&self, entity: &EntityKey, property: &str) -> Result<ResolvedRelation<'r>> {
        let relation = self
            .registry
            .find_relation(entity, property)
            .ok_or_else(|| MappingError::UnknownRelation {
                entity: entity.clone(),
                property: property.to_string(),
            })?;
        self.resolve(relation)
    }

    /// Determines FK ownership and naming for `relation`.
    pub fn resolve(&self, relation: &'r RelationDescriptor) -> Result<ResolvedRelation<'r>> {
        let owner = self.registry.table(&relation.entity)?;
        let related = self.target_table(relation)?;

        let join = if Self::owns_foreign_key(relation) {
            JoinStrategy::Owner {
                column: Self::join_column_name(relation),
            }
        } else if relation.kind == RelationKind::ManyToMany {
            JoinStrategy::Junction(self.junction(relation, owner, related))
        } else {
            match self.inverse_relation(relation) {
                Some(inverse) if Self::owns_foreign_key(inverse) => JoinStrategy::Inverse {
                    column: Self::join_column_name(inverse),
                    inverse_property: Some(inverse.property.clone()),
                },
                _ => JoinStrategy::Inverse {
                    column: PLACEHOLDER_FOREIGN_KEY.to_string(),
                    inverse_property: None,
                },
            }
        };

        Ok(ResolvedRelation {
            relation,
            owner,
            related,
            join,
        })
    }

    /// Finds the relation on the related type that points back at the owner.
    ///
    /// An explicit inverse side wins; otherwise the related type's relations
    /// are scanned for the kind that mirrors this one.
    pub fn inverse_relation(&self, relation: &RelationDescriptor) -> Option<&'r RelationDescriptor> {
        let related = self.target_key(relation)?;

        if let Some(property) = relation.inverse.as_ref().and_then(|inv| inv.property()) {
            return self.registry.find_relation(&related, &property);
        }

        self.registry
            .find_relations(&related)
            .into_iter()
            .find(|candidate| {
                let mirrors = match relation.kind {
                    RelationKind::OneToMany => candidate.kind == RelationKind::ManyToOne,
                    RelationKind::OneToOne if relation.join_column => {
                        candidate.kind == RelationKind::OneToOne && !candidate.join_column
                    }
                    RelationKind::OneToOne => {
                        candidate.kind == RelationKind::OneToOne && candidate.join_column
                    }
                    RelationKind::ManyToOne => candidate.kind == RelationKind::OneToMany,
                    RelationKind::ManyToMany => candidate.kind == RelationKind::ManyToMany,
                };
                mirrors && self.target_key(candidate).as_ref() == Some(&relation.entity)
            })
    }

    fn junction(
        &self,
        relation: &RelationDescriptor,
        owner: &TableDescriptor,
        related: &TableDescriptor,
    ) -> Junction {
        if !relation.join_table {
            if let Some(inverse) = self
                .inverse_relation(relation)
                .filter(|inv| inv.kind == RelationKind::ManyToMany && inv.join_table)
            {
                let own = Self::owned_junction(inverse, related, owner);
                return Junction {
                    table: own.table,
                    owner_column: own.related_column,
                    related_column: own.owner_column,
                    owning: false,
                };
            }
        }
        Self::owned_junction(relation, owner, related)
    }

    fn owned_junction(
        relation: &RelationDescriptor,
        owner: &TableDescriptor,
        related: &TableDescriptor,
    ) -> Junction {
        Junction {
            table: relation
                .join_table_name
                .clone()
                .unwrap_or_else(|| format!("{}_{}", owner.name, related.name)),
            owner_column: format!("{}Id", owner.name),
            related_column: format!("{}Id", related.name),
            owning: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{JoinColumnDescriptor, JoinTableDescriptor};

    fn key(name: &str) -> EntityKey {
        EntityKey::from(name)
    }

    fn blog_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_table(TableDescriptor::new("User", "users"));
        registry.register_table(TableDescriptor::new("Post", "posts"));
        registry.register_table(TableDescriptor::new("Tag", "tags"));
        registry.register_table(TableDescriptor::new("Profile", "profiles"));
        registry.register_relation(RelationDescriptor::to("User", "posts", RelationKind::OneToMany, "Post"));
        registry.register_relation(RelationDescriptor::to("Post", "author", RelationKind::ManyToOne, "User"));
        registry.register_relation(RelationDescriptor::to("Post", "tags", RelationKind::ManyToMany, "Tag"));
        registry.register_relation(RelationDescriptor::to("Tag", "posts", RelationKind::ManyToMany, "Post"));
        registry.register_relation(RelationDescriptor::to("User", "profile", RelationKind::OneToOne, "Profile"));
        registry.register_relation(RelationDescriptor::to("Profile", "user", RelationKind::OneToOne, "User"));
        registry.register_join_column(JoinColumnDescriptor::new("Profile", "user"));
        registry.register_join_table(JoinTableDescriptor::new("Post", "tags"));
        registry.finalize();
        registry
    }

    #[test]
    fn test_many_to_one_owns_default_column() {
        let registry = blog_registry();
        let resolved = RelationResolver::new(&registry)
            .resolve_property(&key("Post"), "author")
            .unwrap();
        assert_eq!(resolved.join, JoinStrategy::Owner { column: "authorId".into() });
        assert_eq!(resolved.related.name, "users");
    }

    #[test]
    fn test_one_to_one_with_join_column_owns_fk() {
        let registry = blog_registry();
        let resolved = RelationResolver::new(&registry)
            .resolve_property(&key("Profile"), "user")
            .unwrap();
        assert_eq!(resolved.join, JoinStrategy::Owner { column: "userId".into() });
    }

    #[test]
    fn test_one_to_one_inverse_side_reuses_owner_column() {
        let registry = blog_registry();
        let resolved = RelationResolver::new(&registry)
            .resolve_property(&key("User"), "profile")
            .unwrap();
        assert_eq!(
            resolved.join,
            JoinStrategy::Inverse {
                column: "userId".into(),
                inverse_property: Some("user".into()),
            }
        );
    }

    #[test]
    fn test_one_to_many_without_inverse_uses_placeholder() {
        let mut registry = Registry::new();
        registry.register_table(TableDescriptor::new("User", "users"));
        registry.register_table(TableDescriptor::new("Comment", "comments"));
        registry.register_relation(RelationDescriptor::to(
            "User",
            "comments",
            RelationKind::OneToMany,
            "Comment",
        ));
        registry.finalize();

        let resolved = RelationResolver::new(&registry)
            .resolve_property(&key("User"), "comments")
            .unwrap();
        assert!(resolved.is_placeholder());
        assert_eq!(
            resolved.join,
            JoinStrategy::Inverse {
                column: PLACEHOLDER_FOREIGN_KEY.into(),
                inverse_property: None,
            }
        );
        assert!(matches!(
            resolved.require_inverse(),
            Err(MappingError::MissingInverseRelation { .. })
        ));
    }

    #[test]
    fn test_explicit_join_column_name_is_reused_by_inverse() {
        let mut registry = Registry::new();
        registry.register_table(TableDescriptor::new("User", "users"));
        registry.register_table(TableDescriptor::new("Post", "posts"));
        registry.register_relation(
            RelationDescriptor::to("User", "posts", RelationKind::OneToMany, "Post").with_inverse("writer"),
        );
        registry.register_relation(RelationDescriptor::to("Post", "writer", RelationKind::ManyToOne, "User"));
        registry.register_join_column(JoinColumnDescriptor::new("Post", "writer").named("written_by"));
        registry.finalize();

        let resolved = RelationResolver::new(&registry)
            .resolve_property(&key("User"), "posts")
            .unwrap();
        assert_eq!(
            resolved.join,
            JoinStrategy::Inverse {
                column: "written_by".into(),
                inverse_property: Some("writer".into()),
            }
        );
    }

    #[test]
    fn test_many_to_many_owning_junction() {
        let registry = blog_registry();
        let resolved = RelationResolver::new(&registry)
            .resolve_property(&key("Post"), "tags")
            .unwrap();
        assert_eq!(
            resolved.join,
            JoinStrategy::Junction(Junction {
                table: "posts_tags".into(),
                owner_column: "postsId".into(),
                related_column: "tagsId".into(),
                owning: true,
            })
        );
    }

    #[test]
    fn test_many_to_many_inverse_reuses_junction() {
        let registry = blog_registry();
        let resolved = RelationResolver::new(&registry)
            .resolve_property(&key("Tag"), "posts")
            .unwrap();
        assert_eq!(
            resolved.join,
            JoinStrategy::Junction(Junction {
                table: "posts_tags".into(),
                owner_column: "tagsId".into(),
                related_column: "postsId".into(),
                owning: false,
            })
        );
    }

    #[test]
    fn test_forward_reference_resolves_once_registered() {
        let mut registry = Registry::new();
        registry.register_table(TableDescriptor::new("Post", "posts"));
        registry.register_relation(RelationDescriptor::to("Post", "author", RelationKind::ManyToOne, "User"));
        registry.finalize();

        {
            let resolver = RelationResolver::new(&registry);
            let relation = registry.find_relation(&key("Post"), "author").unwrap();
            assert!(matches!(
                resolver.resolve(relation),
                Err(MappingError::UnresolvedRelation { .. })
            ));
            assert!(relation.cached_target().is_none());
        }

        registry.register_table(TableDescriptor::new("User", "users"));
        let resolver = RelationResolver::new(&registry);
        let relation = registry.find_relation(&key("Post"), "author").unwrap();
        assert_eq!(resolver.resolve(relation).unwrap().related.name, "users");
        assert_eq!(relation.cached_target(), Some(&key("User")));
    }

    #[test]
    fn test_thunk_returning_nothing_is_unresolved() {
        let mut registry = Registry::new();
        registry.register_table(TableDescriptor::new("Post", "posts"));
        registry.register_relation(RelationDescriptor::new(
            "Post",
            "ghost",
            RelationKind::ManyToOne,
            || None,
        ));
        let resolver = RelationResolver::new(&registry);
        let relation = registry.find_relation(&key("Post"), "ghost").unwrap();
        assert!(resolver.target_key(relation).is_none());
        assert!(resolver.resolve(relation).is_err());
    }
}
