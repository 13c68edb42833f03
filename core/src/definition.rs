//! Fluent registration of a whole entity type.
//!
//! [`EntityDefinition`] collects the descriptors of one entity and appends
//! them to a [`Registry`] in one go. It produces exactly the records the
//! individual `register_*` calls would.

use crate::entity::Entity;
use crate::metadata::{
    ColumnDescriptor, ColumnMode, ColumnType, EntityKey, IndexDescriptor, JoinColumnDescriptor,
    JoinTableDescriptor, ListenerDescriptor, ListenerEvent, RelationDescriptor, RelationKind,
    TableDescriptor,
};
use crate::registry::Registry;

/// Builder for the descriptors of a single entity type.
///
/// # Examples
///
/// ```
/// use relata_core::*;
///
/// let mut registry = Registry::new();
/// EntityDefinition::new("User", "users")
///     .generated_primary("id")
///     .column("email", ColumnType::String)
///     .column_with("nickname", ColumnType::String, |c| c.nullable())
///     .special("createdAt", ColumnType::Datetime, ColumnMode::CreateDate)
///     .relation_with("posts", RelationKind::OneToMany, "Post", |r| r.with_cascade(true))
///     .unique_index(["email"])
///     .register(&mut registry);
/// registry.finalize();
///
/// let user = EntityKey::from("User");
/// assert_eq!(registry.find_columns(&user).len(), 4);
/// assert_eq!(registry.primary_column(&user).unwrap().property, "id");
/// assert_eq!(registry.find_indices(&user).len(), 1);
/// ```
#[derive(Debug)]
pub struct EntityDefinition {
    key: EntityKey,
    table: TableDescriptor,
    columns: Vec<ColumnDescriptor>,
    relations: Vec<RelationDescriptor>,
    join_columns: Vec<JoinColumnDescriptor>,
    join_tables: Vec<JoinTableDescriptor>,
    indices: Vec<IndexDescriptor>,
    listeners: Vec<ListenerDescriptor>,
}

impl EntityDefinition {
    pub fn new(entity: impl Into<EntityKey>, table: impl Into<String>) -> Self {
        let key = entity.into();
        Self {
            table: TableDescriptor::new(key.clone(), table),
            key,
            columns: Vec::new(),
            relations: Vec::new(),
            join_columns: Vec::new(),
            join_tables: Vec::new(),
            indices: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Integer primary key assigned by the database.
    pub fn generated_primary(self, property: impl Into<String>) -> Self {
        self.column_with(property, ColumnType::Integer, |c| c.primary().generated())
    }

    pub fn column(self, property: impl Into<String>, column_type: ColumnType) -> Self {
        self.column_with(property, column_type, |c| c)
    }

    /// Adds a column, letting `configure` set flags or a transformer.
    pub fn column_with(
        mut self,
        property: impl Into<String>,
        column_type: ColumnType,
        configure: impl FnOnce(ColumnDescriptor) -> ColumnDescriptor,
    ) -> Self {
        let column = ColumnDescriptor::new(self.key.clone(), property, column_type);
        self.columns.push(configure(column));
        self
    }

    /// Adds a timestamp, soft-delete or version column.
    pub fn special(self, property: impl Into<String>, column_type: ColumnType, mode: ColumnMode) -> Self {
        self.column_with(property, column_type, |c| c.with_mode(mode))
    }

    pub fn relation(
        self,
        property: impl Into<String>,
        kind: RelationKind,
        related: impl Into<EntityKey>,
    ) -> Self {
        self.relation_with(property, kind, related, |r| r)
    }

    /// Adds a relation, letting `configure` set cascade, inverse side or
    /// referential action.
    pub fn relation_with(
        mut self,
        property: impl Into<String>,
        kind: RelationKind,
        related: impl Into<EntityKey>,
        configure: impl FnOnce(RelationDescriptor) -> RelationDescriptor,
    ) -> Self {
        let relation = RelationDescriptor::to(self.key.clone(), property, kind, related);
        self.relations.push(configure(relation));
        self
    }

    /// Adds a relation whose related type is produced by a deferred thunk.
    pub fn lazy_relation(
        mut self,
        property: impl Into<String>,
        kind: RelationKind,
        target: impl Fn() -> Option<EntityKey> + Send + Sync + 'static,
        configure: impl FnOnce(RelationDescriptor) -> RelationDescriptor,
    ) -> Self {
        let relation = RelationDescriptor::new(self.key.clone(), property, kind, target);
        self.relations.push(configure(relation));
        self
    }

    /// Marks `property` as the owning side of a to-one relation.
    pub fn join_column(mut self, property: impl Into<String>, name: Option<&str>) -> Self {
        let mut join = JoinColumnDescriptor::new(self.key.clone(), property);
        join.name = name.map(str::to_string);
        self.join_columns.push(join);
        self
    }

    /// Marks `property` as the owning side of a many-to-many relation.
    pub fn join_table(mut self, property: impl Into<String>, name: Option<&str>) -> Self {
        let mut join = JoinTableDescriptor::new(self.key.clone(), property);
        join.name = name.map(str::to_string);
        self.join_tables.push(join);
        self
    }

    pub fn index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.push(IndexDescriptor::new(self.key.clone(), columns));
        self
    }

    pub fn unique_index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices
            .push(IndexDescriptor::new(self.key.clone(), columns).unique());
        self
    }

    pub fn listener(
        mut self,
        method: impl Into<String>,
        event: ListenerEvent,
        callback: impl Fn(&mut Entity) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.listeners
            .push(ListenerDescriptor::new(self.key.clone(), method, event, callback));
        self
    }

    /// Appends every collected descriptor to `registry`.
    ///
    /// Join annotations take effect at the next [`Registry::finalize`].
    pub fn register(self, registry: &mut Registry) {
        registry.register_table(self.table);
        for column in self.columns {
            registry.register_column(column);
        }
        for relation in self.relations {
            registry.register_relation(relation);
        }
        for join in self.join_columns {
            registry.register_join_column(join);
        }
        for join in self.join_tables {
            registry.register_join_table(join);
        }
        for index in self.indices {
            registry.register_index(index);
        }
        for listener in self.listeners {
            registry.register_listener(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_annotations_applied_on_finalize() {
        let mut registry = Registry::new();
        EntityDefinition::new("Post", "posts")
            .generated_primary("id")
            .relation("author", RelationKind::ManyToOne, "User")
            .relation("tags", RelationKind::ManyToMany, "Tag")
            .join_column("author", Some("writer_id"))
            .join_table("tags", Some("post_tag_links"))
            .register(&mut registry);
        registry.finalize();

        let post = EntityKey::from("Post");
        let author = registry.find_relation(&post, "author").unwrap();
        assert!(author.join_column);
        assert_eq!(author.join_column_name.as_deref(), Some("writer_id"));
        let tags = registry.find_relation(&post, "tags").unwrap();
        assert!(tags.join_table);
        assert_eq!(tags.join_table_name.as_deref(), Some("post_tag_links"));
    }

    #[test]
    fn test_special_columns_keep_mode() {
        let mut registry = Registry::new();
        EntityDefinition::new("Doc", "docs")
            .generated_primary("id")
            .special("deletedAt", ColumnType::Datetime, ColumnMode::DeleteDate)
            .special("version", ColumnType::Integer, ColumnMode::Version)
            .register(&mut registry);

        let doc = EntityKey::from("Doc");
        let deleted = registry.find_mode_column(&doc, ColumnMode::DeleteDate).unwrap();
        assert_eq!(deleted.property, "deletedAt");
        assert!(deleted.nullable);
        assert!(registry.find_mode_column(&doc, ColumnMode::Version).is_some());
    }
}
