//! The metadata registry.
//!
//! [`Registry`] holds every descriptor in insertion order and answers lookups
//! by [`EntityKey`]. Registration is two-phase: descriptors are appended with
//! the `register_*` methods (join-column and join-table annotations may arrive
//! after the relation they decorate), then [`Registry::finalize`] merges those
//! join annotations onto their relations. After finalization the registry is
//! shared read-only, typically behind an `Arc`.

use crate::error::{MappingError, Result};
use crate::metadata::{
    ColumnDescriptor, ColumnMode, EntityKey, IndexDescriptor, JoinColumnDescriptor,
    JoinTableDescriptor, ListenerDescriptor, ListenerEvent, RelationDescriptor, TableDescriptor,
};

/// Insertion-ordered store of entity descriptors.
///
/// # Examples
///
/// ```
/// use relata_core::*;
///
/// let mut registry = Registry::new();
/// registry.register_table(TableDescriptor::new("User", "users"));
/// registry.register_column(ColumnDescriptor::new("User", "id", ColumnType::Integer).primary());
/// registry.register_column(ColumnDescriptor::new("User", "name", ColumnType::String));
/// registry.finalize();
///
/// let table = registry.find_table(&EntityKey::from("User")).unwrap();
/// assert_eq!(table.name, "users");
/// assert_eq!(registry.find_columns(&EntityKey::from("User")).len(), 2);
/// assert!(registry.find_table(&EntityKey::from("Ghost")).is_none());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    tables: Vec<TableDescriptor>,
    columns: Vec<ColumnDescriptor>,
    relations: Vec<RelationDescriptor>,
    join_columns: Vec<JoinColumnDescriptor>,
    join_tables: Vec<JoinTableDescriptor>,
    indices: Vec<IndexDescriptor>,
    listeners: Vec<ListenerDescriptor>,
    finalized: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&mut self, table: TableDescriptor) {
        self.tables.push(table);
    }

    pub fn register_column(&mut self, column: ColumnDescriptor) {
        self.columns.push(column);
    }

    pub fn register_relation(&mut self, relation: RelationDescriptor) {
        self.relations.push(relation);
    }

    pub fn register_join_column(&mut self, join: JoinColumnDescriptor) {
        self.join_columns.push(join);
    }

    pub fn register_join_table(&mut self, join: JoinTableDescriptor) {
        self.join_tables.push(join);
    }

    pub fn register_index(&mut self, index: IndexDescriptor) {
        self.indices.push(index);
    }

    pub fn register_listener(&mut self, listener: ListenerDescriptor) {
        self.listeners.push(listener);
    }

    /// Merges join-column and join-table registrations onto the relations
    /// they decorate, matching on owning entity and property name.
    ///
    /// Safe to call more than once; join descriptors registered since the
    /// previous call are merged as well.
    pub fn finalize(&mut self) {
        for relation in &mut self.relations {
            for join in &self.join_columns {
                if join.entity == relation.entity && join.property == relation.property {
                    relation.apply_join_column(join);
                }
            }
            for join in &self.join_tables {
                if join.entity == relation.entity && join.property == relation.property {
                    relation.apply_join_table(join);
                }
            }
        }
        self.finalized = true;
    }

    /// Whether [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// All tables in registration order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn find_table(&self, entity: &EntityKey) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| &t.entity == entity)
    }

    /// Like [`find_table`](Self::find_table) but treats absence as an error.
    pub fn table(&self, entity: &EntityKey) -> Result<&TableDescriptor> {
        self.find_table(entity)
            .ok_or_else(|| MappingError::EntityNotRegistered(entity.clone()))
    }

    pub fn find_columns(&self, entity: &EntityKey) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| &c.entity == entity).collect()
    }

    pub fn find_column(&self, entity: &EntityKey, property: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| &c.entity == entity && c.property == property)
    }

    /// The column flagged primary, or the first registered column.
    pub fn primary_column(&self, entity: &EntityKey) -> Option<&ColumnDescriptor> {
        let mut first = None;
        for column in self.columns.iter().filter(|c| &c.entity == entity) {
            if column.primary {
                return Some(column);
            }
            first.get_or_insert(column);
        }
        first
    }

    /// The first column of `entity` with the given special mode.
    pub fn find_mode_column(&self, entity: &EntityKey, mode: ColumnMode) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| &c.entity == entity && c.mode == mode)
    }

    pub fn find_relations(&self, entity: &EntityKey) -> Vec<&RelationDescriptor> {
        self.relations.iter().filter(|r| &r.entity == entity).collect()
    }

    pub fn find_relation(&self, entity: &EntityKey, property: &str) -> Option<&RelationDescriptor> {
        self.relations
            .iter()
            .find(|r| &r.entity == entity && r.property == property)
    }

    pub fn find_indices(&self, entity: &EntityKey) -> Vec<&IndexDescriptor> {
        self.indices.iter().filter(|i| &i.entity == entity).collect()
    }

    pub fn find_listeners(&self, entity: &EntityKey, event: ListenerEvent) -> Vec<&ListenerDescriptor> {
        self.listeners
            .iter()
            .filter(|l| &l.entity == entity && l.event == event)
            .collect()
    }

    pub fn listeners(&self) -> &[ListenerDescriptor] {
        &self.listeners
    }
}
