//! Persistence orchestration.
//!
//! A [`Repository`] runs the read and write operations of one entity type
//! against a [`DataSource`]. Saving follows a fixed sequence:
//!
//! 1. cascade-save owning to-one relations, so their keys exist;
//! 2. run `BeforeInsert`/`BeforeUpdate` listeners;
//! 3. stamp create/update timestamps and the version counter;
//! 4. serialize the columns and inject foreign keys;
//! 5. insert or update, assigning a generated key back on insert;
//! 6. run `AfterInsert`/`AfterUpdate` listeners;
//! 7. cascade-save to-many and inverse to-one children, pointing each child's
//!    inverse property at the parent;
//! 8. cascade-save many-to-many items and link each through the junction
//!    table.
//!
//! Statements run one at a time, in that order.

use std::collections::HashSet;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use relata_core::{
    CascadeOp, ColumnMode, Entity, EntityKey, Filter, JoinStrategy, ListenerEvent, MappingError,
    Registry, Related, RelationKind, RelationResolver, Value, transform,
};
use tracing::debug;

use crate::convert::{Materializer, WriteMode, column_values, notify, primary_value};
use crate::error::{OrmError, Result};
use crate::migration::first_count;
use crate::query::{Counter, FindOptions};
use crate::source::DataSource;

/// Entities already written during one `save` call, by type and key.
type Visited = HashSet<String>;

fn visit_key(entity: &EntityKey, id: &Value) -> Option<String> {
    id.identity_key().map(|id| format!("{entity}#{id}"))
}

/// Reads and writes entities of one registered type.
#[derive(Debug, Clone)]
pub struct Repository {
    source: DataSource,
    entity: EntityKey,
}

impl Repository {
    pub(crate) fn new(source: DataSource, entity: EntityKey) -> Self {
        Self { source, entity }
    }

    pub fn entity_key(&self) -> &EntityKey {
        &self.entity
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// A new, unsaved entity of this type.
    pub fn create(&self) -> Entity {
        Entity::new(self.entity.clone())
    }

    /// The entity's primary-key value, or `Null` while it is transient.
    pub fn primary_value<'e>(&self, entity: &'e Entity) -> &'e Value {
        primary_value(self.source.registry(), entity)
    }

    fn primary_property(&self) -> Result<&str> {
        self.source
            .registry()
            .primary_column(&self.entity)
            .map(|c| c.property.as_str())
            .ok_or_else(|| {
                MappingError::UnknownColumn {
                    entity: self.entity.clone(),
                    column: "primary key".to_string(),
                }
                .into()
            })
    }

    /// Inserts or updates `entity` and its cascaded relations.
    ///
    /// The insert path is taken when the primary key is unset; an entity
    /// carrying a key is updated. Use [`insert`](Self::insert) to create a row
    /// under a caller-assigned key.
    pub async fn save(&self, entity: &mut Entity) -> Result<()> {
        let mut visited = Visited::new();
        save_entity(&self.source, entity, &mut visited, false).await
    }

    /// Like [`save`](Self::save), but always inserts `entity` itself, even
    /// when its primary key is already set. Cascaded relations follow the
    /// usual rule.
    pub async fn insert(&self, entity: &mut Entity) -> Result<()> {
        let mut visited = Visited::new();
        save_entity(&self.source, entity, &mut visited, true).await
    }

    /// Saves each entity in order.
    pub async fn save_all(&self, entities: &mut [Entity]) -> Result<()> {
        let mut visited = Visited::new();
        for entity in entities {
            save_entity(&self.source, entity, &mut visited, false).await?;
        }
        Ok(())
    }

    /// Deletes the entity's row, removing cascaded children first.
    ///
    /// # Errors
    ///
    /// [`OrmError::MissingPrimaryKey`] when the primary key is unset.
    pub async fn remove(&self, entity: &mut Entity) -> Result<()> {
        remove_entity(&self.source, entity).await
    }

    /// Loads entities matching `options`, with the requested relations.
    ///
    /// `LIMIT`/`OFFSET` apply to the joined rows, not to root entities.
    pub async fn find(&self, options: &FindOptions) -> Result<Vec<Entity>> {
        let stmt = self.source.builder().select(&self.entity, options)?;
        let rows = self.source.query(&stmt).await?;
        Materializer::new(self.source.registry()).materialize(&self.entity, &rows, &options.relations)
    }

    /// The first entity matching `options`.
    pub async fn find_one(&self, options: &FindOptions) -> Result<Option<Entity>> {
        let mut options = options.clone();
        if options.relations.is_empty() {
            options.limit = Some(1);
        }
        Ok(self.find(&options).await?.into_iter().next())
    }

    /// The entity whose primary key equals `id`.
    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<Entity>> {
        let filter = Filter::by(self.primary_property()?, id);
        self.find_one(&FindOptions::new().filter(filter)).await
    }

    /// Number of rows matching `options`, excluding soft-removed rows unless
    /// `with_deleted` is set.
    pub async fn count(&self, options: &FindOptions) -> Result<u64> {
        let stmt = self.source.builder().count(&self.entity, options)?;
        Ok(first_count(&self.source.query(&stmt).await?))
    }

    pub async fn exists(&self, filter: Filter) -> Result<bool> {
        Ok(self.count(&FindOptions::new().filter(filter)).await? > 0)
    }

    /// Sets `changes` on every row matching `filter` and returns the number
    /// of rows affected.
    ///
    /// Values of registered columns go through the column transform.
    /// Update-timestamp columns are stamped unless `changes` sets them.
    pub async fn update<I, K, V>(&self, filter: &Filter, changes: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let registry = self.source.registry();
        let mut values: Vec<(String, Value)> = Vec::new();
        for (column, value) in changes {
            let column = column.into();
            let value = value.into();
            let value = match registry.find_column(&self.entity, &column) {
                Some(descriptor) => transform::to_database(descriptor, &value),
                None => value,
            };
            values.push((column, value));
        }
        let now = Value::Timestamp(Utc::now());
        for column in registry.find_columns(&self.entity) {
            if column.mode == ColumnMode::UpdateDate && !values.iter().any(|(c, _)| *c == column.property) {
                values.push((column.property.clone(), transform::to_database(column, &now)));
            }
        }
        let stmt = self.source.builder().update(&self.entity, &values, filter)?;
        Ok(self.source.execute(&stmt).await?.rows_affected())
    }

    /// Deletes rows matching `filter`; soft-removes them instead when the
    /// type has a soft-delete column.
    pub async fn delete(&self, filter: &Filter) -> Result<u64> {
        if self
            .source
            .registry()
            .find_mode_column(&self.entity, ColumnMode::DeleteDate)
            .is_some()
        {
            return self.soft_remove(filter).await;
        }
        let stmt = self.source.builder().delete(&self.entity, filter)?;
        Ok(self.source.execute(&stmt).await?.rows_affected())
    }

    /// Stamps the soft-delete column of rows matching `filter`.
    pub async fn soft_remove(&self, filter: &Filter) -> Result<u64> {
        let stmt = self
            .source
            .builder()
            .soft_remove(&self.entity, filter, Utc::now())?;
        Ok(self.source.execute(&stmt).await?.rows_affected())
    }

    /// Clears the soft-delete column of rows matching `filter`.
    pub async fn recover(&self, filter: &Filter) -> Result<u64> {
        let stmt = self.source.builder().recover(&self.entity, filter)?;
        Ok(self.source.execute(&stmt).await?.rows_affected())
    }

    /// Inserts `entity`, or updates the existing row that collides on
    /// `conflict_paths`. The primary key is read back afterwards.
    pub async fn upsert(&self, entity: &mut Entity, conflict_paths: &[&str]) -> Result<()> {
        let registry = self.source.registry();
        let now = Value::Timestamp(Utc::now());
        for column in registry.find_columns(&self.entity) {
            match column.mode {
                ColumnMode::CreateDate if !entity.has(&column.property) => {
                    entity.set(column.property.clone(), now.clone());
                }
                ColumnMode::UpdateDate => entity.set(column.property.clone(), now.clone()),
                _ => {}
            }
        }
        let values = column_values(registry, entity, WriteMode::Insert)?;
        let paths: Vec<String> = conflict_paths.iter().map(|p| p.to_string()).collect();
        let stmt = self.source.builder().upsert(&self.entity, &values, &paths)?;
        self.source.execute(&stmt).await?;

        let primary = self.primary_property()?.to_string();
        if entity.get(&primary).is_null() {
            let filter: Filter = values
                .iter()
                .filter(|(c, _)| paths.contains(c))
                .map(|(c, v)| (c.clone(), v.clone()))
                .collect();
            let stored = self
                .find_one(&FindOptions::new().filter(filter).with_deleted())
                .await?;
            if let Some(stored) = stored {
                entity.set(primary.clone(), stored.get(&primary).clone());
            }
        }
        Ok(())
    }

    /// Adds `by` to `column` on every row matching `filter`.
    pub async fn increment(&self, filter: &Filter, column: &str, by: impl Into<Value>) -> Result<u64> {
        self.counter(filter, column, by.into(), Counter::Increment).await
    }

    /// Subtracts `by` from `column` on every row matching `filter`.
    pub async fn decrement(&self, filter: &Filter, column: &str, by: impl Into<Value>) -> Result<u64> {
        self.counter(filter, column, by.into(), Counter::Decrement).await
    }

    async fn counter(&self, filter: &Filter, column: &str, by: Value, direction: Counter) -> Result<u64> {
        let stmt = self
            .source
            .builder()
            .counter(&self.entity, filter, column, by, direction)?;
        Ok(self.source.execute(&stmt).await?.rows_affected())
    }
}

/// Whether the save of `entity` takes the insert path: its type has no
/// primary key, or the key is unset. Rows with caller-assigned keys are
/// created through [`Repository::insert`].
fn is_new(registry: &Registry, entity: &Entity) -> bool {
    registry
        .primary_column(entity.entity_key())
        .is_none_or(|primary| entity.get(&primary.property).is_null())
}

fn stamp(source: &DataSource, entity: &mut Entity, inserting: bool) {
    let now = Value::Timestamp(Utc::now());
    let key = entity.entity_key().clone();
    for column in source.registry().find_columns(&key) {
        match column.mode {
            ColumnMode::CreateDate if inserting && !entity.has(&column.property) => {
                entity.set(column.property.clone(), now.clone());
            }
            ColumnMode::UpdateDate => entity.set(column.property.clone(), now.clone()),
            ColumnMode::Version => {
                let next = if inserting {
                    1
                } else {
                    entity.get(&column.property).as_i64().unwrap_or(0) + 1
                };
                entity.set(column.property.clone(), next);
            }
            _ => {}
        }
    }
}

fn save_entity<'a>(
    source: &'a DataSource,
    entity: &'a mut Entity,
    visited: &'a mut Visited,
    force_insert: bool,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let registry = source.registry();
        let key = entity.entity_key().clone();
        registry.table(&key)?;

        if let Some(seen) = visit_key(&key, primary_value(registry, entity)) {
            if visited.contains(&seen) {
                return Ok(());
            }
        }

        let inserting = force_insert || is_new(registry, entity);
        let op = if inserting { CascadeOp::Insert } else { CascadeOp::Update };
        let relations = registry.find_relations(&key);
        let resolver = RelationResolver::new(registry);

        for &relation in &relations {
            if !RelationResolver::owns_foreign_key(relation) || !relation.cascade.includes(op) {
                continue;
            }
            if let Some(Related::One(Some(parent))) = entity.relation_mut(&relation.property) {
                save_entity(source, parent, visited, false).await?;
            }
        }

        let before = if inserting { ListenerEvent::BeforeInsert } else { ListenerEvent::BeforeUpdate };
        notify(registry, before, entity)?;

        stamp(source, entity, inserting);

        if inserting {
            let values = column_values(registry, entity, WriteMode::Insert)?;
            let stmt = source.builder().insert(&key, &values)?;
            let result = source.execute(&stmt).await?;
            if let Some(primary) = registry.primary_column(&key) {
                if entity.get(&primary.property).is_null() {
                    if let Some(id) = result.insert_id() {
                        entity.set(primary.property.clone(), id);
                    }
                }
            }
        } else {
            let values = column_values(registry, entity, WriteMode::Update)?;
            if !values.is_empty() {
                if let Some(primary) = registry.primary_column(&key) {
                    let filter = Filter::by(primary.property.clone(), entity.get(&primary.property).clone());
                    let stmt = source.builder().update(&key, &values, &filter)?;
                    source.execute(&stmt).await?;
                }
            }
        }

        if let Some(seen) = visit_key(&key, primary_value(registry, entity)) {
            visited.insert(seen);
        }

        let after = if inserting { ListenerEvent::AfterInsert } else { ListenerEvent::AfterUpdate };
        notify(registry, after, entity)?;

        for &relation in &relations {
            if RelationResolver::owns_foreign_key(relation)
                || relation.kind == RelationKind::ManyToMany
                || !relation.cascade.includes(op)
                || !entity.has_relation(&relation.property)
            {
                continue;
            }
            let resolved = resolver.resolve(relation)?.require_inverse()?;
            let Some(inverse) = resolved.inverse_property().map(str::to_string) else {
                continue;
            };
            let parent = entity.snapshot();
            match entity.relation_mut(&relation.property) {
                Some(Related::Many(children)) => {
                    for child in children.iter_mut() {
                        child.set_one(inverse.clone(), Some(parent.clone()));
                        save_entity(source, child, visited, false).await?;
                    }
                }
                Some(Related::One(Some(child))) => {
                    child.set_one(inverse.clone(), Some(parent.clone()));
                    save_entity(source, child, visited, false).await?;
                }
                _ => {}
            }
        }

        for &relation in &relations {
            if relation.kind != RelationKind::ManyToMany || !entity.has_relation(&relation.property) {
                continue;
            }
            let JoinStrategy::Junction(junction) = resolver.resolve(relation)?.join else {
                continue;
            };
            let owner_id = primary_value(registry, entity).clone();
            let cascade = relation.cascade.includes(op);
            let Some(Related::Many(items)) = entity.relation_mut(&relation.property) else {
                continue;
            };
            for item in items.iter_mut() {
                if cascade {
                    save_entity(source, item, visited, false).await?;
                }
                let item_id = primary_value(registry, item);
                if item_id.is_null() {
                    debug!(relation = %relation.property, "Skipping link to unsaved entity");
                    continue;
                }
                let stmt = source.builder().link(&junction, &owner_id, item_id)?;
                if let Err(err) = source.execute(&stmt).await {
                    debug!(table = %junction.table, error = %err, "Junction row not inserted");
                }
            }
        }

        Ok(())
    }
    .boxed()
}

fn remove_entity<'a>(source: &'a DataSource, entity: &'a mut Entity) -> BoxFuture<'a, Result<()>> {
    async move {
        let registry = source.registry();
        let key = entity.entity_key().clone();
        registry.table(&key)?;
        let primary = registry
            .primary_column(&key)
            .filter(|c| entity.has(&c.property))
            .ok_or_else(|| OrmError::MissingPrimaryKey { entity: key.clone() })?;
        let id = entity.get(&primary.property).clone();

        let resolver = RelationResolver::new(registry);
        for relation in registry.find_relations(&key) {
            if RelationResolver::owns_foreign_key(relation)
                || relation.kind == RelationKind::ManyToMany
                || !relation.cascade.includes(CascadeOp::Remove)
            {
                continue;
            }
            if !entity.has_relation(&relation.property) {
                continue;
            }
            resolver.resolve(relation)?.require_inverse()?;
            match entity.relation_mut(&relation.property) {
                Some(Related::Many(children)) => {
                    for child in children.iter_mut() {
                        if !primary_value(registry, child).is_null() {
                            remove_entity(source, child).await?;
                        }
                    }
                }
                Some(Related::One(Some(child))) => {
                    if !primary_value(registry, child).is_null() {
                        remove_entity(source, child).await?;
                    }
                }
                _ => {}
            }
        }

        notify(registry, ListenerEvent::BeforeRemove, entity)?;
        let stmt = source
            .builder()
            .delete(&key, &Filter::by(primary.property.clone(), id))?;
        source.execute(&stmt).await?;
        notify(registry, ListenerEvent::AfterRemove, entity)?;
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use relata_core::{ColumnType, EntityDefinition, Registry};

    use super::*;
    use crate::config::DataSourceOptions;
    use crate::transport::{ExecResult, Executor, SqliteExecutor};

    async fn source(registry: Registry) -> DataSource {
        let source = DataSource::open(registry, DataSourceOptions::in_memory().with_synchronize(true)).unwrap();
        source.initialize().await.unwrap();
        source
    }

    fn counters() -> Registry {
        let mut registry = Registry::new();
        EntityDefinition::new("Counter", "counters")
            .generated_primary("id")
            .column("name", ColumnType::String)
            .column("hits", ColumnType::Integer)
            .special("createdAt", ColumnType::Datetime, ColumnMode::CreateDate)
            .special("updatedAt", ColumnType::Datetime, ColumnMode::UpdateDate)
            .special("version", ColumnType::Integer, ColumnMode::Version)
            .register(&mut registry);
        registry
    }

    #[tokio::test]
    async fn test_save_stamps_timestamps_and_version() {
        let source = source(counters()).await;
        let repo = source.repository("Counter").unwrap();
        let mut counter = repo.create().with("name", "a").with("hits", 0i64);
        repo.save(&mut counter).await.unwrap();

        assert_eq!(counter.get("id"), &Value::Integer(1));
        assert_eq!(counter.get("version"), &Value::Integer(1));
        let created = counter.get("createdAt").as_timestamp().unwrap();
        assert!(counter.get("updatedAt").as_timestamp().is_some());

        counter.set("hits", 5i64);
        repo.save(&mut counter).await.unwrap();
        assert_eq!(counter.get("version"), &Value::Integer(2));
        assert_eq!(counter.get("createdAt").as_timestamp(), Some(created));

        let stored = repo.find_by_id(1i64).await.unwrap().unwrap();
        assert_eq!(stored.get("hits"), &Value::Integer(5));
        assert_eq!(stored.get("version"), &Value::Integer(2));
        assert_eq!(repo.count(&FindOptions::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let source = source(counters()).await;
        let repo = source.repository("Counter").unwrap();
        let mut counter = repo.create().with("name", "a").with("hits", 10i64);
        repo.save(&mut counter).await.unwrap();

        let filter = Filter::by("name", "a");
        assert_eq!(repo.increment(&filter, "hits", 3i64).await.unwrap(), 1);
        assert_eq!(repo.decrement(&filter, "hits", 1i64).await.unwrap(), 1);
        let stored = repo.find_by_id(1i64).await.unwrap().unwrap();
        assert_eq!(stored.get("hits"), &Value::Integer(12));

        assert!(matches!(
            repo.increment(&Filter::new(), "hits", 1i64).await,
            Err(OrmError::MissingWhereClause { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_stamps_update_date() {
        let source = source(counters()).await;
        let repo = source.repository("Counter").unwrap();
        let mut counter = repo.create().with("name", "a").with("hits", 0i64);
        repo.save(&mut counter).await.unwrap();
        let first = counter.get("updatedAt").as_timestamp().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let affected = repo.update(&Filter::by("id", 1i64), [("hits", 7i64)]).await.unwrap();
        assert_eq!(affected, 1);
        let stored = repo.find_by_id(1i64).await.unwrap().unwrap();
        assert_eq!(stored.get("hits"), &Value::Integer(7));
        assert!(stored.get("updatedAt").as_timestamp().unwrap() > first);
    }

    #[tokio::test]
    async fn test_listeners_run_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        let mut definition = EntityDefinition::new("Note", "notes")
            .generated_primary("id")
            .column("body", ColumnType::String);
        for (method, event) in [
            ("beforeInsert", ListenerEvent::BeforeInsert),
            ("afterInsert", ListenerEvent::AfterInsert),
            ("beforeUpdate", ListenerEvent::BeforeUpdate),
            ("afterUpdate", ListenerEvent::AfterUpdate),
            ("beforeRemove", ListenerEvent::BeforeRemove),
            ("afterRemove", ListenerEvent::AfterRemove),
        ] {
            let calls = calls.clone();
            definition = definition.listener(method, event, move |_| {
                calls.lock().unwrap().push(method);
                Ok(())
            });
        }
        definition.register(&mut registry);

        let source = source(registry).await;
        let repo = source.repository("Note").unwrap();
        let mut note = repo.create().with("body", "x");
        repo.save(&mut note).await.unwrap();
        repo.save(&mut note).await.unwrap();
        repo.remove(&mut note).await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "beforeInsert",
                "afterInsert",
                "beforeUpdate",
                "afterUpdate",
                "beforeRemove",
                "afterRemove",
            ]
        );
        assert!(repo.find_by_id(1i64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_before_insert_listener_can_modify_entity() {
        let mut registry = Registry::new();
        EntityDefinition::new("Slug", "slugs")
            .generated_primary("id")
            .column("title", ColumnType::String)
            .column("slug", ColumnType::String)
            .listener("makeSlug", ListenerEvent::BeforeInsert, |entity| {
                let slug = entity.get("title").as_str().unwrap_or_default().to_lowercase().replace(' ', "-");
                entity.set("slug", slug);
                Ok(())
            })
            .register(&mut registry);
        let source = source(registry).await;
        let repo = source.repository("Slug").unwrap();
        let mut item = repo.create().with("title", "Hello World");
        repo.save(&mut item).await.unwrap();
        let stored = repo.find_by_id(1i64).await.unwrap().unwrap();
        assert_eq!(stored.get("slug"), &Value::Text("hello-world".into()));
    }

    #[tokio::test]
    async fn test_remove_requires_primary_key() {
        let source = source(counters()).await;
        let repo = source.repository("Counter").unwrap();
        let mut transient = repo.create().with("name", "x");
        assert!(matches!(
            repo.remove(&mut transient).await,
            Err(OrmError::MissingPrimaryKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_assigned_primary_key_inserts_then_updates() {
        let mut registry = Registry::new();
        EntityDefinition::new("Setting", "settings")
            .column_with("code", ColumnType::String, |c| c.primary())
            .column("content", ColumnType::String)
            .register(&mut registry);
        let source = source(registry).await;
        let repo = source.repository("Setting").unwrap();

        let mut setting = repo.create().with("code", "theme").with("content", "dark");
        repo.insert(&mut setting).await.unwrap();
        setting.set("content", "light");
        repo.save(&mut setting).await.unwrap();

        assert_eq!(repo.count(&FindOptions::new()).await.unwrap(), 1);
        let stored = repo.find_by_id("theme").await.unwrap().unwrap();
        assert_eq!(stored.get("content"), &Value::Text("light".into()));

        let mut again = repo.create().with("code", "theme").with("content", "x");
        assert!(repo.insert(&mut again).await.is_err());
    }

    /// Passes statements to SQLite and keeps their text.
    struct Recording {
        inner: SqliteExecutor,
        statements: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Executor for Recording {
        async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
            self.statements.lock().unwrap().push(sql.to_string());
            self.inner.execute(sql, params).await
        }
    }

    #[tokio::test]
    async fn test_save_with_assigned_key_issues_only_the_update() {
        let mut registry = Registry::new();
        EntityDefinition::new("Setting", "settings")
            .column_with("code", ColumnType::String, |c| c.primary())
            .column("content", ColumnType::String)
            .register(&mut registry);
        let executor = Arc::new(Recording {
            inner: SqliteExecutor::open_in_memory().unwrap(),
            statements: Mutex::new(Vec::new()),
        });
        let source = DataSource::new(
            registry,
            executor.clone(),
            DataSourceOptions::in_memory().with_synchronize(true),
        );
        source.initialize().await.unwrap();
        let repo = source.repository("Setting").unwrap();
        let mut setting = repo.create().with("code", "theme").with("content", "dark");
        repo.insert(&mut setting).await.unwrap();

        executor.statements.lock().unwrap().clear();
        setting.set("content", "light");
        repo.save(&mut setting).await.unwrap();

        let statements = executor.statements.lock().unwrap().clone();
        assert_eq!(statements, vec!["UPDATE settings SET content = ? WHERE code = ?".to_string()]);
    }

    #[tokio::test]
    async fn test_find_one_and_exists() {
        let source = source(counters()).await;
        let repo = source.repository("Counter").unwrap();
        for name in ["a", "b"] {
            let mut counter = repo.create().with("name", name).with("hits", 0i64);
            repo.save(&mut counter).await.unwrap();
        }
        let found = repo
            .find_one(&FindOptions::new().filter(Filter::by("name", "b")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("id"), &Value::Integer(2));
        assert!(repo.exists(Filter::by("name", "a")).await.unwrap());
        assert!(!repo.exists(Filter::by("name", "z")).await.unwrap());
    }
}
