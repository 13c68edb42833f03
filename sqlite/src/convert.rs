//! Conversion between [`Entity`] records and SQL rows.
//!
//! Reading goes through [`Materializer`], which folds the flat, possibly
//! duplicated rows of a joined select into one entity per root primary key.
//! Writing goes through [`column_values`], which serializes an entity into the
//! `(column, value)` pairs the insert and update builders take.
//!
//! Both directions apply the column transform rule from
//! [`relata_core::transform`].

use std::collections::{HashMap, HashSet};

use relata_core::{
    Entity, EntityKey, ListenerEvent, Registry, Related, RelationResolver,
    Value, transform,
};

use crate::error::{OrmError, Result};
use crate::transport::Row;

static NULL: Value = Value::Null;

/// The entity's primary-key value, or `Null` when unset or undeclared.
pub fn primary_value<'e>(registry: &Registry, entity: &'e Entity) -> &'e Value {
    match registry.primary_column(entity.entity_key()) {
        Some(column) => entity.get(&column.property),
        None => &NULL,
    }
}

/// Runs every listener registered for `event` on the entity's type, in
/// registration order. The first failure stops the chain.
pub(crate) fn notify(registry: &Registry, event: ListenerEvent, entity: &mut Entity) -> Result<()> {
    let key = entity.entity_key().clone();
    for listener in registry.find_listeners(&key, event) {
        listener.invoke(entity).map_err(|message| OrmError::Listener {
            entity: key.clone(),
            method: listener.method.clone(),
            message,
        })?;
    }
    Ok(())
}

/// Which columns [`column_values`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every assigned column; a generated primary key is left out while it
    /// is still `Null`.
    Insert,
    /// Every assigned column except the primary key, which filters the update.
    Update,
}

/// Serializes an entity for an insert or update.
///
/// Assigned properties go through the column transform; unassigned ones are
/// omitted. Each owning to-one relation then contributes its foreign key,
/// taken from the loaded related entity when present, otherwise from a
/// property named like the foreign-key column.
pub fn column_values(registry: &Registry, entity: &Entity, mode: WriteMode) -> Result<Vec<(String, Value)>> {
    let key = entity.entity_key();
    registry.table(key)?;
    let primary = registry.primary_column(key).map(|c| c.property.as_str());
    let mut values = Vec::new();

    for column in registry.find_columns(key) {
        if !entity.is_set(&column.property) {
            continue;
        }
        let value = entity.get(&column.property);
        if Some(column.property.as_str()) == primary {
            match mode {
                WriteMode::Update => continue,
                WriteMode::Insert if column.generated && value.is_null() => continue,
                WriteMode::Insert => {}
            }
        }
        values.push((column.property.clone(), transform::to_database(column, value)));
    }

    for relation in registry.find_relations(key) {
        if !RelationResolver::owns_foreign_key(relation) {
            continue;
        }
        let fk = RelationResolver::join_column_name(relation);
        if values.iter().any(|(c, _)| *c == fk) {
            continue;
        }
        let value = match entity.relation(&relation.property) {
            Some(Related::One(Some(related))) => primary_value(registry, related).to_param(),
            Some(Related::One(None)) => Value::Null,
            _ if entity.is_set(&fk) => entity.get(&fk).to_param(),
            _ => continue,
        };
        values.push((fk, value));
    }

    Ok(values)
}

/// One eagerly loaded relation, resolved once per materialization.
struct Eager {
    name: String,
    to_many: bool,
    related: EntityKey,
    primary: String,
}

/// Folds joined rows into entities.
///
/// # Examples
///
/// ```
/// use relata_core::*;
/// use relata_sqlite::{Materializer, Row};
///
/// let mut registry = Registry::new();
/// EntityDefinition::new("User", "users")
///     .generated_primary("id")
///     .column("name", ColumnType::String)
///     .relation("posts", RelationKind::OneToMany, "Post")
///     .register(&mut registry);
/// EntityDefinition::new("Post", "posts")
///     .generated_primary("id")
///     .column("title", ColumnType::String)
///     .relation("author", RelationKind::ManyToOne, "User")
///     .register(&mut registry);
/// registry.finalize();
///
/// let rows = vec![
///     Row::new().with("id", 1i64).with("name", "ann").with("posts_id", 10i64).with("posts_title", "a"),
///     Row::new().with("id", 1i64).with("name", "ann").with("posts_id", 11i64).with("posts_title", "b"),
/// ];
/// let users = Materializer::new(&registry)
///     .materialize(&EntityKey::from("User"), &rows, &["posts".to_string()])
///     .unwrap();
/// assert_eq!(users.len(), 1);
/// assert_eq!(users[0].many("posts").len(), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Materializer<'r> {
    registry: &'r Registry,
}

impl<'r> Materializer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Builds an entity from the columns of `row` aliased `<prefix><property>`.
    ///
    /// Columns missing from the row are left unset.
    pub fn hydrate(&self, entity: &EntityKey, row: &Row, prefix: &str) -> Entity {
        let mut out = Entity::new(entity.clone());
        for column in self.registry.find_columns(entity) {
            let alias = format!("{prefix}{}", column.property);
            if row.contains(&alias) {
                out.set(
                    column.property.clone(),
                    transform::from_database(column, row.get(&alias)),
                );
            }
        }
        out
    }

    /// Groups `rows` by the root primary key and nests the eager relations.
    ///
    /// Roots are returned in first-seen order; for each root the first row
    /// wins for scalar columns. To-many relations are de-duplicated by the
    /// related primary key. `AfterLoad` listeners run once per root.
    pub fn materialize(&self, entity: &EntityKey, rows: &[Row], relations: &[String]) -> Result<Vec<Entity>> {
        let resolver = RelationResolver::new(self.registry);
        let mut eager = Vec::with_capacity(relations.len());
        for name in relations {
            let resolved = resolver.resolve_property(entity, name)?;
            let related = resolved.related.entity.clone();
            let primary = self
                .registry
                .primary_column(&related)
                .map(|c| c.property.clone())
                .unwrap_or_else(|| "id".to_string());
            eager.push(Eager {
                name: name.clone(),
                to_many: resolved.relation.kind.is_to_many(),
                related,
                primary,
            });
        }

        let root_primary = self.registry.primary_column(entity).map(|c| c.property.as_str());
        let mut roots: Vec<Entity> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut seen: HashMap<(usize, usize), HashSet<String>> = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let identity = root_primary
                .and_then(|pk| row.get(pk).identity_key())
                .unwrap_or_else(|| format!("row:{idx}"));

            let position = match positions.get(&identity) {
                Some(&position) => position,
                None => {
                    let mut root = self.hydrate(entity, row, "");
                    for relation in &eager {
                        if relation.to_many {
                            root.set_many(relation.name.clone(), Vec::new());
                        } else {
                            root.set_one(relation.name.clone(), None);
                        }
                    }
                    roots.push(root);
                    positions.insert(identity, roots.len() - 1);
                    roots.len() - 1
                }
            };

            for (rel_idx, relation) in eager.iter().enumerate() {
                let prefix = format!("{}_", relation.name);
                let Some(related_id) = row.get(&format!("{prefix}{}", relation.primary)).identity_key() else {
                    continue;
                };
                let related = self.hydrate(&relation.related, row, &prefix);
                let root = &mut roots[position];
                if relation.to_many {
                    if seen.entry((position, rel_idx)).or_default().insert(related_id) {
                        root.push_many(relation.name.clone(), related);
                    }
                } else {
                    root.set_one(relation.name.clone(), Some(related));
                }
            }
        }

        for root in &mut roots {
            notify(self.registry, ListenerEvent::AfterLoad, root)?;
        }
        Ok(roots)
    }
}
