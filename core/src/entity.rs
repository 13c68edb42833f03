//! Dynamic entity records.
//!
//! An [`Entity`] is an instance of a registered entity type: a property map of
//! scalar [`Value`]s plus a map of loaded relation slots. The persistence and
//! materialization layers only ever touch entities through the accessors
//! here, keyed by property name.

use std::collections::HashMap;

use crate::metadata::EntityKey;
use crate::value::Value;

static NULL: Value = Value::Null;

/// Contents of a relation property on an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// To-one relation: the related object or nothing.
    One(Option<Box<Entity>>),
    /// To-many relation: the related objects in load order.
    Many(Vec<Entity>),
}

impl Related {
    /// Iterates over the related entities regardless of cardinality.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Entity> + '_> {
        match self {
            Related::One(one) => Box::new(one.iter().map(|b| b.as_ref())),
            Related::Many(many) => Box::new(many.iter()),
        }
    }
}

/// An instance of a registered entity type.
///
/// # Examples
///
/// ```
/// use relata_core::{Entity, Value};
///
/// let mut user = Entity::new("User").with("name", "alice");
/// assert_eq!(user.get("name").as_str(), Some("alice"));
/// assert!(user.get("id").is_null());
///
/// user.push_many("posts", Entity::new("Post").with("title", "hello"));
/// assert_eq!(user.many("posts").len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    key: EntityKey,
    fields: HashMap<String, Value>,
    relations: HashMap<String, Related>,
}

impl Entity {
    pub fn new(key: impl Into<EntityKey>) -> Self {
        Self {
            key: key.into(),
            fields: HashMap::new(),
            relations: HashMap::new(),
        }
    }

    /// The registered type of this instance.
    pub fn entity_key(&self) -> &EntityKey {
        &self.key
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(property, value);
        self
    }

    /// Builder form of [`set_one`](Self::set_one).
    pub fn with_one(mut self, property: impl Into<String>, related: Entity) -> Self {
        self.set_one(property, Some(related));
        self
    }

    /// Builder form of [`set_many`](Self::set_many).
    pub fn with_many(mut self, property: impl Into<String>, related: Vec<Entity>) -> Self {
        self.set_many(property, related);
        self
    }

    /// Returns the property value, or `Null` when unset.
    pub fn get(&self, property: &str) -> &Value {
        self.fields.get(property).unwrap_or(&NULL)
    }

    /// Returns `true` when the property holds a non-null value.
    pub fn has(&self, property: &str) -> bool {
        !self.get(property).is_null()
    }

    /// Returns `true` when the property was assigned, even to `Null`.
    pub fn is_set(&self, property: &str) -> bool {
        self.fields.contains_key(property)
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(property.into(), value.into());
    }

    /// Iterates over all scalar properties that have been set.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn relation(&self, property: &str) -> Option<&Related> {
        self.relations.get(property)
    }

    pub fn relation_mut(&mut self, property: &str) -> Option<&mut Related> {
        self.relations.get_mut(property)
    }

    pub fn has_relation(&self, property: &str) -> bool {
        self.relations.contains_key(property)
    }

    pub fn set_relation(&mut self, property: impl Into<String>, related: Related) {
        self.relations.insert(property.into(), related);
    }

    /// Detaches a relation slot so it can be processed while the owner is
    /// borrowed elsewhere. Put it back with [`set_relation`](Self::set_relation).
    pub fn take_relation(&mut self, property: &str) -> Option<Related> {
        self.relations.remove(property)
    }

    pub fn set_one(&mut self, property: impl Into<String>, related: Option<Entity>) {
        self.relations
            .insert(property.into(), Related::One(related.map(Box::new)));
    }

    pub fn set_many(&mut self, property: impl Into<String>, related: Vec<Entity>) {
        self.relations.insert(property.into(), Related::Many(related));
    }

    /// Appends to a to-many relation, creating it if absent.
    ///
    /// A to-one slot under the same name is replaced.
    pub fn push_many(&mut self, property: impl Into<String>, related: Entity) {
        let slot = self
            .relations
            .entry(property.into())
            .or_insert_with(|| Related::Many(Vec::new()));
        match slot {
            Related::Many(items) => items.push(related),
            Related::One(_) => *slot = Related::Many(vec![related]),
        }
    }

    /// The loaded to-one related entity, if any.
    pub fn one(&self, property: &str) -> Option<&Entity> {
        match self.relations.get(property) {
            Some(Related::One(Some(related))) => Some(related),
            _ => None,
        }
    }

    /// The loaded to-many related entities; empty when not loaded.
    pub fn many(&self, property: &str) -> &[Entity] {
        match self.relations.get(property) {
            Some(Related::Many(items)) => items,
            _ => &[],
        }
    }

    /// Copy of this entity's scalar properties without any relations.
    pub fn snapshot(&self) -> Entity {
        Entity {
            key: self.key.clone(),
            fields: self.fields.clone(),
            relations: HashMap::new(),
        }
    }
}
