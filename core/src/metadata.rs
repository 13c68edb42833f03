//! Descriptor records for registered entity types.
//!
//! Each descriptor describes one piece of schema metadata: a table, a column,
//! a relation, an index, or a lifecycle listener. Descriptors are plain data
//! plus a few closures (value transformers, related-type thunks, listener
//! callbacks); they are appended to a [`Registry`](crate::Registry) during
//! startup and read-only afterwards.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::value::Value;

/// Stable identifier of a registered entity type.
///
/// Lookups in the registry are keyed by this handle, never by table name, so
/// two entity types mapped onto the same table stay distinct.
///
/// # Examples
///
/// ```
/// use relata_core::EntityKey;
///
/// let key = EntityKey::from("User");
/// assert_eq!(key.as_str(), "User");
/// assert_eq!(key, EntityKey::new("User"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(Arc<str>);

impl EntityKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&EntityKey> for EntityKey {
    fn from(key: &EntityKey) -> Self {
        key.clone()
    }
}

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Integer,
    Array,
    Json,
    Text,
    Datetime,
    Date,
}

impl ColumnType {
    /// SQLite storage type used in `CREATE TABLE`.
    ///
    /// # Examples
    ///
    /// ```
    /// use relata_core::ColumnType;
    ///
    /// assert_eq!(ColumnType::Json.sql_type(), "TEXT");
    /// assert_eq!(ColumnType::Datetime.sql_type(), "INTEGER");
    /// ```
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::String
            | ColumnType::Array
            | ColumnType::Json
            | ColumnType::Text
            | ColumnType::Date => "TEXT",
            ColumnType::Number
            | ColumnType::Boolean
            | ColumnType::Integer
            | ColumnType::Datetime => "INTEGER",
        }
    }
}

/// Special behaviour attached to a column during persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnMode {
    #[default]
    Regular,
    /// Set to "now" on insert when unset.
    CreateDate,
    /// Set to "now" on every save.
    UpdateDate,
    /// Set to "now" by soft-remove, cleared by recover.
    DeleteDate,
    /// `1` on insert, previous value plus one on update.
    Version,
}

/// Bidirectional value converter attached to a column.
///
/// When present it replaces every built-in transform rule for that column.
#[derive(Clone)]
pub struct Transformer {
    to: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    from: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
}

impl Transformer {
    pub fn new(
        to: impl Fn(&Value) -> Value + Send + Sync + 'static,
        from: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            to: Arc::new(to),
            from: Arc::new(from),
        }
    }

    /// Converts an entity value into its stored form.
    pub fn to(&self, value: &Value) -> Value {
        (self.to)(value)
    }

    /// Converts a stored value back into its entity form.
    pub fn from(&self, value: &Value) -> Value {
        (self.from)(value)
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transformer { .. }")
    }
}

/// Identity and table name of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub entity: EntityKey,
    pub name: String,
}

impl TableDescriptor {
    pub fn new(entity: impl Into<EntityKey>, name: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            name: name.into(),
        }
    }
}

/// A mapped column.
///
/// Use [`ColumnDescriptor::new`] and the chaining builders to describe
/// flags and special modes.
///
/// # Examples
///
/// ```
/// use relata_core::{ColumnDescriptor, ColumnMode, ColumnType};
///
/// let id = ColumnDescriptor::new("User", "id", ColumnType::Integer).primary().generated();
/// assert!(id.primary && id.generated && !id.nullable);
///
/// let deleted = ColumnDescriptor::new("User", "deletedAt", ColumnType::Datetime)
///     .with_mode(ColumnMode::DeleteDate);
/// assert!(deleted.nullable);
/// ```
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub entity: EntityKey,
    pub property: String,
    pub column_type: ColumnType,
    pub primary: bool,
    pub generated: bool,
    pub nullable: bool,
    pub transformer: Option<Transformer>,
    pub mode: ColumnMode,
}

impl ColumnDescriptor {
    pub fn new(entity: impl Into<EntityKey>, property: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            entity: entity.into(),
            property: property.into(),
            column_type,
            primary: false,
            generated: false,
            nullable: false,
            transformer: None,
            mode: ColumnMode::Regular,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Sets the special mode. Soft-delete columns are made nullable, since a
    /// live row is one where the column is `NULL`.
    pub fn with_mode(mut self, mode: ColumnMode) -> Self {
        self.mode = mode;
        if mode == ColumnMode::DeleteDate {
            self.nullable = true;
        }
        self
    }
}

/// Cardinality of a relation, seen from its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationKind {
    /// `true` for one-to-many and many-to-many.
    pub fn is_to_many(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// Operations a cascade policy can propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadeOp {
    Insert,
    Update,
    Remove,
    SoftRemove,
    Recover,
}

/// Cascade policy of a relation: `true`/`false` or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cascade {
    #[default]
    None,
    All,
    Only(Vec<CascadeOp>),
}

impl Cascade {
    /// Returns `true` if this policy propagates `op`.
    ///
    /// # Examples
    ///
    /// ```
    /// use relata_core::{Cascade, CascadeOp};
    ///
    /// assert!(Cascade::All.includes(CascadeOp::Remove));
    /// assert!(!Cascade::None.includes(CascadeOp::Insert));
    /// let only = Cascade::Only(vec![CascadeOp::Insert]);
    /// assert!(only.includes(CascadeOp::Insert));
    /// assert!(!only.includes(CascadeOp::Update));
    /// ```
    pub fn includes(&self, op: CascadeOp) -> bool {
        match self {
            Cascade::None => false,
            Cascade::All => true,
            Cascade::Only(ops) => ops.contains(&op),
        }
    }
}

impl From<bool> for Cascade {
    fn from(enabled: bool) -> Self {
        if enabled { Cascade::All } else { Cascade::None }
    }
}

impl From<Vec<CascadeOp>> for Cascade {
    fn from(ops: Vec<CascadeOp>) -> Self {
        Cascade::Only(ops)
    }
}

/// Referential action for an owning to-one foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnDelete {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl OnDelete {
    pub fn as_sql(self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::SetDefault => "SET DEFAULT",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::NoAction => "NO ACTION",
        }
    }
}

/// Deferred reference to the related entity type.
pub type TargetThunk = Arc<dyn Fn() -> Option<EntityKey> + Send + Sync>;

/// How to find the property on the related type that points back.
#[derive(Clone)]
pub enum InverseSide {
    Property(String),
    Resolver(Arc<dyn Fn() -> Option<String> + Send + Sync>),
}

impl InverseSide {
    /// Evaluates the inverse property name.
    pub fn property(&self) -> Option<String> {
        match self {
            InverseSide::Property(name) => Some(name.clone()),
            InverseSide::Resolver(resolve) => resolve(),
        }
    }
}

impl fmt::Debug for InverseSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InverseSide::Property(name) => f.debug_tuple("Property").field(name).finish(),
            InverseSide::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// A relation between the owner entity and a lazily-resolved related entity.
///
/// # Examples
///
/// ```
/// use relata_core::{EntityKey, RelationDescriptor, RelationKind};
///
/// let author = RelationDescriptor::new("Post", "author", RelationKind::ManyToOne, || {
///     Some(EntityKey::from("User"))
/// });
/// assert_eq!(author.evaluate_target(), Some(EntityKey::from("User")));
/// assert!(!author.join_column);
/// ```
#[derive(Clone)]
pub struct RelationDescriptor {
    pub entity: EntityKey,
    pub property: String,
    pub kind: RelationKind,
    pub inverse: Option<InverseSide>,
    pub cascade: Cascade,
    pub on_delete: Option<OnDelete>,
    pub join_column: bool,
    pub join_column_name: Option<String>,
    pub join_table: bool,
    pub join_table_name: Option<String>,
    target: TargetThunk,
    resolved: Arc<OnceLock<EntityKey>>,
}

impl RelationDescriptor {
    pub fn new(
        entity: impl Into<EntityKey>,
        property: impl Into<String>,
        kind: RelationKind,
        target: impl Fn() -> Option<EntityKey> + Send + Sync + 'static,
    ) -> Self {
        Self {
            entity: entity.into(),
            property: property.into(),
            kind,
            inverse: None,
            cascade: Cascade::None,
            on_delete: None,
            join_column: false,
            join_column_name: None,
            join_table: false,
            join_table_name: None,
            target: Arc::new(target),
            resolved: Arc::new(OnceLock::new()),
        }
    }

    /// Shorthand for a relation whose related type is known by key up front.
    pub fn to(
        entity: impl Into<EntityKey>,
        property: impl Into<String>,
        kind: RelationKind,
        related: impl Into<EntityKey>,
    ) -> Self {
        let related = related.into();
        Self::new(entity, property, kind, move || Some(related.clone()))
    }

    pub fn with_inverse(mut self, property: impl Into<String>) -> Self {
        self.inverse = Some(InverseSide::Property(property.into()));
        self
    }

    pub fn with_inverse_resolver(
        mut self,
        resolve: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.inverse = Some(InverseSide::Resolver(Arc::new(resolve)));
        self
    }

    pub fn with_cascade(mut self, cascade: impl Into<Cascade>) -> Self {
        self.cascade = cascade.into();
        self
    }

    pub fn with_on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Invokes the related-type thunk, bypassing the cache.
    pub fn evaluate_target(&self) -> Option<EntityKey> {
        (self.target)()
    }

    /// Previously cached resolution, if any.
    pub fn cached_target(&self) -> Option<&EntityKey> {
        self.resolved.get()
    }

    /// Caches a successful resolution; later calls keep the first value.
    pub fn remember_target(&self, key: EntityKey) {
        let _ = self.resolved.set(key);
    }

    /// Merges a join-column registration onto this relation.
    pub fn apply_join_column(&mut self, join: &JoinColumnDescriptor) {
        self.join_column = true;
        if join.name.is_some() {
            self.join_column_name = join.name.clone();
        }
    }

    /// Merges a join-table registration onto this relation.
    pub fn apply_join_table(&mut self, join: &JoinTableDescriptor) {
        self.join_table = true;
        if join.name.is_some() {
            self.join_table_name = join.name.clone();
        }
    }
}

impl fmt::Debug for RelationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("entity", &self.entity)
            .field("property", &self.property)
            .field("kind", &self.kind)
            .field("inverse", &self.inverse)
            .field("cascade", &self.cascade)
            .field("on_delete", &self.on_delete)
            .field("join_column", &self.join_column)
            .field("join_column_name", &self.join_column_name)
            .field("join_table", &self.join_table)
            .field("join_table_name", &self.join_table_name)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

/// Marks the relation `entity.property` as owning a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumnDescriptor {
    pub entity: EntityKey,
    pub property: String,
    pub name: Option<String>,
}

impl JoinColumnDescriptor {
    pub fn new(entity: impl Into<EntityKey>, property: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            property: property.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Marks the many-to-many relation `entity.property` as owning the junction table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableDescriptor {
    pub entity: EntityKey,
    pub property: String,
    pub name: Option<String>,
}

impl JoinTableDescriptor {
    pub fn new(entity: impl Into<EntityKey>, property: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            property: property.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A secondary index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub entity: EntityKey,
    pub columns: Vec<String>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexDescriptor {
    pub fn new<I, S>(entity: impl Into<EntityKey>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity: entity.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Lifecycle events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerEvent {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeRemove,
    AfterRemove,
    AfterLoad,
}

/// Callback invoked for a lifecycle event. An `Err` aborts the operation.
pub type ListenerFn = Arc<dyn Fn(&mut Entity) -> std::result::Result<(), String> + Send + Sync>;

/// A named lifecycle hook on an entity type.
#[derive(Clone)]
pub struct ListenerDescriptor {
    pub entity: EntityKey,
    pub method: String,
    pub event: ListenerEvent,
    callback: ListenerFn,
}

impl ListenerDescriptor {
    pub fn new(
        entity: impl Into<EntityKey>,
        method: impl Into<String>,
        event: ListenerEvent,
        callback: impl Fn(&mut Entity) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            entity: entity.into(),
            method: method.into(),
            event,
            callback: Arc::new(callback),
        }
    }

    pub fn invoke(&self, entity: &mut Entity) -> std::result::Result<(), String> {
        (self.callback)(entity)
    }
}

impl fmt::Debug for ListenerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerDescriptor")
            .field("entity", &self.entity)
            .field("method", &self.method)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
