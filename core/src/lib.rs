//! Metadata core for the relata entity mapper.
//!
//! This crate holds everything the mapper knows about entity types, without
//! any knowledge of how SQL is executed:
//!
//! - [`Value`]: dynamic property values, plus the column
//!   [`transform`] rules that convert them to and from stored form.
//! - Descriptor records: [`TableDescriptor`], [`ColumnDescriptor`],
//!   [`RelationDescriptor`], [`IndexDescriptor`], [`ListenerDescriptor`],
//!   and the join annotations merged during finalization.
//! - [`Registry`]: insertion-ordered descriptor store, looked up by
//!   [`EntityKey`].
//! - [`RelationResolver`]: decides foreign-key ownership, column names, and
//!   junction tables.
//! - [`Filter`]: AND-combined column conditions used by reads and writes.
//! - [`Entity`]: a dynamic instance of a registered type.
//!
//! Validation ([`validate_registry`]) diagnoses metadata problems such as
//! unresolved relations or placeholder foreign keys before first use.
//!
//! # Example
//!
//! ```
//! use relata_core::*;
//!
//! let mut registry = Registry::new();
//! EntityDefinition::new("User", "users")
//!     .generated_primary("id")
//!     .column("name", ColumnType::String)
//!     .relation_with("posts", RelationKind::OneToMany, "Post", |r| r.with_cascade(true))
//!     .register(&mut registry);
//! EntityDefinition::new("Post", "posts")
//!     .generated_primary("id")
//!     .column("title", ColumnType::String)
//!     .relation("author", RelationKind::ManyToOne, "User")
//!     .register(&mut registry);
//! registry.finalize();
//!
//! assert!(validate_registry(&registry).is_empty());
//!
//! let resolver = RelationResolver::new(&registry);
//! let posts = resolver.resolve_property(&EntityKey::from("User"), "posts").unwrap();
//! assert_eq!(posts.related.name, "posts");
//! assert_eq!(posts.inverse_property(), Some("author"));
//! ```

mod definition;
mod entity;
mod error;
mod filter;
mod metadata;
mod registry;
mod relation;
pub mod transform;
mod validate;
mod value;

pub use definition::EntityDefinition;
pub use entity::{Entity, Related};
pub use error::{MappingError, Result};
pub use filter::{Condition, Filter, Operator};
pub use metadata::*;
pub use registry::Registry;
pub use relation::{
    JoinStrategy, Junction, PLACEHOLDER_FOREIGN_KEY, RelationResolver, ResolvedRelation,
};
pub use validate::{ValidationError, validate_identifier, validate_registry};
pub use value::Value;
