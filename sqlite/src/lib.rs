//! SQLite backend for relata entities.
//!
//! This crate turns the metadata held by a [`relata_core::Registry`] into SQL,
//! runs it, and folds the results back into [`relata_core::Entity`] graphs.
//!
//! # Architecture
//!
//! - **`schema`**: DDL: tables, indices, junction tables, drops
//! - **`query`**: DML: filtered selects with eager joins, inserts, updates,
//!   deletes, upserts, counters, soft-remove and recover
//! - **`convert`**: row ↔ entity conversion and result materialization
//! - **`transport`**: the [`Executor`] boundary and its rusqlite implementation
//! - **`source`**: [`DataSource`], the registry + transport context
//! - **`repository`**: [`Repository`], which sequences saves, removals and
//!   reads for one entity type
//! - **`migration`**: schema up/down/status
//! - **`config`**: YAML-loadable [`DataSourceOptions`]
//!
//! Statement builders are pure: they can be used without a database, and the
//! filtered mutations refuse an empty filter before any SQL exists.
//!
//! # Quick start
//!
//! ```
//! use relata_core::*;
//! use relata_sqlite::{DataSource, DataSourceOptions, FindOptions};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
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
//!
//! let source = DataSource::open(registry, DataSourceOptions::in_memory().with_synchronize(true)).unwrap();
//! source.initialize().await.unwrap();
//!
//! let users = source.repository("User").unwrap();
//! let mut ann = Entity::new("User")
//!     .with("name", "ann")
//!     .with_many("posts", vec![
//!         Entity::new("Post").with("title", "first"),
//!         Entity::new("Post").with("title", "second"),
//!     ]);
//! users.save(&mut ann).await.unwrap();
//!
//! let loaded = users.find(&FindOptions::new().relation("posts")).await.unwrap();
//! assert_eq!(loaded.len(), 1);
//! assert_eq!(loaded[0].many("posts").len(), 2);
//! # });
//! ```

mod config;
mod convert;
mod error;
mod migration;
mod query;
mod repository;
mod schema;
mod source;
mod transport;

pub use config::{DataSourceOptions, IN_MEMORY};
pub use convert::{Materializer, WriteMode, column_values, primary_value};
pub use error::{OrmError, Result};
pub use migration::{Migration, MigrationStatus, TableStatus};
pub use query::{Counter, FindOptions, Order, QueryBuilder, Statement, compile_filter, returns_rows};
pub use repository::Repository;
pub use schema::{
    create_index_sql, create_junction_sql, create_table_sql, default_index_name, drop_statements,
    drop_table_sql, junction_tables, schema_statements,
};
pub use source::DataSource;
pub use transport::{ExecResult, Executor, Row, SqliteExecutor};
