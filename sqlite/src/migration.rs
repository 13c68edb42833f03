//! Schema lifecycle operations.
//!
//! [`Migration`] creates and drops the tables described by the registry of a
//! [`DataSource`], and reports which of them exist. Statement generation
//! lives in [`schema`](crate::schema); this module only sequences it.
//!
//! # Example
//!
//! ```
//! use relata_core::*;
//! use relata_sqlite::{DataSource, DataSourceOptions};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let mut registry = Registry::new();
//! EntityDefinition::new("User", "users")
//!     .generated_primary("id")
//!     .register(&mut registry);
//! let source = DataSource::open(registry, DataSourceOptions::in_memory()).unwrap();
//!
//! let migration = source.migration();
//! migration.up().await.unwrap();
//! assert!(migration.status().await.unwrap().tables_exist);
//!
//! migration.down().await.unwrap();
//! assert!(!migration.status().await.unwrap().tables_exist);
//! # });
//! ```

use futures::FutureExt;
use relata_core::Value;

use crate::error::Result;
use crate::query::Statement;
use crate::schema::{drop_statements, junction_tables, schema_statements};
use crate::source::DataSource;

/// Existence and size of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub name: String,
    pub exists: bool,
    /// Row count; `0` when the table does not exist.
    pub rows: u64,
    /// `true` for many-to-many junction tables.
    pub junction: bool,
}

/// Current state of the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Whether every registered and junction table exists.
    pub tables_exist: bool,
    /// Entity tables in registration order, then junction tables.
    pub tables: Vec<TableStatus>,
}

impl MigrationStatus {
    pub fn table(&self, name: &str) -> Option<&TableStatus> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Creates, drops and inspects the schema of a [`DataSource`].
#[derive(Debug, Clone)]
pub struct Migration {
    source: DataSource,
}

impl Migration {
    pub fn new(source: DataSource) -> Self {
        Self { source }
    }

    /// Creates all tables, indices and junction tables.
    ///
    /// Every statement is `IF NOT EXISTS`, so calling this repeatedly is safe.
    /// Runs in a transaction unless one is already open.
    pub async fn up(&self) -> Result<()> {
        let statements = schema_statements(self.source.registry())?;
        self.apply(statements).await
    }

    /// Drops junction tables, then entity tables, in reverse registration
    /// order.
    pub async fn down(&self) -> Result<()> {
        let statements = drop_statements(self.source.registry())?;
        self.apply(statements).await
    }

    async fn apply(&self, statements: Vec<String>) -> Result<()> {
        if self.source.in_transaction() {
            return run_all(&self.source, &statements).await;
        }
        self.source
            .transaction(|ds| async move { run_all(ds, &statements).await }.boxed())
            .await
    }

    /// Reports which tables exist and how many rows each holds.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let registry = self.source.registry();
        let mut names: Vec<(String, bool)> = registry
            .tables()
            .iter()
            .map(|t| (t.name.clone(), false))
            .collect();
        names.extend(junction_tables(registry)?.into_iter().map(|name| (name, true)));

        let mut tables = Vec::with_capacity(names.len());
        for (name, junction) in names {
            let exists = self.table_exists(&name).await?;
            let rows = if exists { self.count_rows(&name).await? } else { 0 };
            tables.push(TableStatus {
                name,
                exists,
                rows,
                junction,
            });
        }

        Ok(MigrationStatus {
            tables_exist: tables.iter().all(|t| t.exists),
            tables,
        })
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let stmt = Statement::new(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            vec![Value::from(name)],
        );
        Ok(first_count(&self.source.query(&stmt).await?) > 0)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        relata_core::validate_identifier(table)?;
        let stmt = Statement::new(format!("SELECT COUNT(*) AS count FROM {table}"), Vec::new());
        Ok(first_count(&self.source.query(&stmt).await?))
    }
}

async fn run_all(source: &DataSource, statements: &[String]) -> Result<()> {
    for sql in statements {
        source.run(sql, &[]).await?;
    }
    Ok(())
}

pub(crate) fn first_count(rows: &[crate::transport::Row]) -> u64 {
    rows.first()
        .and_then(|row| row.get("count").as_i64())
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}
