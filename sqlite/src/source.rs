//! The data source context.
//!
//! A [`DataSource`] bundles the finalized [`Registry`] with an [`Executor`]
//! and is handed to everything that needs to run SQL. Clones share the same
//! registry, transport and transaction state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use relata_core::{EntityKey, Registry, validate_registry};
use tracing::{debug, info, warn};

use crate::config::DataSourceOptions;
use crate::error::{OrmError, Result};
use crate::migration::Migration;
use crate::query::{QueryBuilder, Statement};
use crate::repository::Repository;
use crate::transport::{ExecResult, Executor, Row, SqliteExecutor};

struct Inner {
    registry: Registry,
    executor: Arc<dyn Executor>,
    options: DataSourceOptions,
    in_transaction: AtomicBool,
}

/// Registry plus transport, shared by repositories and migrations.
///
/// # Examples
///
/// ```
/// use relata_core::*;
/// use relata_sqlite::{DataSource, DataSourceOptions};
///
/// # let rt = tokio::runtime::Runtime::new().unwrap();
/// # rt.block_on(async {
/// let mut registry = Registry::new();
/// EntityDefinition::new("User", "users")
///     .generated_primary("id")
///     .column("name", ColumnType::String)
///     .register(&mut registry);
///
/// let source = DataSource::open(registry, DataSourceOptions::in_memory().with_synchronize(true)).unwrap();
/// source.initialize().await.unwrap();
///
/// let users = source.repository("User").unwrap();
/// let mut ann = Entity::new("User").with("name", "ann");
/// users.save(&mut ann).await.unwrap();
/// assert_eq!(ann.get("id"), &Value::Integer(1));
/// # });
/// ```
#[derive(Clone)]
pub struct DataSource {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("options", &self.inner.options)
            .field("tables", &self.inner.registry.tables().len())
            .finish_non_exhaustive()
    }
}

/// Clears the transaction flag however the transaction body ends.
struct TransactionGuard<'a>(&'a AtomicBool);

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DataSource {
    /// Wraps an existing transport. The registry is finalized if it was not
    /// already.
    pub fn new(mut registry: Registry, executor: Arc<dyn Executor>, options: DataSourceOptions) -> Self {
        if !registry.is_finalized() {
            registry.finalize();
        }
        Self {
            inner: Arc::new(Inner {
                registry,
                executor,
                options,
                in_transaction: AtomicBool::new(false),
            }),
        }
    }

    /// Opens the SQLite database named by `options.database`.
    pub fn open(registry: Registry, options: DataSourceOptions) -> Result<Self> {
        let executor = if options.is_in_memory() {
            SqliteExecutor::open_in_memory()?
        } else {
            SqliteExecutor::open(&options.database)?
        };
        Ok(Self::new(registry, Arc::new(executor), options))
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn options(&self) -> &DataSourceOptions {
        &self.inner.options
    }

    pub fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.inner.registry)
    }

    /// Prepares the database for use.
    ///
    /// Enables foreign keys first, reports registry problems as warnings, and
    /// creates the schema when `synchronize` is set.
    pub async fn initialize(&self) -> Result<()> {
        if self.inner.options.foreign_keys {
            self.run("PRAGMA foreign_keys = ON", &[]).await?;
        }
        for problem in validate_registry(&self.inner.registry) {
            warn!(problem = %problem, "Entity metadata problem");
        }
        if self.inner.options.synchronize {
            self.synchronize().await?;
        }
        Ok(())
    }

    /// Creates every registered table, index and junction table that does not
    /// exist yet.
    pub async fn synchronize(&self) -> Result<()> {
        self.migration().up().await
    }

    pub fn migration(&self) -> Migration {
        Migration::new(self.clone())
    }

    /// Repository for the entity type registered as `entity`.
    ///
    /// # Errors
    ///
    /// [`MappingError::EntityNotRegistered`](relata_core::MappingError::EntityNotRegistered)
    /// when no table is registered for it.
    pub fn repository(&self, entity: impl Into<EntityKey>) -> Result<Repository> {
        let key = entity.into();
        self.inner.registry.table(&key)?;
        Ok(Repository::new(self.clone(), key))
    }

    /// Sends one statement to the transport, logging it first.
    pub async fn run(&self, sql: &str, params: &[relata_core::Value]) -> Result<ExecResult> {
        if self.inner.options.logging {
            info!(sql, params = params.len(), "Executing statement");
        } else {
            debug!(sql, params = params.len(), "Executing statement");
        }
        self.inner.executor.execute(sql, params).await
    }

    pub async fn execute(&self, statement: &Statement) -> Result<ExecResult> {
        self.run(&statement.sql, &statement.params).await
    }

    /// Runs a statement and returns its rows.
    pub async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        Ok(self.execute(statement).await?.into_rows())
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction.load(Ordering::SeqCst)
    }

    /// Runs `body` between `BEGIN` and `COMMIT`.
    ///
    /// Any error from `body` rolls the transaction back and is returned
    /// unchanged. Calling `transaction` again before the first one finishes
    /// fails with [`OrmError::NestedTransaction`] and issues no SQL.
    ///
    /// ```
    /// use futures::FutureExt;
    /// use relata_core::*;
    /// use relata_sqlite::{DataSource, DataSourceOptions, OrmError};
    ///
    /// # let rt = tokio::runtime::Runtime::new().unwrap();
    /// # rt.block_on(async {
    /// let source = DataSource::open(Registry::new(), DataSourceOptions::in_memory()).unwrap();
    /// let nested = source
    ///     .transaction(|ds| async move { ds.transaction(|_| async { Ok(()) }.boxed()).await }.boxed())
    ///     .await;
    /// assert!(matches!(nested, Err(OrmError::NestedTransaction)));
    /// # });
    /// ```
    pub async fn transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a DataSource) -> BoxFuture<'a, Result<T>>,
    {
        if self
            .inner
            .in_transaction
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OrmError::NestedTransaction);
        }
        let _guard = TransactionGuard(&self.inner.in_transaction);

        self.run("BEGIN", &[]).await?;
        match body(self).await {
            Ok(value) => {
                if let Err(err) = self.run("COMMIT", &[]).await {
                    self.rollback().await;
                    return Err(err);
                }
                Ok(value)
            }
            Err(err) => {
                self.rollback().await;
                Err(err)
            }
        }
    }

    async fn rollback(&self) {
        if let Err(err) = self.run("ROLLBACK", &[]).await {
            warn!(error = %err, "Rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use relata_core::{ColumnType, EntityDefinition, Value};

    use super::*;

    fn source() -> DataSource {
        let mut registry = Registry::new();
        EntityDefinition::new("Item", "items")
            .generated_primary("id")
            .column("name", ColumnType::String)
            .register(&mut registry);
        DataSource::open(registry, DataSourceOptions::in_memory().with_synchronize(true)).unwrap()
    }

    async fn count(source: &DataSource) -> i64 {
        let rows = source
            .run("SELECT COUNT(*) AS count FROM items", &[])
            .await
            .unwrap()
            .into_rows();
        rows[0].get("count").as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_initialize_enables_foreign_keys_and_synchronizes() {
        let source = source();
        source.initialize().await.unwrap();
        let rows = source.run("PRAGMA foreign_keys", &[]).await.unwrap().into_rows();
        assert_eq!(rows[0].get("foreign_keys"), &Value::Integer(1));
        assert_eq!(count(&source).await, 0);
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let source = source();
        source.initialize().await.unwrap();
        source
            .transaction(|ds| {
                async move {
                    ds.run("INSERT INTO items (name) VALUES (?)", &[Value::from("a")])
                        .await?;
                    Ok(())
                }
                .boxed()
            })
            .await
            .unwrap();
        assert_eq!(count(&source).await, 1);
        assert!(!source.in_transaction());
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_and_returns_original_error() {
        let source = source();
        source.initialize().await.unwrap();
        let result: Result<()> = source
            .transaction(|ds| {
                async move {
                    ds.run("INSERT INTO items (name) VALUES (?)", &[Value::from("a")])
                        .await?;
                    Err(OrmError::Transport("boom".into()))
                }
                .boxed()
            })
            .await;
        assert!(matches!(result, Err(OrmError::Transport(ref m)) if m == "boom"));
        assert_eq!(count(&source).await, 0);
        assert!(!source.in_transaction());
    }

    #[tokio::test]
    async fn test_nested_transaction_is_rejected() {
        let source = source();
        let result = source
            .transaction(|ds| async move { ds.transaction(|_| async { Ok(1) }.boxed()).await }.boxed())
            .await;
        assert!(matches!(result, Err(OrmError::NestedTransaction)));
        assert!(!source.in_transaction());
    }

    #[test]
    fn test_repository_requires_registration() {
        let source = source();
        assert!(source.repository("Item").is_ok());
        assert!(matches!(
            source.repository("Ghost"),
            Err(OrmError::Mapping(relata_core::MappingError::EntityNotRegistered(_)))
        ));
    }
}
