//! Statement execution.
//!
//! [`Executor`] is the boundary between the mapper and the database: it takes
//! SQL text plus positional parameters and answers with either rows or an
//! insert/affected-rows summary. [`SqliteExecutor`] implements it over a
//! `rusqlite` connection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use relata_core::Value;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};

use crate::error::{OrmError, Result};
use crate::query::returns_rows;

static NULL: Value = Value::Null;

/// One result row, keyed by column alias.
///
/// # Examples
///
/// ```
/// use relata_core::Value;
/// use relata_sqlite::Row;
///
/// let row = Row::new().with("id", 1i64).with("name", "ann");
/// assert_eq!(row.get("id"), &Value::Integer(1));
/// assert!(row.get("missing").is_null());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// The value under `column`, or `Null` when absent.
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// What a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecResult {
    /// Rows of a `SELECT` or `PRAGMA`.
    Rows(Vec<Row>),
    /// Outcome of any other statement.
    Summary { insert_id: i64, rows_affected: u64 },
}

impl ExecResult {
    /// The rows, or nothing for a summary.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            ExecResult::Rows(rows) => rows,
            ExecResult::Summary { .. } => Vec::new(),
        }
    }

    pub fn insert_id(&self) -> Option<i64> {
        match self {
            ExecResult::Summary { insert_id, .. } => Some(*insert_id),
            ExecResult::Rows(_) => None,
        }
    }

    pub fn rows_affected(&self) -> u64 {
        match self {
            ExecResult::Summary { rows_affected, .. } => *rows_affected,
            ExecResult::Rows(_) => 0,
        }
    }
}

/// Executes SQL on behalf of a [`DataSource`](crate::DataSource).
///
/// Implementations must answer `SELECT`/`PRAGMA` statements with
/// [`ExecResult::Rows`] and everything else with [`ExecResult::Summary`].
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;
}

/// [`Executor`] over a single `rusqlite` connection.
///
/// The connection sits behind a mutex that is only held for the duration of
/// one statement.
#[derive(Debug)]
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| OrmError::Transport("connection mutex poisoned".to_string()))
    }

    /// Runs one statement synchronously.
    pub fn run(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let bound = params.iter().map(to_sql_value);

        if !returns_rows(sql) {
            let affected = stmt.execute(params_from_iter(bound))?;
            return Ok(ExecResult::Summary {
                insert_id: conn.last_insert_rowid(),
                rows_affected: affected as u64,
            });
        }

        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(bound))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Row::new();
            for (idx, name) in names.iter().enumerate() {
                values.insert(name.clone(), from_sql_ref(row.get_ref(idx)?)?);
            }
            out.push(values);
        }
        Ok(ExecResult::Rows(out))
    }
}

#[async_trait]
impl Executor for SqliteExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.run(sql, params)
    }
}

/// Binds a value the way SQLite stores it.
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value.to_param() {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(f) => SqlValue::Real(f),
        Value::Text(s) => SqlValue::Text(s),
        other => SqlValue::Text(other.to_string()),
    }
}

pub(crate) fn from_sql_ref(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| OrmError::Conversion(format!("invalid UTF-8 in text column: {e}")))?
                .to_string(),
        ),
        ValueRef::Blob(_) => {
            return Err(OrmError::Conversion("blob columns are not supported".to_string()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_select_and_summary() {
        let exec = SqliteExecutor::open_in_memory().unwrap();
        exec.run("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)", &[])
            .unwrap();

        let inserted = exec
            .run("INSERT INTO t (name) VALUES (?)", &[Value::from("a")])
            .unwrap();
        assert_eq!(inserted.insert_id(), Some(1));
        assert_eq!(inserted.rows_affected(), 1);

        let rows = exec
            .run("SELECT id AS id, name AS name FROM t WHERE name = ?", &[Value::from("a")])
            .unwrap()
            .into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), &Value::Integer(1));
        assert_eq!(rows[0].get("name"), &Value::Text("a".into()));
    }

    #[test]
    fn test_pragma_returns_rows() {
        let exec = SqliteExecutor::open_in_memory().unwrap();
        exec.run("PRAGMA foreign_keys = ON", &[]).unwrap();
        let rows = exec.run("PRAGMA foreign_keys", &[]).unwrap().into_rows();
        assert_eq!(rows[0].get("foreign_keys"), &Value::Integer(1));
    }

    #[test]
    fn test_rich_values_bind_as_text_or_integer() {
        assert_eq!(to_sql_value(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(
            to_sql_value(&Value::Array(vec!["a".into(), "b".into()])),
            SqlValue::Text("a,b".into())
        );
        assert_eq!(to_sql_value(&Value::Null), SqlValue::Null);
    }

    #[test]
    fn test_update_without_match_affects_nothing() {
        let exec = SqliteExecutor::open_in_memory().unwrap();
        exec.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
        let result = exec
            .run("UPDATE t SET name = ? WHERE id = ?", &[Value::from("x"), Value::from(9i64)])
            .unwrap();
        assert_eq!(result.rows_affected(), 0);
    }

    #[tokio::test]
    async fn test_execute_through_trait_object() {
        let exec: Box<dyn Executor> = Box::new(SqliteExecutor::open_in_memory().unwrap());
        let rows = exec.execute("SELECT 1 AS one", &[]).await.unwrap().into_rows();
        assert_eq!(rows[0].get("one"), &Value::Integer(1));
    }
}
