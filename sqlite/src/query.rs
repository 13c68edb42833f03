//! DML generation.
//!
//! [`QueryBuilder`] compiles registered metadata plus a [`Filter`] into a
//! parameterized [`Statement`]. It never touches a connection: every method
//! is a pure function of its arguments, which is what lets the mutation
//! builders refuse an empty filter before any SQL can run.
//!
//! # Example
//!
//! ```
//! use relata_core::*;
//! use relata_sqlite::{FindOptions, QueryBuilder};
//!
//! let mut registry = Registry::new();
//! EntityDefinition::new("User", "users")
//!     .generated_primary("id")
//!     .column("name", ColumnType::String)
//!     .register(&mut registry);
//! registry.finalize();
//!
//! let builder = QueryBuilder::new(&registry);
//! let user = EntityKey::from("User");
//! let stmt = builder
//!     .select(&user, &FindOptions::new().filter(Filter::by("name", "ann")).limit(1))
//!     .unwrap();
//! assert_eq!(
//!     stmt.sql,
//!     "SELECT users.id AS id, users.name AS name FROM users WHERE users.name = ? LIMIT ?"
//! );
//! assert_eq!(stmt.params, vec![Value::from("ann"), Value::from(1i64)]);
//!
//! // Mutations refuse to run without a filter.
//! assert!(builder.delete(&user, &Filter::new()).is_err());
//! ```

use chrono::{DateTime, Utc};
use relata_core::{
    ColumnMode, Condition, EntityKey, Filter, JoinStrategy, Junction, MappingError, Operator,
    RelationResolver, Registry, TableDescriptor, Value, transform, validate_identifier,
};

use crate::error::{OrmError, Result};

/// A SQL string with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// `true` for statements the transport answers with rows.
    pub fn returns_rows(&self) -> bool {
        returns_rows(&self.sql)
    }
}

/// `true` for `SELECT` and `PRAGMA` statements.
pub fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start();
    let keyword: String = head
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    keyword == "SELECT" || keyword == "PRAGMA" || keyword == "WITH"
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Options for a read.
///
/// # Examples
///
/// ```
/// use relata_core::Filter;
/// use relata_sqlite::{FindOptions, Order};
///
/// let options = FindOptions::new()
///     .filter(Filter::by("published", true))
///     .relation("author")
///     .order_by("createdAt", Order::Desc)
///     .limit(10)
///     .offset(20);
/// assert_eq!(options.relations, vec!["author".to_string()]);
/// assert!(!options.with_deleted);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Filter,
    /// Explicit projection; `None` selects every column.
    pub select: Option<Vec<String>>,
    /// Relations to join and materialize eagerly.
    pub relations: Vec<String>,
    pub order: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Include soft-removed rows.
    pub with_deleted: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn relation(mut self, name: impl Into<String>) -> Self {
        self.relations.push(name.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }
}

/// Arithmetic direction of a counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Increment,
    Decrement,
}

/// Compiles a filter into a `WHERE` body and its parameters.
///
/// Column names are qualified with `qualifier` when given. An empty filter
/// compiles to an empty string.
///
/// # Examples
///
/// ```
/// use relata_core::{Filter, Operator, Value};
/// use relata_sqlite::compile_filter;
///
/// let filter = Filter::new()
///     .and("age", Operator::between(18i64, 65i64))
///     .and("deletedAt", Operator::not(Operator::IsNull));
/// let (sql, params) = compile_filter(&filter, None).unwrap();
/// assert_eq!(sql, "age BETWEEN ? AND ? AND deletedAt IS NOT NULL");
/// assert_eq!(params, vec![Value::Integer(18), Value::Integer(65)]);
/// ```
pub fn compile_filter(filter: &Filter, qualifier: Option<&str>) -> Result<(String, Vec<Value>)> {
    compile_filter_with(filter, qualifier, |_, value| value.to_param())
}

/// Like [`compile_filter`], but each comparison operand is converted by
/// `bind`, which receives the filtered column's name. `LIKE` patterns are
/// bound as plain text.
fn compile_filter_with<F>(filter: &Filter, qualifier: Option<&str>, bind: F) -> Result<(String, Vec<Value>)>
where
    F: Fn(&str, &Value) -> Value,
{
    let mut clauses = Vec::with_capacity(filter.len());
    let mut params = Vec::new();

    for (column, condition) in filter.iter() {
        validate_identifier(column)?;
        let target = match qualifier {
            Some(q) => format!("{q}.{column}"),
            None => column.to_string(),
        };
        let bind_column = |value: &Value| bind(column, value);
        clauses.push(compile_condition(&target, condition, &bind_column, &mut params));
    }

    Ok((clauses.join(" AND "), params))
}

fn compile_condition(
    target: &str,
    condition: &Condition,
    bind: &dyn Fn(&Value) -> Value,
    params: &mut Vec<Value>,
) -> String {
    let op = match condition {
        Condition::Value(Value::Null) => return format!("{target} IS NULL"),
        Condition::Value(value) => {
            params.push(bind(value));
            return format!("{target} = ?");
        }
        Condition::Op(op) => op,
    };

    match op {
        Operator::Equal(v) => binary(target, "=", bind(v), params),
        Operator::NotEqual(v) => binary(target, "!=", bind(v), params),
        Operator::LessThan(v) => binary(target, "<", bind(v), params),
        Operator::GreaterThan(v) => binary(target, ">", bind(v), params),
        Operator::LessOrEqual(v) => binary(target, "<=", bind(v), params),
        Operator::GreaterOrEqual(v) => binary(target, ">=", bind(v), params),
        Operator::Like(v) => binary(target, "LIKE", v.to_param(), params),
        Operator::Between(low, high) => {
            params.push(bind(low));
            params.push(bind(high));
            format!("{target} BETWEEN ? AND ?")
        }
        Operator::ILike(v) => {
            params.push(v.to_param());
            format!("LOWER({target}) LIKE LOWER(?)")
        }
        Operator::In(values) => {
            params.extend(values.iter().map(bind));
            format!("{target} IN ({})", placeholders(values.len()))
        }
        Operator::IsNull => format!("{target} IS NULL"),
        Operator::Raw(raw) => format!("{target} {raw}"),
        Operator::Not(inner) => match inner.as_ref() {
            Condition::Op(Operator::In(values)) => {
                params.extend(values.iter().map(bind));
                format!("{target} NOT IN ({})", placeholders(values.len()))
            }
            Condition::Op(Operator::Like(v)) => {
                params.push(v.to_param());
                format!("{target} NOT LIKE ?")
            }
            Condition::Op(Operator::IsNull) => format!("{target} IS NOT NULL"),
            other => {
                params.push(bind(&degraded_value(other)));
                format!("{target} != ?")
            }
        },
    }
}

fn binary(target: &str, sql_op: &str, value: Value, params: &mut Vec<Value>) -> String {
    params.push(value);
    format!("{target} {sql_op} ?")
}

/// The single value bound when `Not` wraps something it cannot negate.
fn degraded_value(condition: &Condition) -> Value {
    match condition {
        Condition::Value(v) => v.clone(),
        Condition::Op(op) => match op {
            Operator::Equal(v)
            | Operator::NotEqual(v)
            | Operator::LessThan(v)
            | Operator::GreaterThan(v)
            | Operator::LessOrEqual(v)
            | Operator::GreaterOrEqual(v)
            | Operator::Like(v)
            | Operator::ILike(v)
            | Operator::Between(v, _) => v.clone(),
            Operator::In(values) => values.first().cloned().unwrap_or_default(),
            Operator::Raw(raw) => Value::Text(raw.clone()),
            Operator::IsNull => Value::Null,
            Operator::Not(inner) => degraded_value(inner),
        },
    }
}

/// SQLite binds signed 64-bit integers; larger counts clamp to `i64::MAX`.
fn saturating_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Builds statements for the entities in a registry.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'r> {
    registry: &'r Registry,
}

impl<'r> QueryBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    fn table(&self, entity: &EntityKey) -> Result<&'r TableDescriptor> {
        let table = self.registry.table(entity)?;
        validate_identifier(&table.name)?;
        Ok(table)
    }

    /// Soft-delete filter fragment for the root table, when it applies.
    fn soft_delete_clause(&self, entity: &EntityKey, table: &str, with_deleted: bool) -> Option<String> {
        if with_deleted {
            return None;
        }
        self.registry
            .find_mode_column(entity, ColumnMode::DeleteDate)
            .map(|c| format!("{table}.{} IS NULL", c.property))
    }

    /// Compiles `filter` for `entity`, binding operands of registered columns
    /// in their stored form.
    fn where_clause(
        &self,
        entity: &EntityKey,
        filter: &Filter,
        qualifier: Option<&str>,
        extra: Option<String>,
    ) -> Result<(String, Vec<Value>)> {
        let (body, params) = compile_filter_with(filter, qualifier, |column, value| {
            match self.registry.find_column(entity, column) {
                Some(descriptor) => transform::to_database(descriptor, value),
                None => value.to_param(),
            }
        })?;
        let mut parts = Vec::new();
        if let Some(extra) = extra {
            parts.push(extra);
        }
        if !body.is_empty() {
            parts.push(body);
        }
        if parts.is_empty() {
            return Ok((String::new(), params));
        }
        Ok((format!(" WHERE {}", parts.join(" AND ")), params))
    }

    fn require_filter(filter: &Filter, operation: &'static str) -> Result<()> {
        if filter.is_empty() {
            return Err(OrmError::MissingWhereClause { operation });
        }
        Ok(())
    }

    /// Builds a `SELECT` with eager `LEFT JOIN`s.
    ///
    /// Root columns are aliased to their property name, related columns to
    /// `<relation>_<column>`. Unless `with_deleted` is set, rows whose
    /// soft-delete column is non-null are excluded. The primary key is always
    /// projected, since materialization groups rows by it.
    pub fn select(&self, entity: &EntityKey, options: &FindOptions) -> Result<Statement> {
        let table = self.table(entity)?;
        let root = &table.name;
        let resolver = RelationResolver::new(self.registry);

        let mut projection = Vec::new();
        let columns = self.registry.find_columns(entity);
        match &options.select {
            Some(selected) => {
                if let Some(pk) = self.registry.primary_column(entity) {
                    if !selected.contains(&pk.property) {
                        projection.push(format!("{root}.{0} AS {0}", pk.property));
                    }
                }
                for name in selected {
                    if !columns.iter().any(|c| &c.property == name) {
                        return Err(MappingError::UnknownColumn {
                            entity: entity.clone(),
                            column: name.clone(),
                        }
                        .into());
                    }
                    projection.push(format!("{root}.{name} AS {name}"));
                }
            }
            None => {
                for column in &columns {
                    validate_identifier(&column.property)?;
                    projection.push(format!("{root}.{0} AS {0}", column.property));
                }
            }
        }

        let mut joins = Vec::new();
        for name in &options.relations {
            validate_identifier(name)?;
            let resolved = resolver.resolve_property(entity, name)?.require_inverse()?;
            let related = &resolved.related.name;
            validate_identifier(related)?;
            let related_pk = self
                .registry
                .primary_column(&resolved.related.entity)
                .map(|c| c.property.clone())
                .unwrap_or_else(|| "id".to_string());
            let root_pk = self
                .registry
                .primary_column(entity)
                .map(|c| c.property.clone())
                .unwrap_or_else(|| "id".to_string());

            for column in self.registry.find_columns(&resolved.related.entity) {
                projection.push(format!("{name}.{0} AS {name}_{0}", column.property));
            }

            match &resolved.join {
                JoinStrategy::Owner { column } => joins.push(format!(
                    "LEFT JOIN {related} AS {name} ON {name}.{related_pk} = {root}.{column}"
                )),
                JoinStrategy::Inverse { column, .. } => joins.push(format!(
                    "LEFT JOIN {related} AS {name} ON {name}.{column} = {root}.{root_pk}"
                )),
                JoinStrategy::Junction(junction) => {
                    let link = format!("{name}_junction");
                    joins.push(format!(
                        "LEFT JOIN {} AS {link} ON {link}.{} = {root}.{root_pk}",
                        junction.table, junction.owner_column
                    ));
                    joins.push(format!(
                        "LEFT JOIN {related} AS {name} ON {name}.{related_pk} = {link}.{}",
                        junction.related_column
                    ));
                }
            }
        }

        let soft = self.soft_delete_clause(entity, root, options.with_deleted);
        let (where_sql, mut params) = self.where_clause(entity, &options.filter, Some(root), soft)?;

        let mut sql = format!("SELECT {} FROM {root}", projection.join(", "));
        for join in &joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&where_sql);

        if !options.order.is_empty() {
            let mut terms = Vec::with_capacity(options.order.len());
            for (column, order) in &options.order {
                validate_identifier(column)?;
                terms.push(format!("{root}.{column} {}", order.as_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (options.limit, options.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ?");
                params.push(Value::Integer(saturating_i64(limit)));
                if let Some(offset) = offset {
                    sql.push_str(" OFFSET ?");
                    params.push(Value::Integer(saturating_i64(offset)));
                }
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(Value::Integer(saturating_i64(offset)));
            }
            (None, None) => {}
        }

        Ok(Statement::new(sql, params))
    }

    /// Builds `SELECT COUNT(*) AS count`, honouring soft-delete filtering.
    pub fn count(&self, entity: &EntityKey, options: &FindOptions) -> Result<Statement> {
        let table = self.table(entity)?;
        let soft = self.soft_delete_clause(entity, &table.name, options.with_deleted);
        let (where_sql, params) = self.where_clause(entity, &options.filter, Some(&table.name), soft)?;
        Ok(Statement::new(
            format!("SELECT COUNT(*) AS count FROM {}{where_sql}", table.name),
            params,
        ))
    }

    /// Builds `INSERT INTO t (cols) VALUES (?, …)` from already-serialized values.
    pub fn insert(&self, entity: &EntityKey, values: &[(String, Value)]) -> Result<Statement> {
        let table = self.table(entity)?;
        if values.is_empty() {
            return Ok(Statement::new(
                format!("INSERT INTO {} DEFAULT VALUES", table.name),
                Vec::new(),
            ));
        }
        let (columns, params) = split_values(values)?;
        Ok(Statement::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.name,
                columns.join(", "),
                placeholders(columns.len())
            ),
            params,
        ))
    }

    /// Builds `UPDATE t SET c = ?, … WHERE …`.
    ///
    /// # Errors
    ///
    /// [`OrmError::MissingWhereClause`] for an empty filter,
    /// [`OrmError::InvalidStatement`] when there is nothing to set.
    pub fn update(&self, entity: &EntityKey, values: &[(String, Value)], filter: &Filter) -> Result<Statement> {
        let table = self.table(entity)?;
        Self::require_filter(filter, "update")?;
        if values.is_empty() {
            return Err(OrmError::InvalidStatement(format!(
                "update of {} has no columns to set",
                table.name
            )));
        }
        let (columns, mut params) = split_values(values)?;
        let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
        let (where_sql, filter_params) = self.where_clause(entity, filter, None, None)?;
        params.extend(filter_params);
        Ok(Statement::new(
            format!("UPDATE {} SET {}{where_sql}", table.name, assignments.join(", ")),
            params,
        ))
    }

    /// Builds `DELETE FROM t WHERE …`.
    pub fn delete(&self, entity: &EntityKey, filter: &Filter) -> Result<Statement> {
        let table = self.table(entity)?;
        Self::require_filter(filter, "delete")?;
        let (where_sql, params) = self.where_clause(entity, filter, None, None)?;
        Ok(Statement::new(format!("DELETE FROM {}{where_sql}", table.name), params))
    }

    /// Builds an insert that updates the non-conflict columns when a row with
    /// the same `conflict_paths` already exists. Create-timestamp columns keep
    /// their stored value.
    pub fn upsert(
        &self,
        entity: &EntityKey,
        values: &[(String, Value)],
        conflict_paths: &[String],
    ) -> Result<Statement> {
        let table = self.table(entity)?;
        if conflict_paths.is_empty() {
            return Err(OrmError::InvalidStatement(format!(
                "upsert into {} needs at least one conflict path",
                table.name
            )));
        }
        for path in conflict_paths {
            validate_identifier(path)?;
        }
        let insert = self.insert(entity, values)?;
        let updates: Vec<String> = values
            .iter()
            .map(|(c, _)| c)
            .filter(|c| !conflict_paths.contains(c))
            .filter(|c| {
                self.registry
                    .find_column(entity, c)
                    .is_none_or(|column| column.mode != ColumnMode::CreateDate)
            })
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        Ok(Statement::new(
            format!("{} ON CONFLICT({}) {action}", insert.sql, conflict_paths.join(", ")),
            insert.params,
        ))
    }

    /// Builds `UPDATE t SET c = c ± ? WHERE …`.
    pub fn counter(
        &self,
        entity: &EntityKey,
        filter: &Filter,
        column: &str,
        by: Value,
        direction: Counter,
    ) -> Result<Statement> {
        let table = self.table(entity)?;
        Self::require_filter(filter, "counter update")?;
        validate_identifier(column)?;
        let sign = match direction {
            Counter::Increment => "+",
            Counter::Decrement => "-",
        };
        let (where_sql, filter_params) = self.where_clause(entity, filter, None, None)?;
        let mut params = vec![by.to_param()];
        params.extend(filter_params);
        Ok(Statement::new(
            format!("UPDATE {} SET {column} = {column} {sign} ?{where_sql}", table.name),
            params,
        ))
    }

    /// Builds the soft-remove update, stamping the soft-delete column with `now`.
    pub fn soft_remove(&self, entity: &EntityKey, filter: &Filter, now: DateTime<Utc>) -> Result<Statement> {
        let table = self.table(entity)?;
        Self::require_filter(filter, "soft remove")?;
        let column = self
            .registry
            .find_mode_column(entity, ColumnMode::DeleteDate)
            .ok_or_else(|| OrmError::MissingSoftDeleteColumn {
                entity: entity.clone(),
            })?;
        let stamp = transform::to_database(column, &Value::Timestamp(now));
        let (where_sql, filter_params) = self.where_clause(entity, filter, None, None)?;
        let mut params = vec![stamp];
        params.extend(filter_params);
        Ok(Statement::new(
            format!("UPDATE {} SET {} = ?{where_sql}", table.name, column.property),
            params,
        ))
    }

    /// Builds the recover update, clearing the soft-delete column.
    pub fn recover(&self, entity: &EntityKey, filter: &Filter) -> Result<Statement> {
        let table = self.table(entity)?;
        Self::require_filter(filter, "recover")?;
        let column = self
            .registry
            .find_mode_column(entity, ColumnMode::DeleteDate)
            .ok_or_else(|| OrmError::MissingSoftDeleteColumn {
                entity: entity.clone(),
            })?;
        let (where_sql, params) = self.where_clause(entity, filter, None, None)?;
        Ok(Statement::new(
            format!("UPDATE {} SET {} = NULL{where_sql}", table.name, column.property),
            params,
        ))
    }

    /// Builds the junction-row insert linking `owner_id` to `related_id`.
    pub fn link(&self, junction: &Junction, owner_id: &Value, related_id: &Value) -> Result<Statement> {
        validate_identifier(&junction.table)?;
        Ok(Statement::new(
            format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                junction.table, junction.owner_column, junction.related_column
            ),
            vec![owner_id.to_param(), related_id.to_param()],
        ))
    }
}

fn split_values(values: &[(String, Value)]) -> Result<(Vec<&str>, Vec<Value>)> {
    let mut columns = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());
    for (column, value) in values {
        validate_identifier(column)?;
        columns.push(column.as_str());
        params.push(value.to_param());
    }
    Ok((columns, params))
}
