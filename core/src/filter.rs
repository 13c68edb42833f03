//! Filter expressions.
//!
//! A [`Filter`] maps column names to conditions, AND-combined. Each condition
//! is either a bare value (implicit equality) or an [`Operator`] node.

use crate::value::Value;

/// Comparison applied to a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Equal(Value),
    NotEqual(Value),
    LessThan(Value),
    GreaterThan(Value),
    LessOrEqual(Value),
    GreaterOrEqual(Value),
    /// Inclusive range, `BETWEEN ? AND ?`.
    Between(Value, Value),
    Like(Value),
    /// Case-insensitive `LIKE`.
    ILike(Value),
    In(Vec<Value>),
    IsNull,
    /// Literal SQL appended after the column name, never parameterized.
    Raw(String),
    /// Negation of another condition.
    Not(Box<Condition>),
}

impl Operator {
    /// Wraps a condition in [`Operator::Not`].
    ///
    /// # Examples
    ///
    /// ```
    /// use relata_core::{Condition, Operator};
    ///
    /// let not_null = Operator::not(Operator::IsNull);
    /// assert_eq!(not_null, Operator::Not(Box::new(Condition::Op(Operator::IsNull))));
    /// ```
    pub fn not(inner: impl Into<Condition>) -> Self {
        Operator::Not(Box::new(inner.into()))
    }

    /// Shorthand for [`Operator::In`] from anything convertible to values.
    pub fn any_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Operator::In(values.into_iter().map(Into::into).collect())
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Operator::Between(low.into(), high.into())
    }
}

/// Right-hand side of a filter entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Implicit equality.
    Value(Value),
    Op(Operator),
}

impl From<Operator> for Condition {
    fn from(op: Operator) -> Self {
        Condition::Op(op)
    }
}

impl<T: Into<Value>> From<T> for Condition {
    fn from(value: T) -> Self {
        Condition::Value(value.into())
    }
}

/// AND-combined conditions keyed by column name.
///
/// Setting the same column twice replaces the earlier condition, matching
/// map semantics.
///
/// # Examples
///
/// ```
/// use relata_core::{Filter, Operator};
///
/// let filter = Filter::new()
///     .and("status", "active")
///     .and("age", Operator::GreaterOrEqual(18i64.into()));
/// assert_eq!(filter.len(), 2);
/// assert!(Filter::new().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry equality filter.
    pub fn by(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(column, Condition::Value(value.into()))
    }

    pub fn and(mut self, column: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.insert(column, condition);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, condition: impl Into<Condition>) {
        let column = column.into();
        let condition = condition.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = condition,
            None => self.entries.push((column, condition)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.entries.iter().map(|(c, cond)| (c.as_str(), cond))
    }
}

impl<K: Into<String>, C: Into<Condition>> FromIterator<(K, C)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, C)>>(iter: I) -> Self {
        let mut filter = Filter::new();
        for (column, condition) in iter {
            filter.insert(column, condition);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_column_replaces() {
        let filter = Filter::new().and("a", 1i64).and("a", 2i64);
        assert_eq!(filter.len(), 1);
        let (_, cond) = filter.iter().next().unwrap();
        assert_eq!(cond, &Condition::Value(Value::Integer(2)));
    }

    #[test]
    fn test_from_iterator_keeps_order() {
        let filter: Filter = vec![("b", 1i64), ("a", 2i64)].into_iter().collect();
        let columns: Vec<_> = filter.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["b", "a"]);
    }

    #[test]
    fn test_any_of_builds_in_list() {
        assert_eq!(
            Operator::any_of([1i64, 2]),
            Operator::In(vec![Value::Integer(1), Value::Integer(2)])
        );
    }
}
