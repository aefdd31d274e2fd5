use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::error::AppResult;

pub mod memory;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// A single field value inside a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Int64(i64),
    Instant(DateTime<Utc>),
}

impl Value {
    /// Order two values of the same kind. Values of different kinds don't compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Instant(a), Value::Instant(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::String(_) => Kind::String,
            Value::Int64(_) => Kind::Int64,
            Value::Instant(_) => Kind::Instant,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Instant(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Int64,
    Instant,
}

/// A named, typed field of a collection's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: Kind,
}

/// An ordered field/value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, replacing any previous value under the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Predicate over documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Lt(String, Value),
    /// Unanchored, case-insensitive literal substring match on a string field.
    ContainsIgnoreCase(String, String),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn contains_ignore_case(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::ContainsIgnoreCase(field.into(), needle.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            filter => Filter::And(vec![filter, other]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Sort {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Sort {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub trait DocumentStore {
    /// Find documents matching a filter, optionally sorted and capped.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> AppResult<Vec<Document>>;

    /// Insert one document. Duplicate ids are accepted.
    async fn insert_one(&self, collection: &str, document: Document) -> AppResult<()>;

    /// Delete every matching document, returning how many were removed.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> AppResult<u64>;
}

#[derive(Clone)]
pub enum AnyStore {
    Sql(SqlStore),
    Memory(MemoryStore),
}

impl DocumentStore for AnyStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> AppResult<Vec<Document>> {
        match self {
            AnyStore::Sql(sql) => sql.find(collection, filter, options).await,
            AnyStore::Memory(memory) => memory.find(collection, filter, options).await,
        }
    }

    async fn insert_one(&self, collection: &str, document: Document) -> AppResult<()> {
        match self {
            AnyStore::Sql(sql) => sql.insert_one(collection, document).await,
            AnyStore::Memory(memory) => memory.insert_one(collection, document).await,
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> AppResult<u64> {
        match self {
            AnyStore::Sql(sql) => sql.delete_many(collection, filter).await,
            AnyStore::Memory(memory) => memory.delete_many(collection, filter).await,
        }
    }
}

impl From<SqlStore> for AnyStore {
    fn from(value: SqlStore) -> Self {
        AnyStore::Sql(value)
    }
}

impl From<MemoryStore> for AnyStore {
    fn from(value: MemoryStore) -> Self {
        AnyStore::Memory(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_keeps_insertion_order_and_replaces() {
        let doc = Document::new()
            .with("b", 1i64)
            .with("a", "x")
            .with("b", 2i64);
        let names: Vec<_> = doc.fields().map(|(n, _)| n).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(doc.get("b"), Some(&Value::Int64(2)));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn and_flattens() {
        let filter = Filter::eq("a", 1i64)
            .and(Filter::eq("b", 2i64))
            .and(Filter::lt("c", 3i64));
        match filter {
            Filter::And(filters) => assert_eq!(filters.len(), 3),
            other => panic!("unexpected filter: {other:?}"),
        }

        // an empty conjunction matches everything and is extended in place
        let filter = Filter::And(Vec::new()).and(Filter::eq("a", 1i64));
        match filter {
            Filter::And(filters) => assert_eq!(filters, [Filter::eq("a", 1i64)]),
            other => panic!("unexpected filter: {other:?}"),
        }
    }

    #[test]
    fn values_of_different_kinds_do_not_compare() {
        assert_eq!(Value::from(1i64).compare(&Value::from("1")), None);
        assert_eq!(
            Value::from(1i64).compare(&Value::from(2i64)),
            Some(Ordering::Less)
        );
    }
}
