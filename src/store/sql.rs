use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sqlx::any::{AnyArguments, AnyPool, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Row};
use tracing::debug;

use super::{Direction, Document, DocumentStore, Field, Filter, FindOptions, Kind, Value};
use crate::error::{AppError, AppResult};

/// Documents stored as rows of a SQL table, one table per collection.
///
/// Every collection must be registered with its schema through
/// [`SqlStore::with_collection`] before use. Instants are kept as epoch milliseconds.
#[derive(Clone)]
pub struct SqlStore {
    pool: AnyPool,
    schemas: Arc<HashMap<String, &'static [Field]>>,
}

impl SqlStore {
    /// Connect to a database by URL.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        Ok(Self::from_pool(AnyPool::connect(url).await?))
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self {
            pool,
            schemas: Arc::default(),
        }
    }

    /// Register a collection, creating its table if it doesn't exist yet.
    pub async fn with_collection(
        mut self,
        name: &str,
        schema: &'static [Field],
    ) -> AppResult<Self> {
        if !is_identifier(name) {
            return Err(AppError::InvalidCollectionName(name.to_owned()));
        }
        if let Some(field) = schema.iter().find(|f| !is_identifier(f.name)) {
            return Err(AppError::UnknownField(field.name.to_owned()));
        }

        let columns = schema
            .iter()
            .map(|f| format!("{} {} NOT NULL", f.name, column_type(f.kind)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("CREATE TABLE IF NOT EXISTS {name} ({columns})");
        debug!("{sql}");

        let mut conn = self.pool.acquire().await?;
        sqlx::query(&sql).execute(&mut conn).await?;

        Arc::make_mut(&mut self.schemas).insert(name.to_owned(), schema);
        Ok(self)
    }

    fn schema(&self, collection: &str) -> AppResult<&'static [Field]> {
        self.schemas
            .get(collection)
            .copied()
            .ok_or_else(|| AppError::UnknownCollection(collection.to_owned()))
    }

    fn placeholders(&self) -> Placeholders {
        Placeholders {
            numbered: uses_numbered_params(&self.pool),
            next: 1,
        }
    }
}

impl DocumentStore for SqlStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> AppResult<Vec<Document>> {
        let schema = self.schema(collection)?;
        let mut params = self.placeholders();
        let mut binds = Vec::new();

        let columns = schema.iter().map(|f| f.name).collect::<Vec<_>>().join(", ");
        let condition = where_clause(filter, schema, &mut params, &mut binds)?;
        let mut sql = format!("SELECT {columns} FROM {collection} WHERE {condition}");
        if let Some(sort) = &options.sort {
            let field = lookup(schema, &sort.field)?;
            let direction = match sort.direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {direction}", field.name));
        }
        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        debug!("{sql}");

        let mut conn = self.pool.acquire().await?;
        let rows = bind_all(sqlx::query(&sql), binds)
            .fetch_all(&mut conn)
            .await?;

        rows.iter().map(|row| decode_row(row, schema)).collect()
    }

    async fn insert_one(&self, collection: &str, document: Document) -> AppResult<()> {
        let schema = self.schema(collection)?;
        let mut params = self.placeholders();
        let mut binds = Vec::with_capacity(schema.len());
        let mut slots = Vec::with_capacity(schema.len());

        if let Some((name, _)) = document.fields().find(|(n, _)| lookup(schema, n).is_err()) {
            return Err(AppError::MalformedDocument(format!("unexpected '{name}'")));
        }

        for field in schema {
            let value = document
                .get(field.name)
                .ok_or_else(|| AppError::MalformedDocument(format!("missing '{}'", field.name)))?;
            if value.kind() != field.kind {
                return Err(AppError::MalformedDocument(format!(
                    "'{}' should be {:?}",
                    field.name, field.kind
                )));
            }
            binds.push(value.clone());
            slots.push(params.next());
        }

        let columns = schema.iter().map(|f| f.name).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO {collection} ({columns}) VALUES ({slots})",
            slots = slots.join(", ")
        );
        debug!("{sql}");

        let mut conn = self.pool.acquire().await?;
        bind_all(sqlx::query(&sql), binds)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> AppResult<u64> {
        let schema = self.schema(collection)?;
        let mut params = self.placeholders();
        let mut binds = Vec::new();

        let condition = where_clause(filter, schema, &mut params, &mut binds)?;
        let sql = format!("DELETE FROM {collection} WHERE {condition}");
        debug!("{sql}");

        let mut conn = self.pool.acquire().await?;
        let result = bind_all(sqlx::query(&sql), binds)
            .execute(&mut conn)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Positional parameter markers: `?` for sqlite, `$n` for postgres.
struct Placeholders {
    numbered: bool,
    next: usize,
}

impl Placeholders {
    fn next(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        if self.numbered {
            format!("${n}")
        } else {
            "?".to_owned()
        }
    }
}

#[cfg(feature = "postgres")]
fn uses_numbered_params(pool: &AnyPool) -> bool {
    matches!(pool.any_kind(), sqlx::any::AnyKind::Postgres)
}

#[cfg(not(feature = "postgres"))]
fn uses_numbered_params(_pool: &AnyPool) -> bool {
    false
}

fn where_clause(
    filter: &Filter,
    schema: &[Field],
    params: &mut Placeholders,
    binds: &mut Vec<Value>,
) -> AppResult<String> {
    Ok(match filter {
        Filter::Eq(field, value) => {
            let field = lookup(schema, field)?;
            binds.push(value.clone());
            format!("{} = {}", field.name, params.next())
        }
        Filter::Lt(field, value) => {
            let field = lookup(schema, field)?;
            binds.push(value.clone());
            format!("{} < {}", field.name, params.next())
        }
        Filter::ContainsIgnoreCase(field, needle) => {
            let field = lookup(schema, field)?;
            // both sides go through the backend's LOWER so their folding agrees
            binds.push(Value::String(format!("%{}%", escape_like(needle))));
            format!(
                "LOWER({}) LIKE LOWER({}) ESCAPE '\\'",
                field.name,
                params.next()
            )
        }
        Filter::And(filters) if filters.is_empty() => "1 = 1".to_owned(),
        Filter::And(filters) => filters
            .iter()
            .map(|f| where_clause(f, schema, params, binds).map(|c| format!("({c})")))
            .collect::<AppResult<Vec<_>>>()?
            .join(" AND "),
    })
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    binds: Vec<Value>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in binds {
        query = match value {
            Value::String(s) => query.bind(s),
            Value::Int64(n) => query.bind(n),
            Value::Instant(t) => query.bind(t.timestamp_millis()),
        };
    }
    query
}

fn decode_row(row: &AnyRow, schema: &[Field]) -> AppResult<Document> {
    let mut document = Document::new();
    for field in schema {
        let value = match field.kind {
            Kind::String => Value::String(row.try_get::<String, _>(field.name)?),
            Kind::Int64 => Value::Int64(row.try_get::<i64, _>(field.name)?),
            Kind::Instant => {
                let millis = row.try_get::<i64, _>(field.name)?;
                let instant = Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
                    AppError::MalformedDocument(format!("'{}' is out of range", field.name))
                })?;
                Value::Instant(instant)
            }
        };
        document.insert(field.name, value);
    }
    Ok(document)
}

fn lookup<'s>(schema: &'s [Field], name: &str) -> AppResult<&'s Field> {
    schema
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| AppError::UnknownField(name.to_owned()))
}

fn column_type(kind: Kind) -> &'static str {
    match kind {
        Kind::String => "TEXT",
        Kind::Int64 | Kind::Instant => "BIGINT",
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
pub(crate) mod tests {
    use sqlx::any::AnyPoolOptions;

    use super::*;
    use crate::store::Sort;

    const SCHEMA: &[Field] = &[
        Field {
            name: "n",
            kind: Kind::Int64,
        },
        Field {
            name: "text",
            kind: Kind::String,
        },
        Field {
            name: "at",
            kind: Kind::Instant,
        },
    ];

    /// A single-connection in-memory sqlite pool, so every query sees the same database.
    pub(crate) async fn memory_pool() -> AnyPool {
        AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn everything() -> Filter {
        Filter::And(Vec::new())
    }

    fn doc(n: i64, text: &str) -> Document {
        Document::new()
            .with("n", n)
            .with("text", text)
            .with("at", Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap())
    }

    async fn seeded() -> SqlStore {
        let store = SqlStore::from_pool(memory_pool().await)
            .with_collection("things", SCHEMA)
            .await
            .unwrap();
        for (n, text) in [(2, "Hello World"), (1, "100% sure"), (3, "snake_case")] {
            store.insert_one("things", doc(n, text)).await.unwrap();
        }
        store
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(is_identifier("pastes"));
        assert!(is_identifier("_p2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2p"));
        assert!(!is_identifier("pastes; DROP TABLE x"));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[tokio::test]
    async fn rejects_bad_collection_names() {
        let result = SqlStore::from_pool(memory_pool().await)
            .with_collection("bad name", SCHEMA)
            .await;
        assert!(matches!(result, Err(AppError::InvalidCollectionName(_))));
    }

    #[tokio::test]
    async fn unregistered_collection_is_an_error() {
        let store = SqlStore::from_pool(memory_pool().await);
        let result = store
            .find("things", &everything(), &FindOptions::default())
            .await;
        assert!(matches!(result, Err(AppError::UnknownCollection(_))));
    }

    #[tokio::test]
    async fn roundtrips_rows_in_order() {
        let store = seeded().await;
        let options = FindOptions::default().sort(Sort::ascending("at"));
        let found = store.find("things", &everything(), &options).await.unwrap();
        assert_eq!(
            found,
            [doc(1, "100% sure"), doc(2, "Hello World"), doc(3, "snake_case")]
        );
    }

    #[tokio::test]
    async fn contains_matches_literally() {
        let store = seeded().await;
        let find = |needle: &'static str| {
            let store = store.clone();
            async move {
                store
                    .find(
                        "things",
                        &Filter::contains_ignore_case("text", needle),
                        &FindOptions::default(),
                    )
                    .await
                    .unwrap()
                    .len()
            }
        };
        assert_eq!(find("hello").await, 1);
        assert_eq!(find("LO WO").await, 1);
        assert_eq!(find("%").await, 1);
        assert_eq!(find("_").await, 1);
        assert_eq!(find("xyz").await, 0);
    }

    #[tokio::test]
    async fn deletes_and_counts() {
        let store = seeded().await;
        let cutoff = Utc.timestamp_opt(1_700_000_003, 0).unwrap();
        let removed = store
            .delete_many("things", &Filter::lt("at", cutoff))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let left = store
            .find("things", &everything(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(left, [doc(3, "snake_case")]);
    }

    #[tokio::test]
    async fn unknown_filter_field_is_an_error() {
        let store = seeded().await;
        let result = store
            .find("things", &Filter::eq("nope", 1i64), &FindOptions::default())
            .await;
        assert!(matches!(result, Err(AppError::UnknownField(_))));
    }

    #[tokio::test]
    async fn insert_checks_field_kinds() {
        let store = seeded().await;
        let bad = Document::new()
            .with("n", "not a number")
            .with("text", "x")
            .with("at", Utc::now());
        let result = store.insert_one("things", bad).await;
        assert!(matches!(result, Err(AppError::MalformedDocument(_))));
    }
}
