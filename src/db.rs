use tracing::info;

use crate::config;
use crate::error::AppResult;
use crate::mapping::{self, ACCESS, CREATED_AT, EXPIRE_AT, ID, TEXT};
use crate::models::{Access, Paste};
use crate::store::{AnyStore, DocumentStore, Filter, FindOptions, MemoryStore, Sort, SqlStore};

/// Paste queries over a document store.
#[derive(Clone)]
pub struct Database {
    store: AnyStore,
    collection: String,
    recent_limit: usize,
}

impl Database {
    pub fn new(store: impl Into<AnyStore>, collection: &str, recent_limit: usize) -> Self {
        Self {
            store: store.into(),
            collection: collection.to_owned(),
            recent_limit,
        }
    }

    /// Open the store described by the configuration.
    pub async fn connect(
        config: &config::Database,
        limits: &config::Limits,
    ) -> anyhow::Result<Self> {
        let store: AnyStore = match config.kind {
            config::StoreKind::Sql => SqlStore::connect(&config.url)
                .await?
                .with_collection(&config.collection, mapping::PASTE_SCHEMA)
                .await?
                .into(),
            config::StoreKind::Memory => MemoryStore::new().into(),
        };
        Ok(Self::new(store, &config.collection, limits.recent_pastes))
    }

    /// Get a paste by id, regardless of its access level.
    ///
    /// Ids aren't unique; when several pastes share one, whichever the store yields
    /// first is returned.
    pub async fn get_by_id(&self, id: i64) -> AppResult<Option<Paste>> {
        let options = FindOptions::default().limit(1);
        let docs = self
            .store
            .find(&self.collection, &Filter::eq(ID, id), &options)
            .await?;
        mapping::to_paste(docs.into_iter().next())
    }

    /// The most recently created public pastes, newest first.
    pub async fn list_recent(&self) -> AppResult<Vec<Paste>> {
        self.list_recent_with_limit(self.recent_limit).await
    }

    pub async fn list_recent_with_limit(&self, limit: usize) -> AppResult<Vec<Paste>> {
        let options = FindOptions::default()
            .sort(Sort::descending(CREATED_AT))
            .limit(limit);
        let docs = self
            .store
            .find(&self.collection, &public_only(), &options)
            .await?;
        mapping::to_pastes(docs)
    }

    /// Public pastes containing `text`, ignoring case, oldest first.
    ///
    /// Blank input yields nothing without querying the store.
    pub async fn search_by_substring(&self, text: Option<&str>) -> AppResult<Vec<Paste>> {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return Ok(Vec::new());
        };

        let filter = Filter::contains_ignore_case(TEXT, text).and(public_only());
        let options = FindOptions::default().sort(Sort::ascending(CREATED_AT));
        let docs = self.store.find(&self.collection, &filter, &options).await?;
        mapping::to_pastes(docs)
    }

    pub async fn insert(&self, paste: &Paste) -> AppResult<()> {
        self.store
            .insert_one(&self.collection, mapping::to_document(paste))
            .await
    }

    /// Delete every paste whose expiry lies before now, returning how many went.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let now = mapping::local_to_utc(mapping::now_local());
        let count = self
            .store
            .delete_many(&self.collection, &Filter::lt(EXPIRE_AT, now))
            .await?;

        if count > 0 {
            info!("deleted {count} expired pastes");
        }

        Ok(count)
    }
}

fn public_only() -> Filter {
    Filter::eq(ACCESS, Access::Public.as_str())
}
