use tracing::info;

use crate::db::Database;
use crate::ids::IdGenerator;
use crate::models::{Paste, PasteRequest};

pub async fn get(database: &Database, id: i64) -> crate::AppResult<Option<Paste>> {
    database.get_by_id(id).await
}

pub async fn list_recent(database: &Database) -> crate::AppResult<Vec<Paste>> {
    database.list_recent().await
}

pub async fn search(database: &Database, text: Option<&str>) -> crate::AppResult<Vec<Paste>> {
    database.search_by_substring(text).await
}

/// Validate and store a new paste. Nothing is written if the request is invalid.
pub async fn create(
    database: &Database,
    ids: &impl IdGenerator,
    request: PasteRequest,
) -> crate::AppResult<Paste> {
    let paste = Paste::from_request(request, ids)?;
    database.insert(&paste).await?;

    info!(
        "new paste: id={id}, access={access}, size={size}",
        id = paste.id(),
        access = paste.access(),
        size = paste.text().len()
    );

    Ok(paste)
}

pub async fn purge_expired(database: &Database) -> crate::AppResult<u64> {
    database.purge_expired().await
}
