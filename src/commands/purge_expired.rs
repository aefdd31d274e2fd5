use tracing::warn;

use crate::config::StoreKind;
use crate::controllers::paste;
use crate::App;

/// Purge expired pastes once and exit. Meant for an external scheduler such as cron.
///
/// The deleted count is logged by the database layer.
pub async fn run(app: App) -> anyhow::Result<()> {
    if app.config.database.kind == StoreKind::Memory {
        warn!("memory store starts empty, nothing to purge");
    }

    paste::purge_expired(&app.database).await?;

    Ok(())
}
