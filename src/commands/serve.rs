use std::net::SocketAddr;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::controllers::paste;
use crate::db::Database;
use crate::error::AppError;
use crate::ids::AnyIdGenerator;
use crate::models::PasteRequest;
use crate::sweeper::Sweeper;
use crate::App;

pub async fn run(app: App) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], app.config.port));

    let sweeper = if app.config.sweeper.enabled {
        let interval = app.config.sweeper.interval();
        info!("sweeping expired pastes every {}s", interval.as_secs());
        Some(Sweeper::new(app.database.clone()).spawn(interval))
    } else {
        None
    };

    info!("listening on {addr}");
    axum::Server::bind(&addr)
        .serve(router(app).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        let purged = sweeper.purged();
        sweeper.shutdown().await;
        info!("sweeper removed {purged} pastes in total");
    }

    Ok(())
}

pub fn router(app: App) -> Router {
    let max_upload_size = app.config.limits.max_upload_size;

    Router::new()
        .route("/api/v1/pastes", get(list_recent).post(create_paste))
        .route("/api/v1/pastes/:id", get(get_paste))
        .route("/api/v1/pastes/text/:text", get(search))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn get_paste(
    State(db): State<Database>,
    Path(id): Path<String>,
) -> crate::AppResult<String> {
    let id = id
        .parse::<i64>()
        .map_err(|_| AppError::MalformedId(id.clone()))?;

    paste::get(&db, id)
        .await?
        .map(|p| p.text().to_owned())
        .ok_or(AppError::NotFound)
}

async fn list_recent(State(db): State<Database>) -> crate::AppResult<Json<Vec<String>>> {
    let pastes = paste::list_recent(&db).await?;
    Ok(Json(pastes.iter().map(|p| p.text().to_owned()).collect()))
}

async fn search(
    State(db): State<Database>,
    Path(text): Path<String>,
) -> crate::AppResult<Json<Vec<String>>> {
    let pastes = paste::search(&db, Some(&text)).await?;
    Ok(Json(pastes.iter().map(|p| p.text().to_owned()).collect()))
}

async fn create_paste(
    State(db): State<Database>,
    State(ids): State<AnyIdGenerator>,
    Json(request): Json<PasteRequest>,
) -> crate::AppResult<Json<i64>> {
    let paste = paste::create(&db, &ids, request).await?;
    Ok(Json(paste.id()))
}
