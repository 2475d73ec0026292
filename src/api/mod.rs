//! Read-only HTTP layer over the exported records and cluster metadata.

pub mod routes;
pub mod types;

use std::net::SocketAddr;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
}

pub fn router(settings: Settings) -> Router {
    Router::new()
        .route("/records", get(routes::list_records))
        .route("/records/:id", get(routes::get_record))
        .route("/clusters", get(routes::list_clusters))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { settings })
}

pub async fn serve(settings: Settings, host: String, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!(%addr, "serving ml-lifecycle-mapper API");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(settings).into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}
