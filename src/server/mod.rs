//! HTTP server module
//!
//! Wires the store, trackers, scheduler, and tutor engine into shared state
//! and serves the JSON API. Each request is handled independently; the only
//! cross-request shared mutable state is the per-user records in the store.

pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::mastery::MasteryTracker;
use crate::model;
use crate::srs::ReviewScheduler;
use crate::store::SqliteStore;
use crate::tutor::TutorEngine;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TutorEngine>,
    pub store: Arc<SqliteStore>,
    pub mastery: Arc<MasteryTracker>,
    pub scheduler: Arc<ReviewScheduler>,
}

/// Build the full component graph from configuration
pub async fn build_state(config: &Config) -> Result<AppState> {
    let db_path = config.database.resolve_path()?;
    let store = Arc::new(
        SqliteStore::new(&db_path)
            .await
            .context("Failed to open database")?,
    );

    let mastery = Arc::new(MasteryTracker::new(store.clone(), config.mastery.clone()));
    let scheduler = Arc::new(ReviewScheduler::new(
        store.clone(),
        mastery.clone(),
        config.srs.clone(),
    ));

    let model = model::from_config(&config.llm);
    let engine = Arc::new(TutorEngine::new(
        model,
        store.clone(),
        mastery.clone(),
        scheduler.clone(),
        config.mastery.recycle_policy,
    ));

    Ok(AppState {
        engine,
        store,
        mastery,
        scheduler,
    })
}

/// Build the API router over the given state
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(http::health_handler))
        .route("/api/users", post(http::create_user_handler))
        .route("/api/users/{user_id}", get(http::get_user_handler))
        .route("/api/tutor/text", post(http::tutor_text_handler))
        .route("/api/srs/due/{user_id}", get(http::srs_due_handler))
        .route("/api/srs/review", post(http::srs_review_handler))
        .route("/api/srs/suspend", post(http::srs_suspend_handler))
        .route("/api/errors/{user_id}", get(http::errors_handler))
        .route("/api/mastery/{user_id}", get(http::mastery_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the web server
pub async fn start(host: &str, port: u16, config: &Config) -> Result<()> {
    let state = build_state(config).await?;
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listen address")?;

    info!("listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
