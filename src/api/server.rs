//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::{
    handlers,
    models::{ApiResponse, PageParams, SearchParams},
};
use crate::config::Config;
use crate::error::ResolveError;
use crate::pipeline::ResolutionPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ResolutionPipeline,
    pub config: Arc<Config>,
}

/// Build the router with every route and middleware layer
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/anime/:id", get(anime_episodes_handler))
        .route("/anime/:id/live", get(live_episodes_handler))
        .route("/watch/:id/:session", get(watch_handler))
        .route("/listings/airing", get(airing_handler))
        .route("/listings/popular", get(popular_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/cache/clear", post(clear_cache_handler))
        .route("/status", get(status_handler))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Configure and start the HTTP server
pub async fn start_http_server(pipeline: ResolutionPipeline, config: Arc<Config>) -> Result<()> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let app = router(AppState { pipeline, config });

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("🌐 API server listening on http://{}", address);

    axum::serve(listener, app).await?;

    Ok(())
}

fn status_for(error: &ResolveError) -> StatusCode {
    match error {
        ResolveError::NotReady | ResolveError::WorkerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ResolveError::WorkerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond(outcome: crate::error::Result<Value>) -> Response {
    match outcome {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => {
            let status = status_for(&e);
            warn!("⚠️ Request failed ({}): {}", status, e);
            (status, Json(ApiResponse::<()>::error(e.to_string()))).into_response()
        }
    }
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(handlers::health_check().await))
}

async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    respond(handlers::search(&state.pipeline, &params.q).await)
}

async fn anime_episodes_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Response {
    respond(handlers::anime_episodes(&state.pipeline, &id, params.page).await)
}

async fn live_episodes_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Response {
    respond(handlers::live_episodes(&state.pipeline, &id, params.page).await)
}

async fn watch_handler(State(state): State<AppState>, Path((id, session)): Path<(String, String)>) -> Response {
    respond(handlers::watch(&state.pipeline, &id, &session).await)
}

async fn airing_handler(State(state): State<AppState>) -> Response {
    respond(handlers::currently_airing(&state.pipeline).await)
}

async fn popular_handler(State(state): State<AppState>) -> Response {
    respond(handlers::popular(&state.pipeline).await)
}

async fn cache_stats_handler(State(state): State<AppState>) -> Response {
    respond(handlers::cache_stats(&state.pipeline).await)
}

async fn clear_cache_handler(State(state): State<AppState>) -> Response {
    let data = handlers::clear_cache(&state.pipeline).await;
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

async fn status_handler(State(state): State<AppState>) -> Response {
    respond(handlers::status(&state.pipeline).await)
}
