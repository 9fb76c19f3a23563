//! HTTP server implementation for the API

use anyhow::{anyhow, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::handlers;
use super::models::{ApiError, CategoryQuery, CommitRequest, CopyRequest, EnqueueRequest, IdsRequest, UpdateFieldRequest};
use crate::config::Config;
use crate::error::MediaError;
use crate::ingest::IngestionPipeline;
use crate::paths::{PathResolver, STATIC_PREFIX};
use crate::probe::MediaProbe;
use crate::search::SearchEngine;
use crate::session::SessionRegistry;
use crate::store::{MetadataStore, SqliteStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<PathResolver>,
    pub store: Arc<SqliteStore>,
    pub search: Arc<SearchEngine>,
    pub pipeline: Arc<IngestionPipeline>,
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Wire the core components around an opened store
    pub fn new(config: Arc<Config>, store: Arc<SqliteStore>, probe: Arc<dyn MediaProbe>) -> crate::Result<Self> {
        let resolver = Arc::new(PathResolver::new(&config)?);
        let dyn_store: Arc<dyn MetadataStore> = store.clone();

        let search = Arc::new(SearchEngine::new(
            dyn_store.clone(),
            resolver.clone(),
            config.search.clone(),
        ));
        let pipeline = Arc::new(IngestionPipeline::new(
            config.clone(),
            resolver.clone(),
            dyn_store,
            probe,
        ));

        Ok(Self {
            config,
            resolver,
            store,
            search,
            pipeline,
            sessions: SessionRegistry::new(),
        })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let static_files = ServeDir::new(state.resolver.root());

    Router::new()
        // Health check endpoints (both paths for compatibility)
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/api/stats", get(stats_handler))

        // Catalog endpoints
        .route("/api/search", get(search_handler))
        .route("/api/categories/:field", get(categories_handler))
        .route("/api/random", get(random_handler))
        .route("/api/records", patch(update_record_handler))

        // Session-scoped cart
        .route(
            "/api/sessions/:sid/cart",
            get(cart_list_handler).post(cart_add_handler).delete(cart_clear_handler),
        )
        .route("/api/sessions/:sid/cart/remove", post(cart_remove_handler))
        .route(
            "/api/sessions/:sid/cart/download",
            get(cart_download_handler).post(cart_download_handler),
        )
        .route("/api/sessions/:sid/records", axum::routing::delete(delete_records_handler))

        // Session-scoped ingestion
        .route(
            "/api/sessions/:sid/ingest",
            get(ingest_snapshot_handler)
                .post(ingest_enqueue_handler)
                .delete(ingest_clear_handler),
        )
        .route("/api/sessions/:sid/ingest/items/:id/extract", post(ingest_extract_handler))
        .route("/api/sessions/:sid/ingest/items/:id/copy", post(ingest_copy_handler))
        .route("/api/sessions/:sid/ingest/items/:id/thumbnails", post(ingest_thumbnails_handler))
        .route("/api/sessions/:sid/ingest/items/:id/commit", post(ingest_commit_handler))
        .route("/api/sessions/:sid/ingest/items/:id/skip", post(ingest_skip_handler))
        .route("/api/sessions/:sid/ingest/copy/:token", get(ingest_progress_handler))

        // Depot files
        .nest_service(STATIC_PREFIX, static_files)

        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Bind the first free port starting at the configured one
pub async fn bind_listener(host: &str, port: u16, attempts: u16) -> Result<TcpListener> {
    for offset in 0..attempts.max(1) {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => warn!("Port {} unavailable: {}", candidate, e),
        }
    }
    Err(anyhow!(
        "no free port in {}..{} on {}",
        port,
        port.saturating_add(attempts),
        host
    ))
}

/// Configure and start the HTTP server
pub async fn start_http_server(state: AppState) -> Result<()> {
    let server = &state.config.server;
    let listener = bind_listener(&server.host, server.port, server.port_attempts).await?;
    let address = listener.local_addr()?;

    let ttl = Duration::from_secs(server.session_ttl_secs);
    let sweeper = state.sessions.spawn_sweeper(ttl, state.pipeline.tracker().clone());

    info!("🌐 Media depot listening on http://{}", address);
    info!("📂 Serving depot files under http://{}{}", address, STATIC_PREFIX);

    let result = axum::serve(listener, router(state)).await;
    sweeper.abort();
    result?;

    Ok(())
}

fn error_response(e: MediaError) -> Response {
    let status = e.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("❌ Request failed: {}", e);
    }
    let body = ApiError {
        error: e.to_string(),
        kind: e.kind().to_string(),
    };
    (status, Json(body)).into_response()
}

fn respond(result: crate::Result<serde_json::Value>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::health_check(&state).await)
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::catalog_stats(&state).await)
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    respond(handlers::search(&state, &params).await)
}

async fn categories_handler(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Query(query): Query<CategoryQuery>,
) -> impl IntoResponse {
    respond(handlers::categories(&state, &field, query.top).await)
}

async fn random_handler(State(state): State<AppState>) -> impl IntoResponse {
    respond(handlers::random_record(&state).await)
}

async fn update_record_handler(
    State(state): State<AppState>,
    Json(payload): Json<UpdateFieldRequest>,
) -> impl IntoResponse {
    respond(handlers::update_record(&state, payload).await)
}

async fn delete_records_handler(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(payload): Json<IdsRequest>,
) -> impl IntoResponse {
    respond(handlers::delete_records(&state, &sid, payload).await)
}

async fn cart_list_handler(State(state): State<AppState>, Path(sid): Path<String>) -> impl IntoResponse {
    respond(handlers::cart_list(&state, &sid).await)
}

async fn cart_add_handler(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(payload): Json<IdsRequest>,
) -> impl IntoResponse {
    respond(handlers::cart_add(&state, &sid, payload).await)
}

async fn cart_remove_handler(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(payload): Json<IdsRequest>,
) -> impl IntoResponse {
    respond(handlers::cart_remove(&state, &sid, &payload).await)
}

async fn cart_clear_handler(State(state): State<AppState>, Path(sid): Path<String>) -> impl IntoResponse {
    respond(handlers::cart_clear(&state, &sid).await)
}

/// Whole cart, or the `ids` posted in the body
async fn cart_download_handler(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    payload: Option<Json<IdsRequest>>,
) -> Response {
    let selected = payload.map(|Json(request)| request.ids);
    match handlers::cart_download(&state, &sid, selected).await {
        Ok(bundle) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", bundle.file_name),
                ),
            ],
            bundle.bytes,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn ingest_snapshot_handler(State(state): State<AppState>, Path(sid): Path<String>) -> impl IntoResponse {
    respond(handlers::ingest_snapshot(&state, &sid).await)
}

async fn ingest_enqueue_handler(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(payload): Json<EnqueueRequest>,
) -> impl IntoResponse {
    respond(handlers::ingest_enqueue(&state, &sid, payload).await)
}

async fn ingest_clear_handler(State(state): State<AppState>, Path(sid): Path<String>) -> impl IntoResponse {
    respond(handlers::ingest_clear(&state, &sid).await)
}

async fn ingest_extract_handler(
    State(state): State<AppState>,
    Path((sid, id)): Path<(String, u64)>,
) -> impl IntoResponse {
    respond(handlers::ingest_extract(&state, &sid, id).await)
}

async fn ingest_copy_handler(
    State(state): State<AppState>,
    Path((sid, id)): Path<(String, u64)>,
    payload: Option<Json<CopyRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    respond(handlers::ingest_copy(&state, &sid, id, request).await)
}

async fn ingest_progress_handler(
    State(state): State<AppState>,
    Path((sid, token)): Path<(String, String)>,
) -> impl IntoResponse {
    respond(handlers::ingest_progress(&state, &sid, &token).await)
}

async fn ingest_thumbnails_handler(
    State(state): State<AppState>,
    Path((sid, id)): Path<(String, u64)>,
) -> impl IntoResponse {
    respond(handlers::ingest_thumbnails(&state, &sid, id).await)
}

async fn ingest_commit_handler(
    State(state): State<AppState>,
    Path((sid, id)): Path<(String, u64)>,
    Json(payload): Json<CommitRequest>,
) -> impl IntoResponse {
    respond(handlers::ingest_commit(&state, &sid, id, &payload).await)
}

async fn ingest_skip_handler(
    State(state): State<AppState>,
    Path((sid, id)): Path<(String, u64)>,
) -> impl IntoResponse {
    respond(handlers::ingest_skip(&state, &sid, id).await)
}
