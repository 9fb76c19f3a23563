//! API request handlers

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::bundle::{build_bundle, CartBundle};
use crate::error::{MediaError, Result};
use crate::ingest::sync_copy_progress;
use crate::search::SearchQuery;
use crate::store::Predicate;

use super::models::{CommitRequest, CopyRequest, EnqueueRequest, IdsRequest, UpdateFieldRequest};
use super::server::AppState;

/// Run synchronous store work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| MediaError::io("running a store task", std::io::Error::other(e)))?
}

/// Handle health check requests
pub async fn health_check(state: &AppState) -> Result<Value> {
    Ok(json!({
        "status": "healthy",
        "service": "media-depot",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "depot_root": state.resolver.root().display().to_string(),
        "sessions": state.sessions.len().await,
    }))
}

/// Filtered, paginated search; reserved keys are `caption`, `query`, `page`, `view`
pub async fn search(state: &AppState, params: &HashMap<String, String>) -> Result<Value> {
    let query = SearchQuery::from_params(params)?;
    let engine = state.search.clone();
    let result = blocking(move || engine.search(&query)).await?;
    Ok(json!(result))
}

/// Most frequent values of a categorical column
pub async fn categories(state: &AppState, field: &str, top: Option<usize>) -> Result<Value> {
    let top = top.unwrap_or(state.config.search.top_topics);
    let store = state.store.clone();
    let column = field.to_string();
    let counts = blocking(move || store.category_counts(&column, top)).await?;
    Ok(json!({ "field": field, "counts": counts }))
}

pub async fn random_record(state: &AppState) -> Result<Value> {
    let store = state.store.clone();
    let record = blocking(move || store.random_record())
        .await?
        .ok_or_else(|| MediaError::NotFound("catalog is empty".into()))?;
    Ok(json!(state.resolver.enrich(record)?))
}

/// Edit one field of a catalogued record
pub async fn update_record(state: &AppState, request: UpdateFieldRequest) -> Result<Value> {
    let store = state.store.clone();
    let UpdateFieldRequest { file_id, field, value } = request;
    let id = file_id.clone();
    let changed = blocking(move || store.update_field(&id, &field, &value)).await?;
    if changed == 0 {
        return Err(MediaError::NotFound(format!("record {}", file_id)));
    }
    Ok(json!({ "updated": changed, "file_id": file_id }))
}

/// Remove records from the catalog and from the caller's cart
pub async fn delete_records(state: &AppState, session_id: &str, request: IdsRequest) -> Result<Value> {
    let store = state.store.clone();
    let ids = request.ids.clone();
    let deleted = blocking(move || store.delete(&ids)).await?;

    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    context.cart.remove(&request.ids);

    Ok(json!({ "deleted": deleted, "cart": context.cart.list() }))
}

/// Cart contents as enriched records
pub async fn cart_list(state: &AppState, session_id: &str) -> Result<Value> {
    let ids = {
        let session = state.sessions.get_or_create(session_id).await;
        let mut context = session.lock().await;
        context.touch();
        context.cart.list()
    };

    let store = state.store.clone();
    let engine = state.search.clone();
    let lookup = ids.clone();
    let records = blocking(move || engine.enrich_all(store.get_by_ids(&lookup)?)).await?;
    Ok(json!({ "ids": ids, "records": records }))
}

pub async fn cart_add(state: &AppState, session_id: &str, request: IdsRequest) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    let added = context.cart.add(request.ids);
    Ok(json!({ "added": added, "ids": context.cart.list() }))
}

pub async fn cart_remove(state: &AppState, session_id: &str, request: &IdsRequest) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    let removed = context.cart.remove(&request.ids);
    Ok(json!({ "removed": removed, "ids": context.cart.list() }))
}

pub async fn cart_clear(state: &AppState, session_id: &str) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    context.cart.clear();
    Ok(json!({ "ids": [] }))
}

/// ZIP of the cart's files, or of `selected` when given (cart members only)
pub async fn cart_download(state: &AppState, session_id: &str, selected: Option<Vec<String>>) -> Result<CartBundle> {
    let ids: Vec<String> = {
        let session = state.sessions.get_or_create(session_id).await;
        let mut context = session.lock().await;
        context.touch();
        match selected {
            Some(selected) => selected.into_iter().filter(|id| context.cart.contains(id)).collect(),
            None => context.cart.list(),
        }
    };
    if ids.is_empty() {
        return Err(MediaError::Validation("no files selected for download".into()));
    }

    let store = state.store.clone();
    let resolver = state.resolver.clone();
    blocking(move || {
        let records = store.get_by_ids(&ids)?;
        if records.is_empty() {
            return Err(MediaError::NotFound("selected files are not in the catalog".into()));
        }
        build_bundle(&resolver, &records, chrono::Local::now().date_naive())
    })
    .await
}

pub async fn ingest_snapshot(state: &AppState, session_id: &str) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    Ok(json!(context.queue.snapshot()))
}

/// Queue `paths` and the contents of `folder`; a bad entry rejects all of it
pub async fn ingest_enqueue(state: &AppState, session_id: &str, request: EnqueueRequest) -> Result<Value> {
    if request.paths.is_empty() && request.folder.is_none() {
        return Err(MediaError::Validation("nothing to enqueue".into()));
    }

    let mut paths = request.paths;
    if let Some(folder) = &request.folder {
        paths.extend(state.pipeline.folder_files(folder)?);
    }

    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    Ok(json!(state.pipeline.enqueue(&mut context.queue, paths)?))
}

pub async fn ingest_clear(state: &AppState, session_id: &str) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    state.pipeline.clear(&mut context.queue).await;
    Ok(json!(context.queue.snapshot()))
}

pub async fn ingest_extract(state: &AppState, session_id: &str, item_id: u64) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    let item = state.pipeline.extract_metadata(&mut context.queue, item_id).await?;
    Ok(json!(item))
}

pub async fn ingest_copy(state: &AppState, session_id: &str, item_id: u64, request: CopyRequest) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    let token = state
        .pipeline
        .copy_file(&mut context.queue, item_id, request.category)
        .await?;
    Ok(json!({ "item_id": item_id, "token": token }))
}

/// Copy progress by token. Never waits on the session: while another request
/// holds it, the item picks the progress up on its next operation instead.
pub async fn ingest_progress(state: &AppState, session_id: &str, token: &str) -> Result<Value> {
    let progress = state.pipeline.copy_progress(token).await?;

    let session = state.sessions.get_or_create(session_id).await;
    if let Ok(mut context) = session.try_lock() {
        context.touch();
        sync_copy_progress(&mut context.queue, &progress);
    }
    Ok(json!(progress))
}

pub async fn ingest_thumbnails(state: &AppState, session_id: &str, item_id: u64) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    let thumbnails = state
        .pipeline
        .generate_thumbnails(&mut context.queue, item_id)
        .await?;
    Ok(json!({ "item_id": item_id, "thumbnails": thumbnails }))
}

pub async fn ingest_commit(state: &AppState, session_id: &str, item_id: u64, request: &CommitRequest) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    let record = state
        .pipeline
        .commit(&mut context.queue, item_id, &request.fields)
        .await?;
    Ok(json!({ "record": record, "queue": context.queue.snapshot() }))
}

pub async fn ingest_skip(state: &AppState, session_id: &str, item_id: u64) -> Result<Value> {
    let session = state.sessions.get_or_create(session_id).await;
    let mut context = session.lock().await;
    context.touch();
    Ok(json!(state.pipeline.skip(&mut context.queue, item_id).await?))
}

/// Catalog size
pub async fn catalog_stats(state: &AppState) -> Result<Value> {
    let store = state.store.clone();
    let records = blocking(move || store.count(&Predicate::new())).await?;
    Ok(json!({ "records": records, "table": state.store.table() }))
}
