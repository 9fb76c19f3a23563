mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{record, write_png, FakeProbe, Fixture};
use media_depot::api::{router, AppState};
use media_depot::MetadataStore;
use axum::http::HeaderMap;
use serde_json::{json, Value};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

fn app(fixture: &Fixture) -> axum::Router {
    app_with_probe(fixture, FakeProbe::default())
}

fn app_with_probe(fixture: &Fixture, probe: FakeProbe) -> axum::Router {
    let state = AppState::new(fixture.config.clone(), fixture.store.clone(), Arc::new(probe)).unwrap();
    router(state)
}

async fn call_raw(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, _, bytes) = call_raw(app, method, uri, body).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Poll a copy token until it stops copying; returns the final status
async fn wait_for_copy(app: &axum::Router, session: &str, token: &str) -> Value {
    let uri = format!("/api/sessions/{}/ingest/copy/{}", session, token);
    for _ in 0..500 {
        let (_, body) = call(app, "GET", &uri, None).await;
        if body["status"] != "copying" {
            return body["status"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Value::Null
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = Fixture::new();
    let (status, body) = call(&app(&fixture), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "media-depot");
}

#[tokio::test]
async fn test_search_endpoint_and_errors() {
    let fixture = Fixture::new();
    let mut row = record("a1", "jpg");
    row.genre = Some("noir".to_string());
    fixture.store.insert(&row).unwrap();
    let app = app(&fixture);

    let (status, body) = call(&app, "GET", "/api/search?genre=noir&view=table", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["view"], "table");
    assert_eq!(body["records"][0]["file_id"], "a1");
    assert_eq!(body["records"][0]["file_path"], "assetdepot/media/archive/other/a1.jpg");

    let (status, body) = call(&app, "GET", "/api/search?view=list", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (status, _) = call(&app, "GET", "/api/search?colour=red", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cart_is_scoped_per_session() {
    let fixture = Fixture::new();
    for id in ["a", "b"] {
        fixture.store.insert(&record(id, "jpg")).unwrap();
    }
    let app = app(&fixture);

    let (status, body) = call(&app, "POST", "/api/sessions/s1/cart", Some(json!({"ids": ["b", "a"]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], 2);

    let (_, body) = call(&app, "GET", "/api/sessions/s1/cart", None).await;
    assert_eq!(body["ids"], json!(["a", "b"]));
    assert_eq!(body["records"].as_array().unwrap().len(), 2);

    let (_, body) = call(&app, "GET", "/api/sessions/s2/cart", None).await;
    assert_eq!(body["ids"], json!([]));

    let (_, body) = call(&app, "POST", "/api/sessions/s1/cart/remove", Some(json!({"ids": ["a"]}))).await;
    assert_eq!(body["ids"], json!(["b"]));

    let (_, body) = call(&app, "DELETE", "/api/sessions/s1/records", Some(json!({"ids": ["b"]}))).await;
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["cart"], json!([]));
}

#[tokio::test]
async fn test_ingestion_over_http() {
    let fixture = Fixture::new();
    let source = write_png(&fixture.inbox(), "upload.png", 6, 4);
    let app = app(&fixture);

    let (status, body) = call(
        &app,
        "POST",
        "/api/sessions/s1/ingest",
        Some(json!({"paths": [source]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"], 1);

    let (status, body) = call(&app, "POST", "/api/sessions/s1/ingest/items/1/copy", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "InvalidTransition");

    let (status, body) = call(&app, "POST", "/api/sessions/s1/ingest/items/1/extract", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "metadata_extracted");

    let (_, body) = call(&app, "POST", "/api/sessions/s1/ingest/items/1/copy", Some(json!({}))).await;
    let token = body["token"].as_str().unwrap().to_string();

    assert_eq!(wait_for_copy(&app, "s1", &token).await, "complete");

    let (status, body) = call(
        &app,
        "POST",
        "/api/sessions/s1/ingest/items/1/commit",
        Some(json!({"fields": {"subject": "upload"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (status, body) = call(
        &app,
        "POST",
        "/api/sessions/s1/ingest/items/1/commit",
        Some(json!({"fields": {"subject": "upload", "genre": "test"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["file_resolution"], "6x4");
    assert_eq!(body["queue"]["counts"]["Committed"], 1);

    let (status, _) = call(&app, "GET", "/static/assetdepot/media/archive/images/upload.png", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/api/sessions/s1/ingest/copy/copy_missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn test_categories_and_record_edits() {
    let fixture = Fixture::new();
    for (id, genre) in [("a", "noir"), ("b", "noir"), ("c", "pop")] {
        let mut row = record(id, "jpg");
        row.genre = Some(genre.to_string());
        fixture.store.insert(&row).unwrap();
    }
    let app = app(&fixture);

    let (status, body) = call(&app, "GET", "/api/categories/genre?top=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"], json!([{"value": "noir", "count": 2}]));

    let (status, _) = call(
        &app,
        "PATCH",
        "/api/records",
        Some(json!({"file_id": "c", "field": "file_path", "value": "/etc"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "PATCH",
        "/api/records",
        Some(json!({"file_id": "zz", "field": "genre", "value": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        "PATCH",
        "/api/records",
        Some(json!({"file_id": "c", "field": "genre", "value": "noir"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let (_, body) = call(&app, "GET", "/api/stats", None).await;
    assert_eq!(body["records"], 3);
}

#[tokio::test]
async fn test_rejected_enqueue_leaves_queue_untouched() {
    let fixture = Fixture::new();
    let inbox = fixture.inbox();
    let valid = write_png(&inbox, "valid.png", 2, 2);
    write_png(&inbox, "other.png", 2, 2);
    let app = app(&fixture);

    let missing_folder = fixture.temp_dir.path().join("no_such_dir");
    let (status, body) = call(
        &app,
        "POST",
        "/api/sessions/s1/ingest",
        Some(json!({"paths": [valid], "folder": missing_folder})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (_, body) = call(&app, "GET", "/api/sessions/s1/ingest", None).await;
    assert_eq!(body["items"], json!([]));

    let (status, body) = call(
        &app,
        "POST",
        "/api/sessions/s1/ingest",
        Some(json!({"paths": [valid], "folder": inbox})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_copy_progress_answers_while_thumbnails_run() {
    let fixture = Fixture::new();
    let inbox = fixture.inbox();
    let video = inbox.join("slow.mp4");
    std::fs::write(&video, b"fake video bytes").unwrap();
    let image = write_png(&inbox, "still.png", 2, 2);
    let app = app_with_probe(
        &fixture,
        FakeProbe::default().with_frame_delay(Duration::from_millis(300)),
    );

    call(&app, "POST", "/api/sessions/s1/ingest", Some(json!({"paths": [video, image]}))).await;
    let mut tokens = Vec::new();
    for id in [1, 2] {
        call(&app, "POST", &format!("/api/sessions/s1/ingest/items/{}/extract", id), None).await;
        let (_, body) = call(&app, "POST", &format!("/api/sessions/s1/ingest/items/{}/copy", id), None).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(wait_for_copy(&app, "s1", &token).await, "complete");
        tokens.push(token);
    }

    let busy = app.clone();
    let thumbnails = tokio::spawn(async move {
        call(&busy, "POST", "/api/sessions/s1/ingest/items/1/thumbnails", None).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let (status, body) = call(&app, "GET", &format!("/api/sessions/s1/ingest/copy/{}", tokens[1]), None).await;
    let waited = started.elapsed();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    assert!(waited < Duration::from_millis(250), "poll waited {:?}", waited);

    let (status, body) = thumbnails.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["thumbnails"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_cart_download_zips_files_on_disk() {
    let fixture = Fixture::new();
    let files = fixture.depot().join("assetdepot/media/archive/other");
    std::fs::create_dir_all(&files).unwrap();
    for id in ["a", "b", "gone"] {
        fixture.store.insert(&record(id, "jpg")).unwrap();
    }
    std::fs::write(files.join("a.jpg"), b"alpha").unwrap();
    std::fs::write(files.join("b.jpg"), b"bravo").unwrap();
    let app = app(&fixture);

    let (status, _, body) = call_raw(&app, "POST", "/api/sessions/s1/cart/download", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["kind"], "ValidationError");

    call(&app, "POST", "/api/sessions/s1/cart", Some(json!({"ids": ["a", "b", "gone"]}))).await;
    let (status, headers, body) = call_raw(&app, "GET", "/api/sessions/s1/cart/download", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/zip");
    let disposition = headers["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"media_"), "{}", disposition);
    assert!(disposition.ends_with(".zip\""), "{}", disposition);

    let mut archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    assert_eq!(archive.len(), 2);
    let mut contents = String::new();
    archive.by_name("b.jpg").unwrap().read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "bravo");

    // Only cart members can be selected
    let (status, _, body) = call_raw(
        &app,
        "POST",
        "/api/sessions/s1/cart/download",
        Some(json!({"ids": ["a", "not-in-cart"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(zip::ZipArchive::new(Cursor::new(body)).unwrap().len(), 1);

    let (status, _, _) = call_raw(
        &app,
        "POST",
        "/api/sessions/s1/cart/download",
        Some(json!({"ids": ["gone"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
