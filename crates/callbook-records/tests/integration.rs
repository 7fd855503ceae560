//! Airtable adapter against an in-process mock of the REST API.
//! Run with: `cargo test -p callbook-records --test integration`

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    routing::post,
};
use serde_json::{Value, json};

use callbook_core::error::CallbookError;
use callbook_core::session::RecordId;
use callbook_records::{AirtableStore, RecordFields, RecordStore};

type Seen = Arc<Mutex<Vec<(Method, String, Value)>>>;

async fn table_handler(
    State(seen): State<Seen>,
    Path((base, table)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth != "Bearer pat-key" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"type": "AUTHENTICATION_REQUIRED"}})),
        );
    }
    seen.lock()
        .unwrap()
        .push((method.clone(), format!("{base}/{table}"), body.clone()));

    let id = body["records"][0]["id"]
        .as_str()
        .unwrap_or("recNEW1")
        .to_string();
    (
        StatusCode::OK,
        Json(json!({"records": [{"id": id, "fields": body["records"][0]["fields"]}]})),
    )
}

async fn start_mock() -> (String, Seen) {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/v0/{base}/{table}",
            post(table_handler).patch(table_handler),
        )
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{addr}"), seen)
}

#[tokio::test]
async fn test_create_and_update_round_trip() {
    let (base, seen) = start_mock().await;
    let store = AirtableStore::new("pat-key", "appTEST", "Conversations").with_base_url(&base);

    let mut fields = RecordFields::new()
        .with_transcript("My name is Sam")
        .with_reply("(waiting...)");
    fields.set("Name", "Sam");
    let id = store.create(&fields).await.unwrap();
    assert_eq!(id, RecordId("recNEW1".into()));

    store
        .update(&id, &RecordFields::new().with_reply("Hi Sam"))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let (method, path, body) = &seen[0];
    assert_eq!(*method, Method::POST);
    assert_eq!(path, "appTEST/Conversations");
    assert_eq!(body["records"][0]["fields"]["Name"], "Sam");
    assert!(body["records"][0].get("id").is_none());

    let (method, _, body) = &seen[1];
    assert_eq!(*method, Method::PATCH);
    assert_eq!(body["records"][0]["id"], "recNEW1");
    assert_eq!(body["records"][0]["fields"]["AI Reply"], "Hi Sam");
}

#[tokio::test]
async fn test_rejected_write_is_persistence_error() {
    let (base, _) = start_mock().await;
    let store = AirtableStore::new("bad", "appTEST", "Conversations").with_base_url(&base);

    let err = store.create(&RecordFields::new()).await.unwrap_err();
    assert!(matches!(err, CallbookError::Persistence(_)), "got {err:?}");
}
