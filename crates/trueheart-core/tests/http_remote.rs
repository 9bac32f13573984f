//! `HttpRemoteStore` against an in-process fake of the `/sync/*` API.

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use trueheart_core::auth::{AuthState, SessionToken};
use trueheart_core::config::SyncConfig;
use trueheart_core::models::{DeletionEvent, ItemId, ItemKind, Note, Snapshot, Timestamp};
use trueheart_core::remote::{
    decode_snapshot, HttpRemoteStore, RejectReason, RemoteError, RemoteStore,
};

const TOKEN: &str = "test-session";

#[derive(Default)]
struct FakeServer {
    blob: Option<String>,
    events: Vec<Value>,
}

type Shared = Arc<Mutex<FakeServer>>;

#[derive(Deserialize)]
struct AppQuery {
    app_id: String,
}

#[derive(Deserialize)]
struct EventsQuery {
    app_id: String,
    since: usize,
    limit: usize,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn save(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "invalid session");
    }
    assert_eq!(body["app_id"], "trueheart-test");
    let Some(data) = body["data"].as_str() else {
        return error(StatusCode::BAD_REQUEST, "missing data");
    };
    let incoming = decode_snapshot(data).expect("client sent a valid blob");
    let mut server = state.lock().unwrap();
    let existing_has_data = server
        .blob
        .as_deref()
        .map(|blob| decode_snapshot(blob).unwrap())
        .is_some_and(|stored| !trueheart_core::sync::is_empty(&stored));
    if trueheart_core::sync::is_empty(&incoming) && existing_has_data {
        return error(
            StatusCode::CONFLICT,
            "Refusing to overwrite existing data with an empty snapshot",
        );
    }
    server.blob = Some(data.to_string());
    Json(json!({ "success": true, "syncVersion": incoming.sync_version })).into_response()
}

async fn load(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<AppQuery>,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "invalid session");
    }
    assert_eq!(query.app_id, "trueheart-test");
    match state.lock().unwrap().blob.clone() {
        Some(data) => Json(json!({ "success": true, "data": data })).into_response(),
        None => error(StatusCode::NOT_FOUND, "no data"),
    }
}

async fn append_events(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "invalid session");
    }
    let events = body["events"].as_array().cloned().unwrap_or_default();
    state.lock().unwrap().events.extend(events);
    Json(json!({ "success": true })).into_response()
}

async fn fetch_events(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "invalid session");
    }
    assert_eq!(query.app_id, "trueheart-test");
    let server = state.lock().unwrap();
    let events: Vec<Value> = server
        .events
        .iter()
        .skip(query.since)
        .take(query.limit)
        .cloned()
        .collect();
    Json(json!({ "success": true, "events": events })).into_response()
}

async fn spawn_server() -> (String, Shared) {
    let state = Shared::default();
    let app = Router::new()
        .route("/sync/save", post(save))
        .route("/sync/load", get(load))
        .route("/sync/event", post(append_events))
        .route("/sync/events", get(fetch_events))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{address}/"), state)
}

fn client(base_url: &str, auth: &AuthState) -> HttpRemoteStore {
    let config = SyncConfig::new(base_url).with_app_id("trueheart-test");
    HttpRemoteStore::new(&config, Arc::new(auth.clone())).unwrap()
}

fn signed_in() -> AuthState {
    AuthState::signed_in(SessionToken::new(TOKEN).unwrap())
}

fn snapshot_with_note(id: &str) -> Snapshot {
    let mut note = Note::new("psalm notes");
    note.id = ItemId::new(id);
    let mut snapshot = Snapshot::default();
    snapshot.notes.insert("19".to_string(), vec![note]);
    snapshot.sync_version = 2;
    snapshot
}

#[tokio::test]
async fn load_before_any_save_is_absent() {
    let (base_url, _) = spawn_server().await;
    let remote = client(&base_url, &signed_in());
    assert_eq!(remote.load().await, Ok(None));
}

#[tokio::test]
async fn save_then_load_returns_snapshot() {
    let (base_url, state) = spawn_server().await;
    let remote = client(&base_url, &signed_in());
    let snapshot = snapshot_with_note("n1");

    let ack = remote.save(&snapshot).await.unwrap();
    assert_eq!(ack.sync_version, Some(2));
    assert!(state.lock().unwrap().blob.is_some());

    let loaded = remote.load().await.unwrap().unwrap();
    assert_eq!(loaded, snapshot);
}

#[tokio::test]
async fn empty_upload_over_data_is_rejected() {
    let (base_url, _) = spawn_server().await;
    let remote = client(&base_url, &signed_in());
    remote.save(&snapshot_with_note("n1")).await.unwrap();

    assert_eq!(
        remote.save(&Snapshot::default()).await,
        Err(RemoteError::Rejected(RejectReason::EmptySnapshot))
    );
}

#[tokio::test]
async fn wrong_session_is_unauthenticated() {
    let (base_url, _) = spawn_server().await;
    let auth = AuthState::signed_in(SessionToken::new("stale").unwrap());
    let remote = client(&base_url, &auth);

    assert_eq!(remote.load().await, Err(RemoteError::Unauthenticated));
}

#[tokio::test]
async fn events_append_and_page() {
    let (base_url, state) = spawn_server().await;
    let remote = client(&base_url, &signed_in());
    let events: Vec<DeletionEvent> = ["a", "b", "c"]
        .into_iter()
        .map(|id| {
            DeletionEvent::new(
                ItemId::new(id),
                ItemKind::Bookmark,
                Timestamp::new("2024-04-01T00:00:00Z"),
                "device-x",
            )
        })
        .collect();

    remote.append_events(&events).await.unwrap();
    assert_eq!(state.lock().unwrap().events[0]["type"], "bookmark");

    let first = remote.fetch_events(0, 2).await.unwrap();
    assert_eq!(first.events, events[..2].to_vec());
    assert_eq!(first.next_cursor, 2);

    let rest = remote.fetch_events(first.next_cursor, 2).await.unwrap();
    assert_eq!(rest.events, events[2..].to_vec());
    assert_eq!(rest.next_cursor, 3);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let remote = client(&format!("http://{address}"), &signed_in());
    assert!(matches!(
        remote.load().await,
        Err(RemoteError::Transport(_))
    ));
}
