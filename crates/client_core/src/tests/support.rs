//! In-process stand-ins for the REST backend and the blob store.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::domain::{Listing, ListingId, ListingKind, UserId, UserRecord};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex, Notify},
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::blob::{BlobStore, SelectedFile, UploadEvent, UploadStream};

#[derive(Clone, Default)]
pub struct MockBackendState {
    pub users: Arc<Mutex<HashMap<String, UserRecord>>>,
    pub listings: Arc<Mutex<Vec<Listing>>>,
    pub update_bodies: Arc<Mutex<Vec<Value>>>,
    pub cookies: Arc<Mutex<Vec<Option<String>>>>,
    pub taken_emails: Arc<Mutex<HashSet<String>>>,
    pub sign_out_failure: Arc<Mutex<Option<String>>>,
    pub broken_listing_kinds: Arc<Mutex<HashSet<String>>>,
    /// When set, profile updates wait for a notification after recording their body.
    pub update_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl MockBackendState {
    pub async fn insert_user(&self, user: UserRecord) {
        self.users.lock().await.insert(user.id.0.clone(), user);
    }

    pub async fn insert_listing(&self, listing: Listing) {
        self.listings.lock().await.push(listing);
    }

    async fn record_cookie(&self, headers: &HeaderMap) {
        let cookie = headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.cookies.lock().await.push(cookie);
    }
}

pub fn alice() -> UserRecord {
    UserRecord {
        id: UserId::from("u-alice"),
        username: "alice".into(),
        email: "alice@example.com".into(),
        avatar: Some("https://cdn.example.com/alice-old.png".into()),
    }
}

pub fn listing(id: &str, owner: &UserId, kind: ListingKind, offer: bool) -> Listing {
    Listing {
        id: ListingId::from(id),
        name: format!("listing {id}"),
        description: String::new(),
        address: "1 Main St".into(),
        regular_price: 1200.0,
        discount_price: if offer { 1000.0 } else { 0.0 },
        bathrooms: 1,
        bedrooms: 2,
        furnished: false,
        parking: true,
        kind,
        offer,
        image_urls: vec![format!("https://cdn.example.com/{id}.jpg")],
        user_ref: Some(owner.clone()),
    }
}

fn rejection(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "statusCode": status.as_u16(),
            "message": message,
        })),
    )
        .into_response()
}

async fn update_user(
    State(state): State<MockBackendState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record_cookie(&headers).await;
    state.update_bodies.lock().await.push(body.clone());
    let gate = state.update_gate.lock().await.clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }

    if let Some(email) = body.get("email").and_then(Value::as_str) {
        if state.taken_emails.lock().await.contains(email) {
            return rejection(StatusCode::CONFLICT, "Email taken");
        }
    }

    let mut users = state.users.lock().await;
    let Some(user) = users.get_mut(&id) else {
        return rejection(StatusCode::NOT_FOUND, "User not found!");
    };
    if let Some(v) = body.get("username").and_then(Value::as_str) {
        user.username = v.to_string();
    }
    if let Some(v) = body.get("email").and_then(Value::as_str) {
        user.email = v.to_string();
    }
    if let Some(v) = body.get("avatar").and_then(Value::as_str) {
        user.avatar = Some(v.to_string());
    }
    Json(user.clone()).into_response()
}

async fn delete_user(
    State(state): State<MockBackendState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record_cookie(&headers).await;
    match state.users.lock().await.remove(&id) {
        Some(_) => Json(json!("User has been deleted!")).into_response(),
        None => rejection(StatusCode::NOT_FOUND, "User not found!"),
    }
}

async fn sign_out(State(state): State<MockBackendState>, headers: HeaderMap) -> Response {
    state.record_cookie(&headers).await;
    match state.sign_out_failure.lock().await.clone() {
        Some(message) => rejection(StatusCode::INTERNAL_SERVER_ERROR, &message),
        None => Json(json!("User has been logged out!")).into_response(),
    }
}

async fn user_listings(State(state): State<MockBackendState>, Path(id): Path<String>) -> Response {
    if !state.users.lock().await.contains_key(&id) {
        return rejection(StatusCode::UNAUTHORIZED, "You can only view your own listings!");
    }
    let owner = UserId(id);
    let listings: Vec<Listing> = state
        .listings
        .lock()
        .await
        .iter()
        .filter(|listing| listing.user_ref.as_ref() == Some(&owner))
        .cloned()
        .collect();
    Json(listings).into_response()
}

async fn delete_listing(
    State(state): State<MockBackendState>,
    Path(id): Path<String>,
) -> Response {
    let mut listings = state.listings.lock().await;
    let before = listings.len();
    listings.retain(|listing| listing.id.0 != id);
    if listings.len() == before {
        return rejection(StatusCode::NOT_FOUND, "Listing not found!");
    }
    Json(json!("Listing has been deleted!")).into_response()
}

#[derive(Debug, Deserialize)]
struct ListingQueryParams {
    offer: Option<bool>,
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: Option<usize>,
}

async fn get_listings(
    State(state): State<MockBackendState>,
    Query(params): Query<ListingQueryParams>,
) -> Response {
    if let Some(kind) = &params.kind {
        if state.broken_listing_kinds.lock().await.contains(kind) {
            return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
        }
    }
    let listings: Vec<Listing> = state
        .listings
        .lock()
        .await
        .iter()
        .filter(|listing| params.offer.map_or(true, |offer| listing.offer == offer))
        .filter(|listing| {
            params
                .kind
                .as_deref()
                .map_or(true, |kind| listing.kind.as_query_value() == kind)
        })
        .take(params.limit.unwrap_or(9))
        .cloned()
        .collect();
    Json(listings).into_response()
}

pub async fn spawn_backend() -> Result<(String, MockBackendState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = MockBackendState::default();
    let app = Router::new()
        .route("/api/user/update/:id", post(update_user))
        .route("/api/user/delete/:id", delete(delete_user))
        .route("/api/user/listings/:id", get(user_listings))
        .route("/api/auth/signout", get(sign_out))
        .route("/api/listing/delete/:id", delete(delete_listing))
        .route("/api/listing/get", get(get_listings))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

/// Blob store whose transfers are driven by the test through per-upload senders.
#[derive(Default)]
pub struct ScriptedBlobStore {
    uploads: StdMutex<Vec<ScriptedUpload>>,
}

pub struct ScriptedUpload {
    pub destination_key: String,
    pub file_name: String,
    pub events: Option<mpsc::UnboundedSender<UploadEvent>>,
}

impl ScriptedBlobStore {
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().expect("uploads lock").len()
    }

    /// Sender feeding the `index`-th upload started against this store.
    pub fn sender(&self, index: usize) -> mpsc::UnboundedSender<UploadEvent> {
        self.uploads.lock().expect("uploads lock")[index]
            .events
            .clone()
            .expect("upload already closed")
    }

    /// Ends the `index`-th upload stream without a terminal event.
    pub fn close(&self, index: usize) {
        self.uploads.lock().expect("uploads lock")[index].events = None;
    }

    pub fn destination_key(&self, index: usize) -> String {
        self.uploads.lock().expect("uploads lock")[index]
            .destination_key
            .clone()
    }

    pub fn file_name(&self, index: usize) -> String {
        self.uploads.lock().expect("uploads lock")[index]
            .file_name
            .clone()
    }
}

impl BlobStore for ScriptedBlobStore {
    fn upload(&self, file: SelectedFile, destination_key: String) -> UploadStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.uploads.lock().expect("uploads lock").push(ScriptedUpload {
            destination_key,
            file_name: file.name,
            events: Some(tx),
        });
        UnboundedReceiverStream::new(rx).boxed()
    }
}

pub fn image_file(name: &str, size: usize) -> SelectedFile {
    SelectedFile::new(name, "image/png", vec![7u8; size])
}
