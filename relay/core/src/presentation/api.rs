// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP bridge onto the bus
//!
//! Lets clients without a bus connection publish, read and watch topics, and
//! therefore drive the control surface: declaring an alias is a `POST` to
//! `/api/topics/meta/alias/add`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::application::registry::AliasRegistry;
use crate::domain::bus::{Bus, BusError, BusMessage, TopicInfo, TopicKind};

/// Origin tag on messages published through the bridge
pub const HTTP_ORIGIN: &str = "http-bridge";

pub struct AppState {
    pub bus: Arc<dyn Bus>,
    pub registry: Arc<AliasRegistry>,
    pub started_at: Instant,
}

pub fn app(bus: Arc<dyn Bus>, registry: Arc<AliasRegistry>) -> Router {
    let state = Arc::new(AppState {
        bus,
        registry,
        started_at: Instant::now(),
    });

    Router::new()
        .route("/health", get(health))
        .route("/api/aliases", get(list_aliases))
        .route(
            "/api/topics/{*path}",
            get(read_topic).post(publish_topic).put(register_topic),
        )
        .route("/api/watch/{*path}", get(watch_topic))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct RegisterTopicRequest {
    pub kind: TopicKind,
    #[serde(default)]
    pub description: String,
}

fn error_response(status: StatusCode, message: impl ToString) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.to_string() })))
}

fn bus_error_status(error: &BusError) -> StatusCode {
    match error {
        BusError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        BusError::AlreadyRegistered { .. } => StatusCode::CONFLICT,
        BusError::Closed | BusError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.registry.status();
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "aliases": status.state.len(),
        "running_mirrors": status.running.len(),
    }))
}

async fn list_aliases(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.registry.status();
    Json(json!({
        "aliases": status.state,
        "stale": status.stale,
    }))
}

async fn read_topic(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let info = state.bus.topic(&path).await;
    match state.bus.retained(&path).await {
        Some(value) => (
            StatusCode::OK,
            Json(json!({ "path": path, "kind": info.map(|i| i.kind), "value": value })),
        ),
        None => error_response(StatusCode::NOT_FOUND, format!("No retained value on '{}'", path)),
    }
}

async fn publish_topic(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(value): Json<Value>,
) -> impl IntoResponse {
    debug!(path = %path, "Publishing through HTTP bridge");
    match state
        .bus
        .publish(BusMessage::new(path.clone(), value).with_origin(HTTP_ORIGIN))
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "published": path }))),
        Err(e) => error_response(bus_error_status(&e), e),
    }
}

async fn register_topic(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(request): Json<RegisterTopicRequest>,
) -> impl IntoResponse {
    let info = TopicInfo {
        path: path.clone(),
        kind: request.kind,
        description: request.description,
    };
    match state.bus.register(info).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "registered": path }))),
        Err(e) => error_response(bus_error_status(&e), e),
    }
}

async fn watch_topic(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<Value>)> {
    let stream = state
        .bus
        .watch(&path)
        .await
        .map_err(|e| error_response(bus_error_status(&e), e))?;

    let events = stream.map(|message| {
        let event = Event::default().event("message");
        Ok(match event.json_data(&message) {
            Ok(event) => event,
            Err(e) => Event::default().event("error").data(e.to_string()),
        })
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::RegistrySettings;
    use crate::infrastructure::event_bus::InMemoryBus;
    use crate::infrastructure::snapshots::NullSnapshotStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn router() -> (Arc<InMemoryBus>, Arc<AliasRegistry>, Router) {
        let bus = Arc::new(InMemoryBus::new(64));
        let registry = AliasRegistry::open(bus.clone(), Arc::new(NullSnapshotStore), RegistrySettings::default())
            .await
            .unwrap();
        let app = app(bus.clone(), registry.clone());
        (bus, registry, app)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_bus, _registry, app) = router().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["aliases"], 0);
    }

    #[tokio::test]
    async fn test_register_publish_and_read() {
        let (_bus, _registry, app) = router().await;

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/topics/house/temp", json!({ "kind": "property" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/topics/house/temp", json!(21.5)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .oneshot(Request::builder().uri("/api/topics/house/temp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["path"], "house/temp");
        assert_eq!(body["kind"], "property");
        assert_eq!(body["value"], json!(21.5));
    }

    #[tokio::test]
    async fn test_read_without_value_is_not_found() {
        let (_bus, _registry, app) = router().await;
        let response = app
            .oneshot(Request::builder().uri("/api/topics/nothing/here").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_conflicting_registration() {
        let (bus, _registry, app) = router().await;
        bus.register(TopicInfo::event("door", "")).await.unwrap();

        let response = app
            .oneshot(json_request("PUT", "/api/topics/door", json!({ "kind": "property" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_list_aliases() {
        let (_bus, registry, app) = router().await;
        registry
            .declare(crate::domain::alias::AliasDeclaration::short("x", "y"))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/api/aliases").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["aliases"]["y"]["target"], "x");
        assert_eq!(body["stale"], json!([]));
    }
}
