//! Common test utilities for API integration tests
//!
//! Provides a small schema exercising every operation kind, an application built around it
//! the same way a daemon would build it, and helpers for issuing requests and reading
//! server-sent events.

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_graphql::{Context, Data, Object, Result, Schema, Subscription};
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use futures::{Stream, StreamExt};
use graphql_sse_api::{
    config::ApiConfig,
    context::RequestInfo,
    server::{GraphQLRoutes, build_app},
};
use tokio_util::sync::CancellationToken;

pub struct QueryRoot;

#[Object(name = "Query")]
impl QueryRoot {
    async fn hello(&self, name: Option<String>) -> String {
        format!("Hello, {}!", name.as_deref().unwrap_or("world"))
    }

    async fn fail(&self) -> Result<i32> {
        Err("resolver failed".into())
    }

    /// HTTP method of the carrying request
    async fn method(&self, ctx: &Context<'_>) -> Result<String> {
        Ok(ctx.data::<RequestInfo>()?.method.to_string())
    }

    /// Value of the `x-tenant` header, put into the context by the test context builder
    async fn tenant(&self, ctx: &Context<'_>) -> Option<String> {
        ctx.data_opt::<Tenant>().map(|tenant| tenant.0.clone())
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn echo(&self, text: String) -> String {
        text
    }
}

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Counts from 1 to `to` and ends
    async fn numbers(&self, to: i32) -> impl Stream<Item = i32> {
        futures::stream::iter(1..=to)
    }

    /// Counts forever; raises the flag when the stream is dropped
    async fn endless(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = i32>> {
        let guard = DropGuard(ctx.data::<DropFlag>()?.clone());
        Ok(async_stream::stream! {
            let _guard = guard;
            let mut value = 0;
            loop {
                value += 1;
                yield value;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    }

    /// Never yields
    async fn silent(&self) -> impl Stream<Item = i32> {
        futures::stream::pending()
    }
}

pub type TestSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

pub struct Tenant(pub String);

/// Flag set once an `endless` subscription stream has been dropped
#[derive(Clone, Default)]
pub struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    pub fn dropped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Wait up to two seconds for the stream to be dropped
    pub async fn wait_dropped(&self) -> bool {
        for _ in 0..200 {
            if self.dropped() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.dropped()
    }
}

struct DropGuard(DropFlag);

impl Drop for DropGuard {
    fn drop(&mut self) {
        (self.0).0.store(true, Ordering::SeqCst);
    }
}

/// Application under test
pub struct TestApp {
    pub app: Router,
    pub shutdown: CancellationToken,
    pub dropped: DropFlag,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;

        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }
}

/// Configuration used by most tests: `/api` prefix, short ping interval, all pages enabled
pub fn test_config() -> ApiConfig {
    ApiConfig {
        path_prefix: "/api".to_string(),
        ping_interval: Duration::from_millis(50),
        graphiql_enabled: true,
        test_client_enabled: true,
        cors_allowed_origins: vec!["http://localhost:9009".to_string()],
        ..Default::default()
    }
}

pub fn setup_app() -> TestApp {
    setup_app_with_config(&test_config())
}

pub fn setup_app_with_config(config: &ApiConfig) -> TestApp {
    let dropped = DropFlag::default();
    let shutdown = CancellationToken::new();

    let schema = Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(dropped.clone())
        .finish();

    let routes = GraphQLRoutes::new(schema)
        .with_config(config)
        .context_builder(|info: &RequestInfo| {
            let mut data = Data::default();
            if let Some(tenant) = info.headers.get("x-tenant").and_then(|v| v.to_str().ok()) {
                data.insert(Tenant(tenant.to_string()));
            }
            data
        })
        .shutdown_token(shutdown.clone());

    let app = build_app(routes, config).expect("Failed to build app");

    TestApp { app, shutdown, dropped }
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_string(&body).expect("Failed to serialize JSON"),
        ))
        .expect("Failed to build request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(body.to_vec()).expect("Body is not UTF-8")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("Failed to parse JSON")
}

/// One server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.data).expect("Event data is not JSON")
    }
}

/// Split an event-stream body into events
pub fn parse_sse(text: &str) -> Vec<SseEvent> {
    text.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut event = SseEvent {
                event: "message".to_string(),
                data: String::new(),
            };
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event.event = value.trim_start().to_string();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value));
                }
            }
            event.data = data.join("\n");
            event
        })
        .collect()
}

/// Read events from a streaming response until `count` have arrived
pub async fn read_events(response: Response<Body>, count: usize) -> Vec<SseEvent> {
    let mut stream = response.into_body().into_data_stream();
    let mut buffer = String::new();

    loop {
        let complete = buffer.rfind("\n\n").map(|end| parse_sse(&buffer[..end + 2]));
        if let Some(events) = complete.filter(|events| events.len() >= count) {
            return events.into_iter().take(count).collect();
        }

        let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("Timed out waiting for SSE event")
            .expect("SSE stream closed early")
            .expect("SSE stream returned error");
        buffer.push_str(&String::from_utf8_lossy(&frame));
    }
}

/// Path and query of an absolute or relative `Location`
pub fn location_path(location: &str) -> String {
    let base = url::Url::parse("http://localhost").expect("valid base URL");
    let url = base.join(location).expect("Location is not a URL");
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
