//! Axum HTTP server configuration with GraphQL support

use std::{sync::Arc, time::Duration};

use async_graphql::{
    ObjectType, Schema, SubscriptionType,
    http::{ALL_WEBSOCKET_PROTOCOLS, GraphiQLSource},
};
use async_graphql_axum::GraphQLProtocol;
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Request, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, Version, header, request::Parts},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::{
    CompressionLevel,
    compression::{
        CompressionLayer,
        predicate::{Predicate, SizeAbove},
    },
    cors::CorsLayer,
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::{
    client::render_test_client,
    config::ApiConfig,
    context::{ContextBuilder, EmptyContext, RequestInfo},
    errors::{ApiError, ApiResult, MalformedRequest},
    execution::{ExecutionAdapter, ExecutionResult},
    operation::{Operation, is_multipart},
    render::{MIN_PING_INTERVAL, json_response, sse_response, subscription_created, subscription_location},
};

/// Largest request body accepted on the GraphQL endpoints
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Health check response for the liveness endpoint
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: &'static str,
}

/// Predicate that excludes Server-Sent Events from compression
///
/// SSE requires immediate event delivery without buffering.
/// Compression would buffer responses, breaking real-time streaming.
#[derive(Clone, Copy)]
struct NotSse;

impl Predicate for NotSse {
    fn should_compress<B>(&self, response: &axum::http::Response<B>) -> bool {
        // HTTP headers are case-insensitive, so we need case-insensitive comparison
        let is_sse = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_lowercase().contains("text/event-stream"))
            .unwrap_or(false);

        !is_sse
    }
}

/// Registers the GraphQL endpoints for a schema on an axum router
///
/// Routes, relative to the path prefix:
/// - `GET|POST /graphql`: queries and mutations, and subscription initiation (201 + `Location`)
/// - `GET|POST /sse-subscription`: the event stream of one subscription
/// - `GET /graphiql`: GraphiQL, when enabled
/// - `GET /sse-client`: the browser test client, when enabled
pub struct GraphQLRoutes<Q, M, S> {
    schema: Schema<Q, M, S>,
    path_prefix: String,
    context_builder: Arc<dyn ContextBuilder>,
    ping_interval: Duration,
    graphiql_enabled: bool,
    test_client_enabled: bool,
    shutdown: CancellationToken,
}

impl<Q, M, S> GraphQLRoutes<Q, M, S>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    pub fn new(schema: Schema<Q, M, S>) -> Self {
        Self {
            schema,
            path_prefix: String::new(),
            context_builder: Arc::new(EmptyContext),
            ping_interval: Duration::from_secs(10),
            graphiql_enabled: false,
            test_client_enabled: false,
            shutdown: CancellationToken::new(),
        }
    }

    /// Apply the routing-related settings of an [`ApiConfig`]
    pub fn with_config(self, config: &ApiConfig) -> Self {
        self.path_prefix(&config.path_prefix)
            .ping_interval(config.ping_interval)
            .graphiql(config.graphiql_enabled)
            .test_client(config.test_client_enabled)
    }

    /// Mount all endpoints below `prefix`; leading and trailing slashes are normalized
    pub fn path_prefix(mut self, prefix: &str) -> Self {
        self.path_prefix = normalize_prefix(prefix);
        self
    }

    pub fn context_builder(mut self, builder: impl ContextBuilder) -> Self {
        self.context_builder = Arc::new(builder);
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval.max(MIN_PING_INTERVAL);
        self
    }

    pub fn graphiql(mut self, enabled: bool) -> Self {
        self.graphiql_enabled = enabled;
        self
    }

    pub fn test_client(mut self, enabled: bool) -> Self {
        self.test_client_enabled = enabled;
        self
    }

    /// Token that ends every open subscription stream when cancelled
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn graphql_path(&self) -> String {
        format!("{}/graphql", self.path_prefix)
    }

    pub fn subscription_path(&self) -> String {
        format!("{}/sse-subscription", self.path_prefix)
    }

    pub fn websocket_path(&self) -> String {
        format!("{}/subscriptions", self.path_prefix)
    }

    pub fn graphiql_path(&self) -> String {
        format!("{}/graphiql", self.path_prefix)
    }

    pub fn test_client_path(&self) -> String {
        format!("{}/sse-client", self.path_prefix)
    }

    pub fn into_router(self) -> Router {
        let graphql_path = self.graphql_path();
        let subscription_path = self.subscription_path();
        let websocket_path = self.websocket_path();
        let graphiql_path = self.graphiql_path();
        let test_client_path = self.test_client_path();

        let state = GraphQLState {
            adapter: ExecutionAdapter::new(self.schema, self.context_builder),
            graphql_path: graphql_path.clone().into(),
            subscription_path: subscription_path.clone().into(),
            websocket_path: websocket_path.clone().into(),
            ping_interval: self.ping_interval,
            graphiql_enabled: self.graphiql_enabled,
            test_client_enabled: self.test_client_enabled,
            shutdown: self.shutdown,
        };

        Router::new()
            .route(
                &graphql_path,
                get(graphql_handler::<Q, M, S>).post(graphql_handler::<Q, M, S>),
            )
            .route(
                &subscription_path,
                get(subscription_handler::<Q, M, S>).post(subscription_handler::<Q, M, S>),
            )
            .route(&websocket_path, get(websocket_handler::<Q, M, S>))
            .route(&graphiql_path, get(graphiql_handler::<Q, M, S>))
            .route(&test_client_path, get(test_client_handler::<Q, M, S>))
            .with_state(state)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// State shared by the GraphQL handlers
struct GraphQLState<Q, M, S> {
    adapter: ExecutionAdapter<Q, M, S>,
    graphql_path: Arc<str>,
    subscription_path: Arc<str>,
    websocket_path: Arc<str>,
    ping_interval: Duration,
    graphiql_enabled: bool,
    test_client_enabled: bool,
    shutdown: CancellationToken,
}

impl<Q, M, S> Clone for GraphQLState<Q, M, S> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            graphql_path: self.graphql_path.clone(),
            subscription_path: self.subscription_path.clone(),
            websocket_path: self.websocket_path.clone(),
            ping_interval: self.ping_interval,
            graphiql_enabled: self.graphiql_enabled,
            test_client_enabled: self.test_client_enabled,
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Build the Axum application router
///
/// Adds a liveness endpoint, CORS, compression (never for event streams) and request tracing
/// around the GraphQL routes.
pub fn build_app<Q, M, S>(routes: GraphQLRoutes<Q, M, S>, config: &ApiConfig) -> ApiResult<Router>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    let cors_layer = cors_layer(&config.cors_allowed_origins)?;

    Ok(routes
        .into_router()
        .route("/healthz", get(healthz_handler))
        .layer(cors_layer)
        // Compress only responses > 1KB, excluding SSE to preserve real-time streaming
        .layer(
            CompressionLayer::new()
                .zstd(true)
                .gzip(true)
                .quality(CompressionLevel::Default)
                .compress_when(SizeAbove::new(1024).and(NotSse)),
        )
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(allowed_origins: &[String]) -> ApiResult<CorsLayer> {
    if allowed_origins.iter().any(|origin| origin == "*") {
        // Permissive CORS for development
        return Ok(CorsLayer::permissive());
    }

    let allowed_origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::ConfigError(format!("Invalid CORS origin '{origin}': {e}")))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([header::LOCATION])
        .allow_credentials(true))
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

async fn read_operation(parts: &Parts, body: Body) -> Result<Operation, MalformedRequest> {
    if parts.method == Method::GET {
        return Operation::from_query_string(parts.uri.query());
    }

    let content_type = parts.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| MalformedRequest::InvalidBody(e.to_string()))?;

    match content_type {
        Some(content_type) if is_multipart(Some(content_type)) => Operation::from_multipart(content_type, bytes).await,
        _ => Operation::from_body(content_type, &bytes),
    }
}

/// GraphQL query/mutation handler and subscription initiation
async fn graphql_handler<Q, M, S>(State(state): State<GraphQLState<Q, M, S>>, request: Request) -> Response
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    let (parts, body) = request.into_parts();
    let operation = match read_operation(&parts, body).await {
        Ok(operation) => operation,
        Err(e) => {
            warn!(error = %e, "rejecting malformed GraphQL request");
            return e.into_response();
        }
    };
    let info = RequestInfo::from_parts(&parts);

    // Clients that ask for an event stream get the subscription on this connection
    if operation.is_subscription() && !accepts_event_stream(&parts.headers) {
        let location = subscription_location(&info, &state.subscription_path, &operation);
        debug!(%location, "subscription registered");
        return subscription_created(&location).unwrap_or_else(IntoResponse::into_response);
    }

    match state.adapter.execute(operation, info).await {
        ExecutionResult::Single(response) => json_response(response),
        ExecutionResult::Stream(responses) => sse_response(responses, state.ping_interval, state.shutdown.clone()),
    }
}

/// Event stream of a subscription registered through the GraphQL endpoint
async fn subscription_handler<Q, M, S>(State(state): State<GraphQLState<Q, M, S>>, request: Request) -> Response
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    let (parts, body) = request.into_parts();
    let operation = if parts.method == Method::GET {
        Operation::from_location_query(parts.uri.query())
    } else {
        read_operation(&parts, body).await
    };

    let operation = match operation {
        Ok(operation) => operation,
        Err(e) => {
            warn!(error = %e, "rejecting malformed subscription request");
            return e.into_response();
        }
    };

    debug!(version = ?parts.version, "SSE received subscription request");
    let responses = state.adapter.subscribe(operation, RequestInfo::from_parts(&parts));
    sse_response(responses, state.ping_interval, state.shutdown.clone())
}

/// Subscriptions over WebSocket (`graphql-transport-ws` and the legacy `graphql-ws` protocol)
async fn websocket_handler<Q, M, S>(
    State(state): State<GraphQLState<Q, M, S>>,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
) -> Response
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    let info = RequestInfo {
        method,
        uri,
        version,
        headers,
    };

    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| async move {
            debug!("WebSocket subscription connection opened");
            tokio::select! {
                _ = state.adapter.serve_websocket(socket, protocol, info) => {}
                _ = state.shutdown.cancelled() => debug!("WebSocket connection closed by shutdown"),
            }
            debug!("WebSocket subscription connection closed");
        })
}

/// GraphiQL UI (only enabled if graphiql_enabled config is true)
async fn graphiql_handler<Q, M, S>(State(state): State<GraphQLState<Q, M, S>>) -> Response {
    if state.graphiql_enabled {
        Html(
            GraphiQLSource::build()
                .endpoint(&state.graphql_path)
                .subscription_endpoint(&state.websocket_path)
                .finish(),
        )
        .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            "GraphiQL is disabled. Use POST /graphql for queries.",
        )
            .into_response()
    }
}

/// Browser test client for SSE subscriptions (only enabled if test_client_enabled config is true)
async fn test_client_handler<Q, M, S>(State(state): State<GraphQLState<Q, M, S>>) -> Response {
    if state.test_client_enabled {
        Html(render_test_client("GraphQL SSE test client", &state.graphql_path)).into_response()
    } else {
        (StatusCode::NOT_FOUND, "The SSE test client is disabled.").into_response()
    }
}

/// Liveness endpoint - minimal check that process is alive
async fn healthz_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
