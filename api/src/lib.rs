//! graphql-sse-api - GraphQL over HTTP and Server-Sent Events for axum
//!
//! This crate serves any async-graphql schema over plain HTTP. Queries and mutations are
//! answered with JSON. Subscriptions are initiated with a `201 Created` whose `Location` points
//! at an SSE endpoint, which then streams one `message` event per result and `ping` events while
//! idle. Clients that send `Accept: text/event-stream` get the stream on the original request.
//! Subscriptions are also served over WebSocket for GraphiQL and other `graphql-ws` clients.

pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod execution;
pub mod operation;
pub mod render;
pub mod server;

use async_graphql::{ObjectType, SubscriptionType};
use axum::serve;
use config::ApiConfig;
use errors::ApiResult;
use server::GraphQLRoutes;
use tokio::net::TcpListener;
use tracing::info;

/// Start the API server
///
/// Runs until the routes' shutdown token is cancelled. Cancelling the token also ends every
/// open subscription stream, so graceful shutdown does not wait on long-lived clients.
/// Routing settings from `config` replace the ones set on `routes`.
pub async fn start_server<Q, M, S>(routes: GraphQLRoutes<Q, M, S>, config: ApiConfig) -> ApiResult<()>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    info!("Starting GraphQL SSE API server on {}", config.bind_address);

    let routes = routes.with_config(&config);
    let shutdown = routes.shutdown();
    let graphql_path = routes.graphql_path();
    let subscription_path = routes.subscription_path();
    let websocket_path = routes.websocket_path();
    let graphiql_path = routes.graphiql_path();
    let test_client_path = routes.test_client_path();

    let app = server::build_app(routes, &config)?;
    let listener = TcpListener::bind(config.bind_address).await?;
    let local_addr = listener.local_addr()?;

    info!("GraphQL endpoint: http://{}{}", local_addr, graphql_path);
    info!("SSE subscriptions: http://{}{}", local_addr, subscription_path);
    info!("WebSocket subscriptions: ws://{}{}", local_addr, websocket_path);
    if config.graphiql_enabled {
        info!("GraphiQL: http://{}{}", local_addr, graphiql_path);
    }
    if config.test_client_enabled {
        info!("SSE test client: http://{}{}", local_addr, test_client_path);
    }
    info!("Health check: http://{}/healthz", local_addr);

    serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("GraphQL SSE API server stopped");
    Ok(())
}
