//! Rendering of engine results as HTTP responses
//!
//! - Queries and mutations: `200 OK` with a JSON payload, whatever GraphQL errors it carries
//! - Subscription initiation: `201 Created` with a `Location` pointing at the SSE endpoint
//! - Subscription streams: `text/event-stream`, one `message` event per engine result and a
//!   `ping` event whenever the engine has been quiet for the ping interval

use std::{convert::Infallible, time::Duration};

use async_graphql::{Response as GraphQLResponse, ServerError, Value};
use async_stream::stream;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{context::RequestInfo, errors::MalformedRequest, operation::Operation};

/// SSE event name for engine results
pub const MESSAGE_EVENT: &str = "message";

/// SSE event name for idle keep-alive events
pub const PING_EVENT: &str = "ping";

/// Shortest ping interval; shorter ones, zero included, are raised to it
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

const SERIALIZATION_FAILURE: &str = r#"{"data":null,"errors":[{"message":"Failed to serialize response"}]}"#;

/// JSON body of a GraphQL result
///
/// `errors` is always present and is `null` when execution reported none.
#[derive(Debug, Serialize)]
pub struct GraphQLPayload {
    pub data: Value,
    pub errors: Option<Vec<ServerError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl From<GraphQLResponse> for GraphQLPayload {
    fn from(response: GraphQLResponse) -> Self {
        let extensions = if response.extensions.is_empty() {
            None
        } else {
            serde_json::to_value(&response.extensions).ok()
        };

        Self {
            data: response.data,
            errors: (!response.errors.is_empty()).then_some(response.errors),
            extensions,
        }
    }
}

impl GraphQLPayload {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| SERIALIZATION_FAILURE.to_string())
    }
}

/// Render a query or mutation result
pub fn json_response(response: GraphQLResponse) -> Response {
    (StatusCode::OK, Json(GraphQLPayload::from(response))).into_response()
}

/// Absolute URL of the SSE endpoint that will run `operation`
///
/// Falls back to a path-only location when the request did not name a host.
pub fn subscription_location(info: &RequestInfo, sse_path: &str, operation: &Operation) -> String {
    let query = operation.to_location_query();
    match info.host() {
        Some(host) => format!("{}://{}{}?{}", info.scheme(), host, sse_path, query),
        None => format!("{}?{}", sse_path, query),
    }
}

/// Answer a subscription request with `201 Created` and the location of its event stream
pub fn subscription_created(location: &str) -> Result<Response, MalformedRequest> {
    let location = HeaderValue::from_str(location).map_err(|e| MalformedRequest::InvalidLocation(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION, location),
            (
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static("location"),
            ),
        ],
    )
        .into_response())
}

fn message_event(response: GraphQLResponse) -> Event {
    Event::default()
        .event(MESSAGE_EVENT)
        .data(GraphQLPayload::from(response).to_json())
}

fn ping_event() -> Event {
    Event::default()
        .event(PING_EVENT)
        .data(chrono::Utc::now().to_rfc3339())
}

enum Step {
    Message(GraphQLResponse),
    Ping,
    Stop,
}

/// Stream engine results as server-sent events
///
/// The stream ends when the engine stream ends or `shutdown` is cancelled. When the client goes
/// away axum drops the body, which drops `responses` and everything the resolvers hold.
pub fn sse_response(
    mut responses: BoxStream<'static, GraphQLResponse>,
    ping_interval: Duration,
    shutdown: CancellationToken,
) -> Response {
    let events = stream! {
        debug!("SSE subscription started");
        let ping_interval = ping_interval.max(MIN_PING_INTERVAL);
        let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);

        loop {
            let step = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("SSE subscription cancelled by shutdown");
                    Step::Stop
                }
                next = responses.next() => next.map_or(Step::Stop, Step::Message),
                _ = ticker.tick() => Step::Ping,
            };

            match step {
                Step::Message(response) => {
                    ticker.reset();
                    yield Ok::<_, Infallible>(message_event(response));
                }
                Step::Ping => yield Ok(ping_event()),
                Step::Stop => break,
            }
        }

        debug!("SSE subscription stopped");
    };

    Sse::new(events).into_response()
}
