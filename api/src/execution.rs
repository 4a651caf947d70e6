//! Bridge between extracted operations and the async-graphql engine

use std::sync::Arc;

use async_graphql::{Data, ObjectType, Request, Response, Schema, SubscriptionType};
use async_graphql_axum::{GraphQLProtocol, GraphQLWebSocket};
use async_stream::stream;
use axum::extract::ws::WebSocket;
use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

use crate::{
    context::{ContextBuilder, RequestInfo},
    operation::Operation,
};

/// Outcome of handing an operation to the engine
pub enum ExecutionResult {
    /// Query or mutation result
    Single(Response),
    /// Subscription results, in the order the engine yields them
    Stream(BoxStream<'static, Response>),
}

/// Executes operations against a schema with a per-request context
pub struct ExecutionAdapter<Q, M, S> {
    schema: Schema<Q, M, S>,
    context_builder: Arc<dyn ContextBuilder>,
}

impl<Q, M, S> Clone for ExecutionAdapter<Q, M, S> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            context_builder: self.context_builder.clone(),
        }
    }
}

impl<Q, M, S> ExecutionAdapter<Q, M, S>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    pub fn new(schema: Schema<Q, M, S>, context_builder: Arc<dyn ContextBuilder>) -> Self {
        Self {
            schema,
            context_builder,
        }
    }

    /// Execute an operation, returning a stream when it is a subscription
    ///
    /// Resolver and validation errors are part of the returned responses.
    pub async fn execute(&self, operation: Operation, info: RequestInfo) -> ExecutionResult {
        let subscription = operation.is_subscription();
        debug!(
            operation_name = operation.operation_name.as_deref(),
            subscription, "executing GraphQL operation"
        );

        let request = self.prepare(operation, info);
        if subscription {
            ExecutionResult::Stream(self.stream(request))
        } else {
            ExecutionResult::Single(self.schema.execute(request).await)
        }
    }

    /// Execute an operation as a stream regardless of its kind
    ///
    /// Queries and mutations produce a single item before the stream ends.
    pub fn subscribe(&self, operation: Operation, info: RequestInfo) -> BoxStream<'static, Response> {
        debug!(
            operation_name = operation.operation_name.as_deref(),
            "starting GraphQL subscription"
        );
        let request = self.prepare(operation, info);
        self.stream(request)
    }

    /// Serve operations sent over an upgraded WebSocket until either side closes it
    ///
    /// The context is built once from the upgrade request and shared by every operation on the
    /// connection.
    pub async fn serve_websocket(self, socket: WebSocket, protocol: GraphQLProtocol, info: RequestInfo) {
        let data = self.request_data(info);
        GraphQLWebSocket::new(socket, self.schema, protocol)
            .with_data(data)
            .serve()
            .await;
    }

    fn request_data(&self, info: RequestInfo) -> Data {
        let mut data = self.context_builder.build(&info);
        data.insert(info);
        data
    }

    fn prepare(&self, operation: Operation, info: RequestInfo) -> Request {
        let mut request = operation.into_request();
        request.data = self.request_data(info);
        request
    }

    fn stream(&self, request: Request) -> BoxStream<'static, Response> {
        let schema = self.schema.clone();
        stream! {
            let mut responses = schema.execute_stream(request);
            while let Some(response) = responses.next().await {
                yield response;
            }
        }
        .boxed()
    }
}
