//! Example schema served by the daemon
//!
//! - `greeting` / `setGreeting` / `greetingChanged`: a shared value and its change feed
//! - `time(intervalSecs)`: the current time, repeatedly
//! - `countdown(from)`: a finite stream ending at zero

use std::time::Duration;

use async_graphql::{Context, Data, Object, Result, Schema, Subscription};
use futures::Stream;
use graphql_sse_api::context::RequestInfo;
use tokio::sync::watch;
use tracing::debug;

use crate::config::DemoConfig;

pub type DemoSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Current greeting, shared by all requests
pub struct Greeter {
    tx: watch::Sender<String>,
}

impl Greeter {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            tx: watch::Sender::new(initial.into()),
        }
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn set(&self, greeting: String) {
        self.tx.send_replace(greeting);
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

struct CountdownStep(Duration);

/// `User-Agent` of the request, when the client sent one
pub struct UserAgent(pub String);

/// Per-request context: exposes the client's user agent to resolvers
pub fn request_context(info: &RequestInfo) -> Data {
    let mut data = Data::default();
    if let Some(agent) = info.headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        data.insert(UserAgent(agent.to_string()));
    }
    data
}

pub struct QueryRoot;

#[Object(name = "Query")]
impl QueryRoot {
    /// The current greeting
    async fn greeting(&self, ctx: &Context<'_>) -> Result<String> {
        Ok(ctx.data::<Greeter>()?.current())
    }

    /// Server time in RFC 3339
    async fn now(&self) -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// User agent of the calling client
    async fn user_agent(&self, ctx: &Context<'_>) -> Option<String> {
        ctx.data_opt::<UserAgent>().map(|agent| agent.0.clone())
    }
}

pub struct MutationRoot;

#[Object(name = "Mutation")]
impl MutationRoot {
    /// Replace the greeting; returns the new value
    async fn set_greeting(&self, ctx: &Context<'_>, greeting: String) -> Result<String> {
        if greeting.trim().is_empty() {
            return Err("greeting must not be empty".into());
        }
        debug!(%greeting, "greeting changed");
        ctx.data::<Greeter>()?.set(greeting.clone());
        Ok(greeting)
    }
}

pub struct SubscriptionRoot;

#[Subscription(name = "Subscription")]
impl SubscriptionRoot {
    /// Server time in RFC 3339, every `intervalSecs` seconds
    async fn time(
        &self,
        #[graphql(default = 1, validator(minimum = 1))] interval_secs: i32,
    ) -> impl Stream<Item = String> {
        let period = Duration::from_secs(u64::from(interval_secs.unsigned_abs()));
        async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                yield chrono::Utc::now().to_rfc3339();
            }
        }
    }

    /// Counts down from `from` to zero, then completes
    async fn countdown(&self, ctx: &Context<'_>, from: u32) -> Result<impl Stream<Item = u32>> {
        let step = ctx.data::<CountdownStep>()?.0;
        Ok(async_stream::stream! {
            for value in (0..=from).rev() {
                yield value;
                if value > 0 {
                    tokio::time::sleep(step).await;
                }
            }
        })
    }

    /// Every greeting set after the subscription started
    async fn greeting_changed(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = String>> {
        let mut rx = ctx.data::<Greeter>()?.subscribe();
        Ok(async_stream::stream! {
            while rx.changed().await.is_ok() {
                let greeting = rx.borrow_and_update().clone();
                yield greeting;
            }
        })
    }
}

pub fn build_schema(config: &DemoConfig) -> DemoSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(Greeter::new(config.initial_greeting.clone()))
        .data(CountdownStep(Duration::from_millis(config.countdown_step_millis)))
        .finish()
}

/// Schema definition in SDL
pub fn export_schema_sdl() -> String {
    build_schema(&DemoConfig::default()).sdl()
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn schema() -> DemoSchema {
        build_schema(&DemoConfig {
            initial_greeting: "Hi".to_string(),
            countdown_step_millis: 1,
        })
    }

    #[test_log::test(tokio::test)]
    async fn test_greeting_query_and_mutation() {
        let schema = schema();

        let response = schema.execute("{ greeting }").await;
        assert_eq!(response.data.into_json().unwrap(), serde_json::json!({"greeting": "Hi"}));

        let response = schema.execute(r#"mutation { setGreeting(greeting: "Hey") }"#).await;
        assert!(response.errors.is_empty());

        let response = schema.execute("{ greeting }").await;
        assert_eq!(response.data.into_json().unwrap(), serde_json::json!({"greeting": "Hey"}));
    }

    #[test_log::test(tokio::test)]
    async fn test_empty_greeting_is_rejected() {
        let response = schema().execute(r#"mutation { setGreeting(greeting: " ") }"#).await;
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message, "greeting must not be empty");
    }

    #[test_log::test(tokio::test)]
    async fn test_countdown_ends_at_zero() {
        let values: Vec<_> = schema()
            .execute_stream("subscription { countdown(from: 3) }")
            .map(|response| response.data.into_json().unwrap()["countdown"].clone())
            .collect()
            .await;

        assert_eq!(values, vec![3, 2, 1, 0]);
    }

    #[test_log::test(tokio::test)]
    async fn test_time_rejects_non_positive_interval() {
        let responses: Vec<_> = schema()
            .execute_stream("subscription { time(intervalSecs: 0) }")
            .collect()
            .await;

        assert_eq!(responses.len(), 1);
        assert!(!responses[0].errors.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_time_yields_timestamps() {
        let mut stream = schema().execute_stream("subscription { time }");
        let response = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();

        let value = response.data.into_json().unwrap()["time"].as_str().unwrap().to_string();
        assert!(chrono::DateTime::parse_from_rfc3339(&value).is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn test_greeting_changed_streams_new_values() {
        let schema = schema();
        let mut stream = schema.execute_stream("subscription { greetingChanged }");

        let mutator = schema.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            mutator.execute(r#"mutation { setGreeting(greeting: "Moin") }"#).await;
        });

        let response = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            response.data.into_json().unwrap(),
            serde_json::json!({"greetingChanged": "Moin"})
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_request_context_reads_user_agent() {
        let (parts, _) = axum::http::Request::post("/graphql")
            .header("user-agent", "curl/8.0")
            .body(())
            .unwrap()
            .into_parts();

        let mut request = async_graphql::Request::new("{ userAgent }");
        request.data = request_context(&RequestInfo::from_parts(&parts));
        let response = schema().execute(request).await;

        assert_eq!(
            response.data.into_json().unwrap(),
            serde_json::json!({"userAgent": "curl/8.0"})
        );
    }

    #[test]
    fn test_exported_sdl_contains_operations() {
        let sdl = export_schema_sdl();
        assert!(sdl.contains("type Subscription"));
        assert!(sdl.contains("countdown(from: Int!): Int!"));
        assert!(sdl.contains("setGreeting(greeting: String!): String!"));
    }
}
