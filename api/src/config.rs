//! Configuration for the GraphQL SSE API server

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

/// API server configuration
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the server to
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Prefix under which all GraphQL endpoints are mounted (e.g. "/api")
    #[serde(default)]
    pub path_prefix: String,

    /// Seconds of subscription inactivity after which a ping event is sent
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_ping_interval")]
    pub ping_interval: Duration,

    /// Serve GraphiQL at `<prefix>/graphiql`
    #[serde(default)]
    pub graphiql_enabled: bool,

    /// Serve the SSE test client at `<prefix>/sse-client`
    #[serde(default)]
    pub test_client_enabled: bool,

    /// CORS allowed origins (comma-separated list, or "*" for permissive)
    /// If not specified, defaults to localhost origins only
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            path_prefix: String::new(),
            ping_interval: default_ping_interval(),
            graphiql_enabled: false,
            test_client_enabled: false,
            cors_allowed_origins: default_cors_allowed_origins(),
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 9009))
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_cors_allowed_origins() -> Vec<String> {
    std::env::var("CORS_ALLOWED_ORIGINS")
        .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|_| {
            vec![
                "http://localhost:9009".to_string(),
                "http://127.0.0.1:9009".to_string(),
            ]
        })
}
