//! Per-request context handed to resolvers

use async_graphql::Data;
use axum::http::{HeaderMap, Method, Uri, Version, header, request::Parts};

/// Description of the HTTP request that carried a GraphQL operation
///
/// An instance is always inserted into the request data, so resolvers can read it with
/// `ctx.data::<RequestInfo>()`.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
        }
    }

    /// Host the client addressed, from `:authority` on HTTP/2 and the `Host` header otherwise
    pub fn host(&self) -> Option<&str> {
        let authority = self.uri.authority().map(|a| a.as_str());
        let host_header = self.headers.get(header::HOST).and_then(|v| v.to_str().ok());

        if self.version == Version::HTTP_2 {
            authority.or(host_header)
        } else {
            host_header.or(authority)
        }
    }

    /// Scheme the client used, honouring `X-Forwarded-Proto` from a fronting proxy
    pub fn scheme(&self) -> &str {
        self.headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| self.uri.scheme_str())
            .unwrap_or("http")
    }
}

/// Builds the application data available to resolvers for one request
///
/// Closures of the shape `Fn(&RequestInfo) -> Data` implement this trait.
pub trait ContextBuilder: Send + Sync + 'static {
    fn build(&self, info: &RequestInfo) -> Data;
}

impl<F> ContextBuilder for F
where
    F: Fn(&RequestInfo) -> Data + Send + Sync + 'static,
{
    fn build(&self, info: &RequestInfo) -> Data {
        self(info)
    }
}

/// Context builder that contributes nothing beyond the [`RequestInfo`]
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContext;

impl ContextBuilder for EmptyContext {
    fn build(&self, _info: &RequestInfo) -> Data {
        Data::default()
    }
}
