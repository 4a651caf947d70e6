//! Extraction of GraphQL operations from HTTP requests
//!
//! Operations arrive in one of these shapes:
//! - `GET` with `query`, `operationName` and `variables` in the query string
//! - `POST` with a JSON body (`application/json`, `text/plain` or no content type)
//! - `POST` with a raw query document (`application/graphql`)
//! - `POST` with a form body (`application/x-www-form-urlencoded` or `multipart/form-data`)
//!
//! The subscription endpoint additionally accepts the whole operation as JSON in a single
//! `graphql` query-string parameter, which is how the generated `Location` encodes it.

use async_graphql::{
    Request, Variables,
    parser::{
        parse_query,
        types::{DocumentOperations, OperationType},
    },
};
use axum::body::Bytes;
use multer::Multipart;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::MalformedRequest;

/// Name of the query-string parameter carrying an encoded operation
pub const SUBSCRIPTION_PARAM: &str = "graphql";

/// A GraphQL operation as sent by the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
}

/// Wire shape before validation; `variables` may still be a string holding JSON
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: Option<Value>,
}

impl TryFrom<RawOperation> for Operation {
    type Error = MalformedRequest;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let query = raw
            .query
            .filter(|q| !q.trim().is_empty())
            .ok_or(MalformedRequest::MissingQuery)?;

        Ok(Self {
            query,
            operation_name: raw.operation_name.filter(|name| !name.is_empty()),
            variables: decode_variables(raw.variables)?,
        })
    }
}

fn decode_variables(value: Option<Value>) -> Result<Map<String, Value>, MalformedRequest> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(text)) => decode_variables_text(&text),
        Some(other) => Err(MalformedRequest::InvalidVariables(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn decode_variables_text(text: &str) -> Result<Map<String, Value>, MalformedRequest> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(MalformedRequest::InvalidVariables(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(MalformedRequest::InvalidVariables(e.to_string())),
    }
}

fn content_type_essence(content_type: Option<&str>) -> String {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Whether a body of this content type must be read with [`Operation::from_multipart`]
pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type_essence(content_type) == "multipart/form-data"
}

/// Collect urlencoded pairs into the raw wire shape
fn raw_from_pairs(input: &[u8]) -> RawOperation {
    let mut raw = RawOperation::default();
    for (key, value) in url::form_urlencoded::parse(input) {
        match key.as_ref() {
            "query" => raw.query = Some(value.into_owned()),
            "operationName" => raw.operation_name = Some(value.into_owned()),
            "variables" => raw.variables = Some(Value::String(value.into_owned())),
            _ => {}
        }
    }
    raw
}

impl Operation {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Map::new(),
        }
    }

    /// Read an operation from the query string of a `GET` request
    pub fn from_query_string(query_string: Option<&str>) -> Result<Self, MalformedRequest> {
        raw_from_pairs(query_string.unwrap_or_default().as_bytes()).try_into()
    }

    /// Read an operation from the body of a `POST` request
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self, MalformedRequest> {
        let essence = content_type_essence(content_type);

        match essence.as_str() {
            "" | "application/json" | "text/plain" => {
                let raw: RawOperation =
                    serde_json::from_slice(body).map_err(|e| MalformedRequest::InvalidBody(e.to_string()))?;
                raw.try_into()
            }
            "application/graphql" => {
                let query = std::str::from_utf8(body).map_err(|e| MalformedRequest::InvalidBody(e.to_string()))?;
                RawOperation {
                    query: Some(query.to_string()),
                    ..Default::default()
                }
                .try_into()
            }
            "application/x-www-form-urlencoded" => raw_from_pairs(body).try_into(),
            _ => Err(MalformedRequest::UnsupportedContentType(essence)),
        }
    }

    /// Read an operation from a `multipart/form-data` body
    ///
    /// The fields `query`, `operationName` and `variables` are read as text; others are skipped.
    pub async fn from_multipart(content_type: &str, body: Bytes) -> Result<Self, MalformedRequest> {
        let invalid = |e: multer::Error| MalformedRequest::InvalidBody(e.to_string());

        let boundary = multer::parse_boundary(content_type).map_err(invalid)?;
        let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
        let mut multipart = Multipart::new(stream, boundary);

        let mut raw = RawOperation::default();
        while let Some(field) = multipart.next_field().await.map_err(invalid)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "query" => raw.query = Some(field.text().await.map_err(invalid)?),
                "operationName" => raw.operation_name = Some(field.text().await.map_err(invalid)?),
                "variables" => raw.variables = Some(Value::String(field.text().await.map_err(invalid)?)),
                _ => {}
            }
        }
        raw.try_into()
    }

    /// Read an operation encoded in the `graphql` query-string parameter of a subscription location
    pub fn from_location_query(query_string: Option<&str>) -> Result<Self, MalformedRequest> {
        let encoded = url::form_urlencoded::parse(query_string.unwrap_or_default().as_bytes())
            .find(|(key, _)| key == SUBSCRIPTION_PARAM)
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| {
                MalformedRequest::InvalidSubscription(format!("missing '{SUBSCRIPTION_PARAM}' parameter"))
            })?;

        let raw: RawOperation =
            serde_json::from_str(&encoded).map_err(|e| MalformedRequest::InvalidSubscription(e.to_string()))?;
        raw.try_into()
    }

    /// Encode this operation as the value of the `graphql` query-string parameter
    pub fn to_location_query(&self) -> String {
        // Serializing a struct of strings and JSON values cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair(SUBSCRIPTION_PARAM, &json)
            .finish()
    }

    /// Whether the operation that will be executed is a subscription
    ///
    /// The operation is selected by `operationName`, or is the only operation in the document.
    /// A document that does not parse is not a subscription; the engine reports the syntax error.
    pub fn is_subscription(&self) -> bool {
        let Ok(document) = parse_query(&self.query) else {
            return false;
        };

        let selected = match &document.operations {
            // An anonymous operation cannot be selected by name
            DocumentOperations::Single(operation) => self.operation_name.is_none().then_some(operation),
            DocumentOperations::Multiple(operations) => match &self.operation_name {
                Some(name) => operations
                    .iter()
                    .find(|(candidate, _)| candidate.as_str() == name.as_str())
                    .map(|(_, operation)| operation),
                None if operations.len() == 1 => operations.values().next(),
                None => None,
            },
        };

        selected.is_some_and(|operation| operation.node.ty == OperationType::Subscription)
    }

    /// Convert into an engine request without any request data
    pub fn into_request(self) -> Request {
        let mut request = Request::new(self.query).variables(Variables::from_json(Value::Object(self.variables)));
        if let Some(name) = self.operation_name {
            request = request.operation_name(name);
        }
        request
    }
}
