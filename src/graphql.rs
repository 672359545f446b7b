//! GraphQL-over-HTTP boundary.
//!
//! Parses GraphQL requests from `POST` bodies and `GET` query strings,
//! builds the request context, and hands both to remote dispatch. Protocol
//! errors are answered with GraphQL-style error bodies:
//!
//! ```json
//! { "errors": [ { "message": "..." } ] }
//! ```

use axum::body::to_bytes;
use axum::extract::{Query, Request, State};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::build_context;
use crate::error::GraphqlRequestError;
use crate::properties::RequestProperties;
use crate::server::AppState;

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Extension key under which merged properties are sent to the remote.
pub const PROPERTIES_EXTENSION: &str = "properties";

/// A GraphQL request as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /// Query document
    pub query: String,
    /// Operation to run when the document has several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    /// Protocol extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphqlRequest {
    /// Creates a request with only a query document.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
            extensions: None,
        }
    }

    /// Sets the variables.
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Parses a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns `GraphqlRequestError` if the body is not a GraphQL request.
    pub fn from_json_body(body: &[u8]) -> Result<Self, GraphqlRequestError> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| GraphqlRequestError::InvalidBody(e.to_string()))?;
        request.validated()
    }

    /// Returns the conversation thread id, if the variables carry one.
    ///
    /// Looks at `variables.data.threadId`, then `variables.threadId`.
    pub fn thread_id(&self) -> Option<&str> {
        let variables = self.variables.as_ref()?;
        variables
            .pointer("/data/threadId")
            .or_else(|| variables.get("threadId"))
            .and_then(Value::as_str)
    }

    /// Attaches `properties` under `extensions.properties`.
    ///
    /// Any other extensions the client sent are kept; a client-sent
    /// `properties` extension is replaced.
    pub fn with_properties(mut self, properties: &RequestProperties) -> Self {
        let mut extensions = self.extensions.take().unwrap_or_default();
        extensions.insert(
            PROPERTIES_EXTENSION.to_string(),
            Value::Object(properties.to_json_object()),
        );
        self.extensions = Some(extensions);
        self
    }

    fn validated(self) -> Result<Self, GraphqlRequestError> {
        if self.query.trim().is_empty() {
            return Err(GraphqlRequestError::MissingQuery);
        }
        Ok(self)
    }
}

/// Query-string form of a GraphQL request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlQueryParams {
    query: Option<String>,
    operation_name: Option<String>,
    variables: Option<String>,
    extensions: Option<String>,
}

impl TryFrom<GraphqlQueryParams> for GraphqlRequest {
    type Error = GraphqlRequestError;

    fn try_from(params: GraphqlQueryParams) -> Result<Self, Self::Error> {
        let variables = params
            .variables
            .map(|raw| {
                serde_json::from_str::<Value>(&raw)
                    .map_err(|e| GraphqlRequestError::InvalidVariables(e.to_string()))
            })
            .transpose()?;
        let extensions = params
            .extensions
            .map(|raw| {
                serde_json::from_str::<Map<String, Value>>(&raw)
                    .map_err(|e| GraphqlRequestError::InvalidExtensions(e.to_string()))
            })
            .transpose()?;
        GraphqlRequest {
            query: params.query.unwrap_or_default(),
            operation_name: params.operation_name,
            variables,
            extensions,
        }
        .validated()
    }
}

/// Builds a GraphQL-style error response.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "errors": [ { "message": message } ] }))).into_response()
}

/// Handles `GET` and `POST` on the GraphQL endpoint.
pub async fn graphql_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let parsed = if parts.method == Method::GET {
        match Query::<GraphqlQueryParams>::try_from_uri(&parts.uri) {
            Ok(Query(params)) => GraphqlRequest::try_from(params),
            Err(rejection) => Err(GraphqlRequestError::InvalidQueryString(rejection.body_text())),
        }
    } else {
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => GraphqlRequest::from_json_body(&bytes),
            Err(e) => Err(GraphqlRequestError::UnreadableBody(e.to_string())),
        }
    };

    match parsed {
        Ok(graphql) => execute(&state, &parts, graphql).await,
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn execute(state: &AppState, parts: &Parts, request: GraphqlRequest) -> Response {
    let ctx = build_context(parts, &state.runtime, &state.baseline);
    match state.remote.dispatch(ctx, request).await {
        Ok(reply) => (reply.status, Json(reply.body)).into_response(),
        Err(err) => error_response(err.status(), err.client_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_post_body() {
        let body = br#"{"query":"query Q { hello }","operationName":"Q","variables":{"a":1}}"#;
        let request = GraphqlRequest::from_json_body(body).unwrap();

        assert_eq!(request.query, "query Q { hello }");
        assert_eq!(request.operation_name.as_deref(), Some("Q"));
        assert_eq!(request.variables, Some(json!({ "a": 1 })));
        assert!(request.extensions.is_none());
    }

    #[test]
    fn null_variables_are_none() {
        let request = GraphqlRequest::from_json_body(br#"{"query":"{ a }","variables":null}"#).unwrap();
        assert!(request.variables.is_none());
    }

    #[test]
    fn rejects_bad_bodies() {
        assert!(matches!(
            GraphqlRequest::from_json_body(b"not json"),
            Err(GraphqlRequestError::InvalidBody(_))
        ));
        assert!(matches!(
            GraphqlRequest::from_json_body(br#"{"variables":{}}"#),
            Err(GraphqlRequestError::InvalidBody(_))
        ));
        assert_eq!(
            GraphqlRequest::from_json_body(br#"{"query":"  "}"#).unwrap_err(),
            GraphqlRequestError::MissingQuery
        );
    }

    #[test]
    fn thread_id_from_mutation_data() {
        let request = GraphqlRequest::new("mutation { generate }")
            .with_variables(json!({ "data": { "threadId": "thread-7" } }));
        assert_eq!(request.thread_id(), Some("thread-7"));
    }

    #[test]
    fn thread_id_from_top_level_variable() {
        let request = GraphqlRequest::new("query").with_variables(json!({ "threadId": "t-1" }));
        assert_eq!(request.thread_id(), Some("t-1"));
    }

    #[test]
    fn thread_id_absent_or_not_string() {
        assert_eq!(GraphqlRequest::new("query").thread_id(), None);
        let request = GraphqlRequest::new("query").with_variables(json!({ "threadId": 9 }));
        assert_eq!(request.thread_id(), None);
    }

    #[test]
    fn properties_are_attached_as_extension() {
        let mut request = GraphqlRequest::new("query");
        let mut client_ext = Map::new();
        client_ext.insert("persistedQuery".to_string(), json!({ "version": 1 }));
        client_ext.insert("properties".to_string(), json!({ "userId": "spoofed" }));
        request.extensions = Some(client_ext);
        let properties: RequestProperties = [("userId", "u1")].into_iter().collect();

        let outbound = request.with_properties(&properties);
        let extensions = outbound.extensions.unwrap();

        assert_eq!(extensions["properties"], json!({ "userId": "u1" }));
        assert_eq!(extensions["persistedQuery"], json!({ "version": 1 }));
    }

    #[test]
    fn query_params_convert() {
        let params = GraphqlQueryParams {
            query: Some("{ hello }".to_string()),
            operation_name: None,
            variables: Some(r#"{"threadId":"t"}"#.to_string()),
            extensions: None,
        };
        let request = GraphqlRequest::try_from(params).unwrap();
        assert_eq!(request.thread_id(), Some("t"));
    }

    #[test]
    fn query_params_reject_bad_json_and_missing_query() {
        let params = GraphqlQueryParams {
            query: Some("{ hello }".to_string()),
            variables: Some("{".to_string()),
            ..GraphqlQueryParams::default()
        };
        assert!(matches!(
            GraphqlRequest::try_from(params),
            Err(GraphqlRequestError::InvalidVariables(_))
        ));

        let params = GraphqlQueryParams {
            query: Some("{ hello }".to_string()),
            extensions: Some("[1]".to_string()),
            ..GraphqlQueryParams::default()
        };
        assert!(matches!(
            GraphqlRequest::try_from(params),
            Err(GraphqlRequestError::InvalidExtensions(_))
        ));

        assert_eq!(
            GraphqlRequest::try_from(GraphqlQueryParams::default()).unwrap_err(),
            GraphqlRequestError::MissingQuery
        );
    }

    #[test]
    fn serializes_in_camel_case_without_empty_fields() {
        let mut request = GraphqlRequest::new("{ a }");
        request.operation_name = Some("A".to_string());
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "query": "{ a }", "operationName": "A" })
        );
    }
}
