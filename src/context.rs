use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::Method;

use crate::config::RuntimeConfig;
use crate::enrich::enrich;
use crate::gate::{RequestId, CLIENT_GQL_VERSION_HEADER};
use crate::logging::ContextLog;
use crate::properties::RequestProperties;

/// What the HTTP transport knows about a GraphQL request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContext {
    /// Request id assigned by the inbound gate
    pub request_id: String,
    /// HTTP method
    pub method: Method,
    /// Request path
    pub path: String,
    /// Client protocol version header, if sent
    pub client_gql_version: Option<String>,
}

impl InitialContext {
    /// Reads the initial context from request parts.
    ///
    /// Uses the request id the gate attached; requests that bypassed the gate
    /// get a fresh one.
    pub fn from_parts(parts: &Parts) -> Self {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| RequestId::generate().as_str().to_string());
        let client_gql_version = parts
            .headers
            .get(CLIENT_GQL_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            request_id,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            client_gql_version,
        }
    }
}

/// Execution context for one GraphQL request.
///
/// Built once per request by [`build_context`] and handed to remote dispatch,
/// which consumes it. Nothing in it is mutable: the properties are either a
/// fresh merged copy or the shared baseline itself.
#[derive(Debug, Clone)]
pub struct RequestContext {
    initial: InitialContext,
    runtime: Arc<RuntimeConfig>,
    properties: Arc<RequestProperties>,
    log: ContextLog,
}

impl RequestContext {
    /// Returns the transport-supplied fields.
    pub fn initial(&self) -> &InitialContext {
        &self.initial
    }

    /// Returns the request id.
    pub fn request_id(&self) -> &str {
        &self.initial.request_id
    }

    /// Returns the process-wide runtime configuration.
    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Returns the enriched request properties.
    pub fn properties(&self) -> &Arc<RequestProperties> {
        &self.properties
    }

    /// Returns the request-scoped logger.
    pub fn log(&self) -> &ContextLog {
        &self.log
    }
}

/// Builds the execution context for a request.
///
/// Runs [`enrich`] against the identity lookup the gate attached to `parts`.
/// Never fails.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use axum::http::Request;
/// use copilot_gateway::{build_context, AuthClaims, ClaimsLookup, RequestProperties, RuntimeConfig};
///
/// let runtime = Arc::new(RuntimeConfig::default());
/// let baseline = Arc::new(RequestProperties::new());
///
/// let mut request = Request::post("/copilotkit").body(()).unwrap();
/// request.extensions_mut().insert(ClaimsLookup::Present(AuthClaims::new(
///     Some("u1".to_string()),
///     Some("s1".to_string()),
///     None,
/// )));
/// let (parts, _) = request.into_parts();
///
/// let ctx = build_context(&parts, &runtime, &baseline);
/// assert_eq!(ctx.properties().get_str("userId"), Some("u1"));
/// assert_eq!(ctx.initial().path, "/copilotkit");
/// ```
pub fn build_context(
    parts: &Parts,
    runtime: &Arc<RuntimeConfig>,
    baseline: &Arc<RequestProperties>,
) -> RequestContext {
    let initial = InitialContext::from_parts(parts);
    let log = ContextLog::new(initial.request_id.as_str(), runtime.claims_logging);
    let properties = enrich(parts, baseline, &log);
    RequestContext {
        initial,
        runtime: Arc::clone(runtime),
        properties,
        log,
    }
}
