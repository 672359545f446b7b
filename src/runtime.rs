//! Remote agent dispatch.
//!
//! The gateway does not execute GraphQL itself. Each request is forwarded to
//! a remote agent endpoint with the enriched properties attached under
//! `extensions.properties`, and the remote's status and JSON body are relayed
//! back to the client.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;
use url::Url;

use crate::config::{RuntimeConfig, ServerConfig, DEFAULT_REMOTE_TIMEOUT};
use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::gate::REQUEST_ID_HEADER;
use crate::graphql::GraphqlRequest;
use crate::logging::ContextLog;
use crate::properties::{RequestProperties, ORGANIZATION_KEY, SESSION_ID_KEY, USER_ID_KEY};

/// A remote agent endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    url: Url,
}

impl RemoteEndpoint {
    /// Creates an endpoint for `url`.
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// What the before-request hook sees.
#[derive(Debug)]
pub struct BeforeRequest<'a> {
    /// Request id
    pub request_id: &'a str,
    /// Enriched properties about to be sent
    pub properties: &'a RequestProperties,
    /// Conversation thread, if the request names one
    pub thread_id: Option<&'a str>,
    /// Request-scoped logger
    pub log: &'a ContextLog,
}

/// Callback run once per request before it is forwarded.
pub type BeforeRequestHook = Arc<dyn Fn(&BeforeRequest<'_>) + Send + Sync>;

/// A relayed remote response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReply {
    /// Status the remote answered with
    pub status: StatusCode,
    /// JSON body the remote answered with
    pub body: Value,
}

/// Forwards GraphQL requests to remote agent endpoints.
#[derive(Clone)]
pub struct RemoteRuntime {
    endpoints: Vec<RemoteEndpoint>,
    hook: Option<BeforeRequestHook>,
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteRuntime {
    /// Creates a runtime with no before-request hook and the default timeout.
    pub fn new(endpoints: Vec<RemoteEndpoint>) -> Self {
        Self {
            endpoints,
            hook: None,
            client: reqwest::Client::new(),
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Builds the runtime described by `config`, logging each request with
    /// [`log_before_request`].
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::from_runtime(&config.runtime_config())
            .with_timeout(config.remote_timeout)
            .with_before_request(log_before_request)
    }

    /// Creates a runtime targeting the remote URLs in `runtime`, in order.
    pub fn from_runtime(runtime: &RuntimeConfig) -> Self {
        Self::new(
            runtime
                .remote_urls
                .iter()
                .cloned()
                .map(RemoteEndpoint::new)
                .collect(),
        )
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the before-request hook, replacing any previous one.
    pub fn with_before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BeforeRequest<'_>) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Returns the configured endpoints.
    pub fn endpoints(&self) -> &[RemoteEndpoint] {
        &self.endpoints
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forwards `request` to the first endpoint.
    ///
    /// Runs the before-request hook, then makes a single attempt. Any status
    /// the remote returns is relayed as-is, provided the body is JSON.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` when there is no endpoint, the remote cannot
    /// be reached, does not answer within the timeout, or answers with a
    /// body that is not JSON.
    pub async fn dispatch(
        &self,
        ctx: RequestContext,
        request: GraphqlRequest,
    ) -> Result<RemoteReply, DispatchError> {
        let log = ctx.log();
        let properties = ctx.properties();

        if let Some(hook) = &self.hook {
            hook(&BeforeRequest {
                request_id: ctx.request_id(),
                properties,
                thread_id: request.thread_id(),
                log,
            });
        }

        let Some(endpoint) = self.endpoints.first() else {
            log.error(format_args!("no remote endpoint configured"));
            return Err(DispatchError::NoEndpoint);
        };
        let url = endpoint.url.to_string();
        let payload = request.with_properties(properties);

        let response = self
            .client
            .post(endpoint.url.clone())
            .timeout(self.timeout)
            .header(REQUEST_ID_HEADER, ctx.request_id())
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.classify(&url, e, false))
            .inspect_err(|e| log.error(format_args!("{}", e)))?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| self.classify(&url, e, true))
            .inspect_err(|e| log.error(format_args!("{}", e)))?;

        log.debug(format_args!("remote endpoint answered {}", status));
        Ok(RemoteReply { status, body })
    }

    fn classify(&self, url: &str, err: reqwest::Error, reading_body: bool) -> DispatchError {
        if err.is_timeout() {
            DispatchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }
        } else if reading_body && err.is_decode() {
            DispatchError::InvalidResponse {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            DispatchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl std::fmt::Debug for RemoteRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRuntime")
            .field("endpoints", &self.endpoints)
            .field("hook", &self.hook.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Default before-request hook: logs the outgoing identity and thread.
pub fn log_before_request(request: &BeforeRequest<'_>) {
    let thread = request.thread_id.unwrap_or("-");
    request.log.identifiers(
        &format!("forwarding request to remote endpoint (thread {})", thread),
        request.properties.get_str(USER_ID_KEY),
        request.properties.get_str(SESSION_ID_KEY),
        request.properties.get_str(ORGANIZATION_KEY),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::http::Request;
    use serde_json::json;

    use super::*;
    use crate::claims::{AuthClaims, ClaimsLookup};
    use crate::context::build_context;

    fn context(claims: Option<AuthClaims>) -> RequestContext {
        let mut request = Request::post("/copilotkit").body(()).unwrap();
        if let Some(claims) = claims {
            request
                .extensions_mut()
                .insert(ClaimsLookup::Present(claims));
        }
        let (parts, _) = request.into_parts();
        build_context(
            &parts,
            &Arc::new(RuntimeConfig::default()),
            &Arc::new(RequestProperties::new()),
        )
    }

    fn unreachable_url() -> Url {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap()
    }

    #[tokio::test]
    async fn no_endpoint_is_service_unavailable() {
        let runtime = RemoteRuntime::new(Vec::new());
        let err = runtime
            .dispatch(context(None), GraphqlRequest::new("{ a }"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoEndpoint));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn hook_sees_enriched_properties_and_thread() {
        let seen: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let runtime = RemoteRuntime::new(Vec::new()).with_before_request(move |req| {
            sink.lock().unwrap().push((
                req.properties.get_str(USER_ID_KEY).unwrap_or_default().to_string(),
                req.thread_id.map(str::to_string),
            ));
        });
        let request = GraphqlRequest::new("mutation { generate }")
            .with_variables(json!({ "data": { "threadId": "thread-1" } }));

        let _ = runtime
            .dispatch(
                context(Some(AuthClaims::new(Some("u1".to_string()), None, None))),
                request,
            )
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("u1".to_string(), Some("thread-1".to_string()))]
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_bad_gateway() {
        let runtime = RemoteRuntime::new(vec![RemoteEndpoint::new(unreachable_url())])
            .with_timeout(Duration::from_secs(5));
        let err = runtime
            .dispatch(context(None), GraphqlRequest::new("{ a }"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport { .. }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn from_config_uses_remote_url_and_timeout() {
        let config = ServerConfig::from_lookup(|key| match key {
            "REMOTE_URL" => Some("http://agent.internal:9000/graphql".to_string()),
            "REMOTE_TIMEOUT_SECS" => Some("7".to_string()),
            _ => None,
        })
        .unwrap();

        let runtime = RemoteRuntime::from_config(&config);

        assert_eq!(runtime.endpoints().len(), 1);
        assert_eq!(
            runtime.endpoints()[0].url().as_str(),
            "http://agent.internal:9000/graphql"
        );
        assert_eq!(
            runtime.endpoints()[0].url(),
            &config.runtime_config().remote_urls[0]
        );
        assert_eq!(runtime.timeout(), Duration::from_secs(7));
        assert!(format!("{:?}", runtime).contains("hook: true"));
    }

    #[test]
    fn endpoints_follow_runtime_remote_urls() {
        let runtime = RuntimeConfig {
            remote_urls: vec![
                Url::parse("http://primary:9000/").unwrap(),
                Url::parse("http://secondary:9000/").unwrap(),
            ],
            ..RuntimeConfig::default()
        };

        let remote = RemoteRuntime::from_runtime(&runtime);

        let urls: Vec<&str> = remote.endpoints().iter().map(|e| e.url().as_str()).collect();
        assert_eq!(urls, vec!["http://primary:9000/", "http://secondary:9000/"]);
        assert!(RemoteRuntime::from_runtime(&RuntimeConfig::default())
            .endpoints()
            .is_empty());
    }

    #[test]
    fn default_hook_runs_without_subscriber() {
        let log = ContextLog::new("req-1", crate::logging::ClaimsLogging::Full);
        let properties: RequestProperties = [(USER_ID_KEY, "u1")].into_iter().collect();
        log_before_request(&BeforeRequest {
            request_id: "req-1",
            properties: &properties,
            thread_id: None,
            log: &log,
        });
    }
}
