//! GraphQL gateway that enriches requests with verified identity before
//! forwarding them to a remote agent runtime.
//!
//! Each request to the GraphQL endpoint goes through:
//! - **Gate**: CORS, request id, and identity verification ([`identity`])
//! - **Enrichment**: verified claims are merged into the baseline
//!   [`RequestProperties`] as `userId`, `sessionId` and `organization`
//! - **Dispatch**: the request is forwarded to the remote endpoint with the
//!   properties under `extensions.properties`
//!
//! Requests without verified claims still proceed (unless the gate is in
//! `Required` mode) and carry the baseline properties unchanged.
//!
//! # Core Types
//!
//! - [`AuthClaims`] / [`ClaimsLookup`]: the identity a request carries, or why it has none
//! - [`RequestProperties`]: string-keyed values forwarded with every request
//! - [`enrich`]: the merge step
//! - [`RequestContext`]: per-request execution context built by [`build_context`]
//! - [`Sensitive<T>`]: wrapper that redacts identity values in logs
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use copilot_gateway::{enrich, AuthClaims, ClaimsLogging, ClaimsLookup, ContextLog, RequestProperties};
//!
//! let baseline = Arc::new(RequestProperties::new());
//! let log = ContextLog::new("req-123", ClaimsLogging::Redacted);
//!
//! let lookup = ClaimsLookup::Present(AuthClaims::new(
//!     Some("user_1".to_string()),
//!     Some("sess_1".to_string()),
//!     None,
//! ));
//!
//! let properties = enrich(&lookup, &baseline, &log);
//! assert_eq!(properties.get_str("userId"), Some("user_1"));
//! assert_eq!(properties.get_str("organization"), Some(""));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod claims;
mod config;
mod context;
mod enrich;
mod error;
mod gate;
mod graphql;
pub mod identity;
mod logging;
mod properties;
mod runtime;
mod sensitive;
mod server;

pub use claims::{Absence, AuthClaims, ClaimsLookup, ExtractClaims};
pub use config::{
    AuthProviderKind, JwtKey, JwtSettings, RuntimeConfig, ServerConfig, DEFAULT_ENDPOINT_PATH,
    DEFAULT_LOG_LEVEL, DEFAULT_PORT, DEFAULT_REMOTE_TIMEOUT, DEFAULT_REMOTE_URL,
};
pub use context::{build_context, InitialContext, RequestContext};
pub use enrich::enrich;
pub use error::{ConfigError, DispatchError, Error, GraphqlRequestError};
pub use gate::{
    cors_layer, identity_gate, Gate, GateMode, RequestId, CLIENT_GQL_VERSION_HEADER,
    REQUEST_ID_HEADER,
};
pub use graphql::{
    error_response, graphql_handler, GraphqlQueryParams, GraphqlRequest, MAX_BODY_BYTES,
    PROPERTIES_EXTENSION,
};
pub use logging::{init_tracing, ClaimsLogging, ContextLog};
pub use properties::{RequestProperties, ORGANIZATION_KEY, SESSION_ID_KEY, USER_ID_KEY};
pub use runtime::{
    log_before_request, BeforeRequest, BeforeRequestHook, RemoteEndpoint, RemoteReply,
    RemoteRuntime,
};
pub use sensitive::Sensitive;
pub use server::{build_router, router, serve, AppState};
