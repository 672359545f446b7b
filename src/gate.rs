//! The inbound request gate.
//!
//! Every request to the GraphQL endpoint passes through here before its
//! context is built:
//!
//! ```text
//! CORS (preflight answered here)
//!   ↓
//! request id assigned
//!   ↓
//! IdentityProvider::authenticate  →  ClaimsLookup stored in extensions
//!   ↓
//! GateMode::Required and Absent?  →  401, enrichment never runs
//!   ↓
//! handler
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

use crate::claims::{Absence, ClaimsLookup};
use crate::graphql::error_response;
use crate::identity::IdentityProvider;

/// Header carrying the client's GraphQL protocol version.
pub const CLIENT_GQL_VERSION_HEADER: &str = "x-copilotkit-runtime-client-gql-version";
/// Header carrying the request id, inbound and outbound.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Whether anonymous requests may reach the GraphQL endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    /// Requests without verified claims are rejected with 401
    Required,
    /// Every request proceeds; enrichment falls back to baseline properties
    #[default]
    Optional,
}

impl GateMode {
    /// Maps a `REQUIRE_AUTH` flag to a mode.
    pub fn from_flag(required: bool) -> Self {
        if required {
            GateMode::Required
        } else {
            GateMode::Optional
        }
    }
}

/// Identifier tying together every log line of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Generates a random request id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// Accepts a client-supplied id if it is short and made of safe characters.
    pub fn from_header_value(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_REQUEST_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        valid.then(|| Self(raw.into()))
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cross-origin policy for the GraphQL endpoint.
///
/// Mirrors the request origin with credentials allowed, since browser
/// clients send session cookies.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(CLIENT_GQL_VERSION_HEADER),
            HeaderName::from_static("sec-ch-ua"),
            HeaderName::from_static("sec-ch-ua-mobile"),
            HeaderName::from_static("sec-ch-ua-platform"),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

/// State for [`identity_gate`].
#[derive(Clone)]
pub struct Gate {
    provider: Arc<dyn IdentityProvider>,
    mode: GateMode,
}

impl Gate {
    /// Creates a gate running `provider` in `mode`.
    pub fn new(provider: Arc<dyn IdentityProvider>, mode: GateMode) -> Self {
        Self { provider, mode }
    }

    /// Returns the gate mode.
    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Runs the identity provider once.
    ///
    /// A provider that panics is reported as
    /// `Absent(Absence::Unavailable)` instead of tearing down the request.
    pub fn authenticate(&self, parts: &Parts) -> ClaimsLookup {
        panic::catch_unwind(AssertUnwindSafe(|| self.provider.authenticate(parts))).unwrap_or_else(
            |_| {
                ClaimsLookup::Absent(Absence::Unavailable(format!(
                    "{} provider panicked",
                    self.provider.name()
                )))
            },
        )
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("provider", &self.provider.name())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Authenticates a request and attaches the result for context building.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn identity_gate(State(gate): State<Gate>, request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::from_header_value)
        .unwrap_or_else(RequestId::generate);

    let (mut parts, body) = request.into_parts();
    let lookup = gate.authenticate(&parts);

    let mut response = match lookup {
        ClaimsLookup::Absent(absence) if gate.mode == GateMode::Required => {
            tracing::warn!(
                request_id = %request_id.as_str(),
                provider = gate.provider.name(),
                "rejecting unauthenticated request: {}",
                absence
            );
            error_response(StatusCode::UNAUTHORIZED, "Unauthenticated")
        }
        lookup => {
            parts.extensions.insert(lookup);
            parts.extensions.insert(request_id.clone());
            next.run(Request::from_parts(parts, body)).await
        }
    };

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
