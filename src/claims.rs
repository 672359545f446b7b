//! Verified identity claims and the result of looking them up.
//!
//! Identity providers produce a [`ClaimsLookup`] for each inbound request.
//! The lookup is attached to the request extensions by the inbound gate and
//! read back through [`ExtractClaims`], which is the only accessor the
//! enrichment step uses.

use std::fmt;

use axum::http::request::Parts;
use axum::http::Request;

use crate::sensitive::Sensitive;

/// Identity fields verified for a request.
///
/// Every field is optional: a provider may verify a session that carries no
/// organization, or a token that names a user but no session. Readers must
/// treat absence as legal.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthClaims {
    /// Authenticated user identifier
    pub user_id: Option<String>,
    /// Session identifier
    pub session_id: Option<String>,
    /// Active organization identifier
    pub org_id: Option<String>,
}

impl AuthClaims {
    /// Creates claims from the three optional identifiers.
    pub fn new(
        user_id: Option<String>,
        session_id: Option<String>,
        org_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            session_id,
            org_id,
        }
    }

    /// Returns `true` when no identifier is present.
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.session_id.is_none() && self.org_id.is_none()
    }
}

impl fmt::Debug for AuthClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClaims")
            .field("user_id", &self.user_id.as_ref().map(Sensitive::new))
            .field("session_id", &self.session_id.as_ref().map(Sensitive::new))
            .field("org_id", &self.org_id.as_ref().map(Sensitive::new))
            .finish()
    }
}

/// Why no claims are available for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Absence {
    /// No credential was presented, or nothing was attached to the request
    NoSession,
    /// A credential was presented but failed verification
    Invalid(String),
    /// The identity provider could not be consulted, for example because it
    /// panicked inside the gate
    Unavailable(String),
}

impl fmt::Display for Absence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Absence::NoSession => write!(f, "no session"),
            Absence::Invalid(reason) => write!(f, "invalid credential: {}", reason),
            Absence::Unavailable(reason) => write!(f, "identity provider unavailable: {}", reason),
        }
    }
}

/// Outcome of an identity lookup.
///
/// Lookups never fail by panicking or returning `Err`; absence of identity
/// is an ordinary value that callers match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsLookup {
    /// Claims were verified
    Present(AuthClaims),
    /// No usable claims
    Absent(Absence),
}

impl ClaimsLookup {
    /// Returns the verified claims, if any.
    pub fn claims(&self) -> Option<&AuthClaims> {
        match self {
            ClaimsLookup::Present(claims) => Some(claims),
            ClaimsLookup::Absent(_) => None,
        }
    }

    /// Returns `true` when claims were verified.
    pub fn is_present(&self) -> bool {
        matches!(self, ClaimsLookup::Present(_))
    }
}

/// Reads the identity lookup attached to a request.
///
/// Implemented for the HTTP request types the gateway handles. The lookup is
/// read from the request extensions, where the inbound gate stores it; a
/// request that never passed through the gate yields
/// `ClaimsLookup::Absent(Absence::NoSession)`.
///
/// # Examples
///
/// ```
/// use axum::http::Request;
/// use copilot_gateway::{AuthClaims, ClaimsLookup, ExtractClaims};
///
/// let mut request = Request::new(());
/// assert!(!request.extract_claims().is_present());
///
/// request.extensions_mut().insert(ClaimsLookup::Present(AuthClaims::new(
///     Some("u1".to_string()),
///     None,
///     None,
/// )));
/// assert!(request.extract_claims().is_present());
/// ```
pub trait ExtractClaims {
    /// Returns the identity lookup for this request.
    fn extract_claims(&self) -> ClaimsLookup;
}

impl ExtractClaims for Parts {
    fn extract_claims(&self) -> ClaimsLookup {
        attached_lookup(&self.extensions)
    }
}

impl<B> ExtractClaims for Request<B> {
    fn extract_claims(&self) -> ClaimsLookup {
        attached_lookup(self.extensions())
    }
}

impl ExtractClaims for ClaimsLookup {
    fn extract_claims(&self) -> ClaimsLookup {
        self.clone()
    }
}

fn attached_lookup(extensions: &axum::http::Extensions) -> ClaimsLookup {
    extensions
        .get::<ClaimsLookup>()
        .cloned()
        .unwrap_or(ClaimsLookup::Absent(Absence::NoSession))
}
