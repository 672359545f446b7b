//! Identity verification for inbound requests.
//!
//! This module provides:
//! - `IdentityProvider`: the synchronous lookup the inbound gate runs once per request
//! - `JwtIdentityProvider`: verifies session tokens (Bearer header or `__session` cookie)
//! - `HeaderIdentityProvider`: trusts identity headers set by an authenticating proxy
//! - `AnonymousIdentityProvider`: treats every request as having no session
//!
//! Providers never fail: an unverifiable request yields
//! `ClaimsLookup::Absent` with the reason.

mod header;
mod jwt;

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;

use crate::claims::{Absence, ClaimsLookup};
use crate::config::{AuthProviderKind, JwtKey, ServerConfig};
use crate::error::Error;

pub use header::HeaderIdentityProvider;
pub use jwt::JwtIdentityProvider;

/// Cookie the session token is read from when no Bearer header is present.
pub const SESSION_COOKIE: &str = "__session";

/// Verifies the identity of an inbound request.
///
/// Implementations run in-process and must not block on network I/O.
pub trait IdentityProvider: Send + Sync {
    /// Looks up verified claims for the request.
    fn authenticate(&self, parts: &Parts) -> ClaimsLookup;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Provider used when no identity verification is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentityProvider;

impl IdentityProvider for AnonymousIdentityProvider {
    fn authenticate(&self, _parts: &Parts) -> ClaimsLookup {
        ClaimsLookup::Absent(Absence::NoSession)
    }

    fn name(&self) -> &'static str {
        "anonymous"
    }
}

/// Builds the provider selected by `AUTH_PROVIDER`.
///
/// # Errors
///
/// Returns `Error::Identity` if JWT key material cannot be loaded.
pub fn from_config(config: &ServerConfig) -> Result<Arc<dyn IdentityProvider>, Error> {
    match config.auth_provider {
        AuthProviderKind::None => Ok(Arc::new(AnonymousIdentityProvider)),
        AuthProviderKind::Header => Ok(Arc::new(HeaderIdentityProvider::default())),
        AuthProviderKind::Jwt => {
            let settings = config.jwt.as_ref().ok_or_else(|| {
                Error::Identity("AUTH_PROVIDER=jwt without key settings".to_string())
            })?;
            let mut provider = match &settings.key {
                JwtKey::Secret(secret) => JwtIdentityProvider::hs256(secret.expose().as_bytes()),
                JwtKey::RsaPublicPem(pem) => JwtIdentityProvider::rs256_pem(pem.as_bytes())
                    .map_err(|e| Error::Identity(format!("invalid AUTH_JWT_PUBLIC_KEY: {}", e)))?,
            };
            if let Some(issuer) = &settings.issuer {
                provider = provider.with_issuer(issuer);
            }
            if let Some(audience) = &settings.audience {
                provider = provider.with_audience(audience);
            }
            Ok(Arc::new(provider))
        }
    }
}

/// Finds the session token on a request.
///
/// A `Bearer` Authorization header wins over the session cookie.
pub(crate) fn session_token(parts: &Parts) -> Option<&str> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let value = value.to_str().ok()?.trim();
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
            return Some(token);
        }
        return None;
    }
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}
