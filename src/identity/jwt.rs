use axum::http::request::Parts;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::claims::{Absence, AuthClaims, ClaimsLookup};

use super::{session_token, IdentityProvider};

/// Claims read from a session token.
///
/// `sub` is the user, `sid` the session and `org_id` the active
/// organization. All are optional; `exp` is enforced by `Validation`.
#[derive(Debug, Deserialize)]
struct SessionTokenClaims {
    sub: Option<String>,
    sid: Option<String>,
    org_id: Option<String>,
}

impl From<SessionTokenClaims> for AuthClaims {
    fn from(token: SessionTokenClaims) -> Self {
        AuthClaims::new(token.sub, token.sid, token.org_id)
    }
}

/// Verifies session tokens signed with HS256 or RS256.
///
/// # Examples
///
/// ```
/// use axum::http::Request;
/// use copilot_gateway::identity::{IdentityProvider, JwtIdentityProvider};
///
/// let provider = JwtIdentityProvider::hs256(b"shared-secret");
/// let (parts, _) = Request::builder()
///     .header("authorization", "Bearer not-a-jwt")
///     .body(())
///     .unwrap()
///     .into_parts();
///
/// // Malformed tokens are reported, never raised.
/// assert!(!provider.authenticate(&parts).is_present());
/// ```
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    /// Creates a provider verifying HS256 tokens with a shared secret.
    pub fn hs256(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// Creates a provider verifying RS256 tokens with a PEM public key.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error if the PEM cannot be parsed.
    pub fn rs256_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self::with_key(
            DecodingKey::from_rsa_pem(pem)?,
            Algorithm::RS256,
        ))
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        // Session tokens carry no audience unless one is configured.
        validation.validate_aud = false;
        Self { key, validation }
    }

    /// Requires the `iss` claim to equal `issuer`.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Requires the `aud` claim to contain `audience`.
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    /// Verifies a raw token.
    pub fn verify(&self, token: &str) -> ClaimsLookup {
        match decode::<SessionTokenClaims>(token, &self.key, &self.validation) {
            Ok(data) => ClaimsLookup::Present(data.claims.into()),
            Err(err) => ClaimsLookup::Absent(Absence::Invalid(describe(err.kind()))),
        }
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn authenticate(&self, parts: &Parts) -> ClaimsLookup {
        match session_token(parts) {
            Some(token) => self.verify(token),
            None => ClaimsLookup::Absent(Absence::NoSession),
        }
    }

    fn name(&self) -> &'static str {
        "jwt"
    }
}

// Token contents are never echoed; only the failure class is reported.
fn describe(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::ExpiredSignature => "token expired",
        ErrorKind::ImmatureSignature => "token not yet valid",
        ErrorKind::InvalidSignature => "signature mismatch",
        ErrorKind::InvalidIssuer => "unexpected issuer",
        ErrorKind::InvalidAudience => "unexpected audience",
        ErrorKind::InvalidAlgorithm => "unexpected algorithm",
        ErrorKind::MissingRequiredClaim(_) => "missing required claim",
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            "malformed token"
        }
        _ => "token rejected",
    }
    .to_string()
}
