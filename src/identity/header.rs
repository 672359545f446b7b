use axum::http::request::Parts;
use axum::http::HeaderName;

use crate::claims::{Absence, AuthClaims, ClaimsLookup};

use super::IdentityProvider;

/// Trusts identity headers set by an upstream authenticating proxy.
///
/// Only deploy this behind a proxy that strips these headers from client
/// traffic and sets them after verifying the session itself.
#[derive(Debug, Clone)]
pub struct HeaderIdentityProvider {
    user_header: HeaderName,
    session_header: HeaderName,
    org_header: HeaderName,
}

impl HeaderIdentityProvider {
    /// Default header carrying the user id.
    pub const USER_HEADER: &'static str = "x-auth-user-id";
    /// Default header carrying the session id.
    pub const SESSION_HEADER: &'static str = "x-auth-session-id";
    /// Default header carrying the organization id.
    pub const ORG_HEADER: &'static str = "x-auth-org-id";

    /// Reads identity from custom header names.
    pub fn new(user_header: HeaderName, session_header: HeaderName, org_header: HeaderName) -> Self {
        Self {
            user_header,
            session_header,
            org_header,
        }
    }

    fn read(&self, parts: &Parts, name: &HeaderName) -> Result<Option<String>, Absence> {
        match parts.headers.get(name) {
            None => Ok(None),
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| Absence::Invalid(format!("{} is not valid UTF-8", name)))?
                    .trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
        }
    }
}

impl Default for HeaderIdentityProvider {
    fn default() -> Self {
        Self::new(
            HeaderName::from_static(Self::USER_HEADER),
            HeaderName::from_static(Self::SESSION_HEADER),
            HeaderName::from_static(Self::ORG_HEADER),
        )
    }
}

impl IdentityProvider for HeaderIdentityProvider {
    fn authenticate(&self, parts: &Parts) -> ClaimsLookup {
        let read_all = || -> Result<AuthClaims, Absence> {
            Ok(AuthClaims::new(
                self.read(parts, &self.user_header)?,
                self.read(parts, &self.session_header)?,
                self.read(parts, &self.org_header)?,
            ))
        };
        match read_all() {
            Ok(claims) if claims.is_empty() => ClaimsLookup::Absent(Absence::NoSession),
            Ok(claims) => ClaimsLookup::Present(claims),
            Err(absence) => ClaimsLookup::Absent(absence),
        }
    }

    fn name(&self) -> &'static str {
        "header"
    }
}
