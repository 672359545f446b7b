//! Request-scoped properties forwarded to remote dispatch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::claims::AuthClaims;

/// Property key carrying the authenticated user identifier.
pub const USER_ID_KEY: &str = "userId";
/// Property key carrying the session identifier.
pub const SESSION_ID_KEY: &str = "sessionId";
/// Property key carrying the organization identifier.
pub const ORGANIZATION_KEY: &str = "organization";

/// Mapping from property name to JSON value.
///
/// A baseline `RequestProperties` is built once at startup, wrapped in an
/// `Arc`, and shared read-only by every request. Enrichment never modifies it:
/// [`merge_claims`](Self::merge_claims) returns a fresh copy.
///
/// # Examples
///
/// ```
/// use copilot_gateway::{AuthClaims, RequestProperties};
///
/// let baseline = RequestProperties::from_json_str(r#"{"tenant":"acme"}"#).unwrap();
/// let claims = AuthClaims::new(Some("u1".to_string()), None, None);
///
/// let merged = baseline.merge_claims(&claims);
/// assert_eq!(merged.get_str("tenant"), Some("acme"));
/// assert_eq!(merged.get_str("userId"), Some("u1"));
/// assert_eq!(merged.get_str("sessionId"), Some(""));
/// assert_eq!(baseline.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestProperties(BTreeMap<String, Value>);

impl RequestProperties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses properties from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not valid JSON or is not an object.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Inserts a property, replacing any previous value.
    ///
    /// Intended for building a baseline before it is shared.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value for `key` when it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no properties.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns a copy with the identity keys set from `claims`.
    ///
    /// `userId`, `sessionId` and `organization` always end up present as
    /// strings: a missing claim becomes `""`. Every other key is copied
    /// unchanged, and identity keys already in `self` are overridden.
    pub fn merge_claims(&self, claims: &AuthClaims) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in [
            (USER_ID_KEY, &claims.user_id),
            (SESSION_ID_KEY, &claims.session_id),
            (ORGANIZATION_KEY, &claims.org_id),
        ] {
            merged.insert(
                key.to_string(),
                Value::String(value.clone().unwrap_or_default()),
            );
        }
        Self(merged)
    }

    /// Converts the properties to a JSON object.
    pub fn to_json_object(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl From<BTreeMap<String, Value>> for RequestProperties {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RequestProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
