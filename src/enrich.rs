//! The context enrichment step.
//!
//! Merges a request's verified identity into the baseline properties. The
//! step is a pure, synchronous function of its inputs: it never fails and
//! never mutates the baseline.
//!
//! ```text
//! ClaimsLookup::Present(claims) -> new Arc(baseline + userId/sessionId/organization)
//! ClaimsLookup::Absent(reason)  -> the baseline Arc itself, unchanged
//! ```

use std::sync::Arc;

use crate::claims::{ClaimsLookup, ExtractClaims};
use crate::logging::ContextLog;
use crate::properties::RequestProperties;

/// Builds the request properties for one request.
///
/// With verified claims, returns a new copy of `baseline` with `userId`,
/// `sessionId` and `organization` set, substituting `""` for any claim that
/// is missing. Without claims, logs a warning and returns `baseline` itself.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use copilot_gateway::{
///     enrich, Absence, AuthClaims, ClaimsLogging, ClaimsLookup, ContextLog, RequestProperties,
/// };
///
/// let baseline: Arc<RequestProperties> =
///     Arc::new([("tenant", "acme")].into_iter().collect());
/// let log = ContextLog::new("req-1", ClaimsLogging::Redacted);
///
/// let present = ClaimsLookup::Present(AuthClaims::new(Some("u1".to_string()), None, None));
/// let enriched = enrich(&present, &baseline, &log);
/// assert_eq!(enriched.get_str("userId"), Some("u1"));
/// assert_eq!(enriched.get_str("organization"), Some(""));
///
/// let absent = ClaimsLookup::Absent(Absence::NoSession);
/// let unchanged = enrich(&absent, &baseline, &log);
/// assert!(Arc::ptr_eq(&unchanged, &baseline));
/// ```
pub fn enrich<R>(
    request: &R,
    baseline: &Arc<RequestProperties>,
    log: &ContextLog,
) -> Arc<RequestProperties>
where
    R: ExtractClaims + ?Sized,
{
    match request.extract_claims() {
        ClaimsLookup::Present(claims) => {
            log.claims("auth context resolved", &claims);
            Arc::new(baseline.merge_claims(&claims))
        }
        ClaimsLookup::Absent(absence) => {
            log.warn(format_args!(
                "auth context unavailable ({}); using baseline properties",
                absence
            ));
            Arc::clone(baseline)
        }
    }
}
