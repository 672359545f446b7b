use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::claims::AuthClaims;
use crate::error::Error;
use crate::sensitive::Sensitive;

/// How identity values appear in diagnostic log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimsLogging {
    /// Claims are not logged at all
    Off,
    /// Claims are logged as `[REDACTED]` or `-` when absent
    #[default]
    Redacted,
    /// Claim values are logged verbatim
    Full,
}

impl ClaimsLogging {
    /// Renders one identifier for a log line.
    ///
    /// Returns `None` in `Off` mode, meaning the field is omitted.
    pub fn render(self, value: Option<&str>) -> Option<String> {
        match (self, value) {
            (ClaimsLogging::Off, _) => None,
            (_, None) => Some("-".to_string()),
            (ClaimsLogging::Redacted, Some(v)) => Some(Sensitive::new(v).to_string()),
            (ClaimsLogging::Full, Some(v)) => Some(v.to_string()),
        }
    }
}

impl FromStr for ClaimsLogging {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "false" => Ok(ClaimsLogging::Off),
            "redacted" => Ok(ClaimsLogging::Redacted),
            "full" => Ok(ClaimsLogging::Full),
            other => Err(format!(
                "expected one of off, redacted, full; got '{}'",
                other
            )),
        }
    }
}

/// Request-scoped logger.
///
/// Every event carries the request id. Identity values go through
/// [`claims`](Self::claims), which applies the configured [`ClaimsLogging`]
/// mode, so call sites never format identifiers themselves.
#[derive(Debug, Clone)]
pub struct ContextLog {
    request_id: Arc<str>,
    claims_mode: ClaimsLogging,
}

impl ContextLog {
    /// Creates a logger bound to one request.
    pub fn new(request_id: impl Into<Arc<str>>, claims_mode: ClaimsLogging) -> Self {
        Self {
            request_id: request_id.into(),
            claims_mode,
        }
    }

    /// Returns the request id attached to every event.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the claims logging mode.
    pub fn claims_mode(&self) -> ClaimsLogging {
        self.claims_mode
    }

    /// Logs an info-level message with request id.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(request_id = %self.request_id, "{}", args);
    }

    /// Logs a warning-level message with request id.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(request_id = %self.request_id, "{}", args);
    }

    /// Logs an error-level message with request id.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(request_id = %self.request_id, "{}", args);
    }

    /// Logs a debug-level message with request id.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(request_id = %self.request_id, "{}", args);
    }

    /// Logs identity values at debug level, honouring the claims mode.
    ///
    /// Does nothing in `Off` mode.
    pub fn identifiers(
        &self,
        message: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        organization: Option<&str>,
    ) {
        let mode = self.claims_mode;
        let (Some(user), Some(session), Some(org)) = (
            mode.render(user_id),
            mode.render(session_id),
            mode.render(organization),
        ) else {
            return;
        };
        tracing::debug!(
            request_id = %self.request_id,
            user_id = %user,
            session_id = %session,
            organization = %org,
            "{}",
            message
        );
    }

    /// Logs verified claims. See [`identifiers`](Self::identifiers).
    pub fn claims(&self, message: &str, claims: &AuthClaims) {
        self.identifiers(
            message,
            claims.user_id.as_deref(),
            claims.session_id.as_deref(),
            claims.org_id.as_deref(),
        );
    }
}

/// Installs the global `tracing` subscriber.
///
/// `level` accepts anything `EnvFilter` does: a bare level (`error`, `info`)
/// or per-target directives (`copilot_gateway=debug,tower_http=info`).
///
/// # Errors
///
/// Returns `Error::Logging` if the filter does not parse or a subscriber is
/// already installed.
pub fn init_tracing(level: &str) -> Result<(), Error> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| Error::Logging(format!("invalid LOG_LEVEL '{}': {}", level, e)))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}
