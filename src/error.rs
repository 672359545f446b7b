use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;

/// Errors that stop the gateway from starting or serving.
#[derive(Debug)]
pub enum Error {
    /// An environment variable had an unusable value
    Config(ConfigError),
    /// The identity provider could not be built from its configuration
    Identity(String),
    /// The log filter was invalid or logging was already initialised
    Logging(String),
    /// Binding or serving the listener failed
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "configuration error: {}", e),
            Error::Identity(msg) => write!(f, "identity provider error: {}", msg),
            Error::Logging(msg) => write!(f, "logging error: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Identity(_) | Error::Logging(_) => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// An invalid configuration value.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// The environment variable at fault
    pub key: &'static str,
    /// What was wrong with it
    pub message: String,
}

impl ConfigError {
    /// Creates a configuration error for `key`.
    pub fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// A GraphQL request the boundary could not accept.
///
/// Reported to the client as `400 Bad Request` with the `Display` text as
/// the error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphqlRequestError {
    /// The body could not be read or exceeded the size limit
    UnreadableBody(String),
    /// The body is not a JSON GraphQL request
    InvalidBody(String),
    /// The query string could not be decoded
    InvalidQueryString(String),
    /// `variables` is not valid JSON
    InvalidVariables(String),
    /// `extensions` is not a JSON object
    InvalidExtensions(String),
    /// `query` is missing or blank
    MissingQuery,
}

impl fmt::Display for GraphqlRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphqlRequestError::UnreadableBody(msg) => {
                write!(f, "Failed to read request body: {}", msg)
            }
            GraphqlRequestError::InvalidBody(msg) => {
                write!(f, "Invalid GraphQL request body: {}", msg)
            }
            GraphqlRequestError::InvalidQueryString(msg) => {
                write!(f, "Invalid query string: {}", msg)
            }
            GraphqlRequestError::InvalidVariables(msg) => {
                write!(f, "Variables are invalid JSON: {}", msg)
            }
            GraphqlRequestError::InvalidExtensions(msg) => {
                write!(f, "Extensions are invalid JSON: {}", msg)
            }
            GraphqlRequestError::MissingQuery => write!(f, "Must provide query string."),
        }
    }
}

impl std::error::Error for GraphqlRequestError {}

/// Failure to forward a request to the remote agent endpoint.
///
/// These are reported to the client as GraphQL error bodies; they never
/// affect context enrichment.
#[derive(Debug)]
pub enum DispatchError {
    /// No remote endpoint is configured
    NoEndpoint,
    /// The remote endpoint did not answer in time
    Timeout {
        /// Target URL
        url: String,
        /// Configured timeout
        after: Duration,
    },
    /// Connecting to or talking to the remote endpoint failed
    Transport {
        /// Target URL
        url: String,
        /// Underlying error text
        message: String,
    },
    /// The remote endpoint answered with something other than JSON
    InvalidResponse {
        /// Target URL
        url: String,
        /// Underlying error text
        message: String,
    },
}

impl DispatchError {
    /// HTTP status reported to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoEndpoint => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Transport { .. } | DispatchError::InvalidResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Message reported to the client. Omits URLs and transport details.
    pub fn client_message(&self) -> &'static str {
        match self {
            DispatchError::NoEndpoint => "No remote endpoint configured",
            DispatchError::Timeout { .. } => "Remote endpoint timed out",
            DispatchError::Transport { .. } => "Remote endpoint unavailable",
            DispatchError::InvalidResponse { .. } => "Remote endpoint returned an invalid response",
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoEndpoint => write!(f, "no remote endpoint configured"),
            DispatchError::Timeout { url, after } => {
                write!(f, "remote endpoint {} timed out after {:?}", url, after)
            }
            DispatchError::Transport { url, message } => {
                write!(f, "remote endpoint {} unreachable: {}", url, message)
            }
            DispatchError::InvalidResponse { url, message } => {
                write!(f, "remote endpoint {} returned an invalid response: {}", url, message)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_key() {
        let err = Error::from(ConfigError::new("PORT", "not a number"));
        assert_eq!(err.to_string(), "configuration error: PORT: not a number");
    }

    #[test]
    fn graphql_request_errors_read_as_client_messages() {
        assert_eq!(
            GraphqlRequestError::MissingQuery.to_string(),
            "Must provide query string."
        );
        assert_eq!(
            GraphqlRequestError::InvalidVariables("EOF".to_string()).to_string(),
            "Variables are invalid JSON: EOF"
        );
    }

    #[test]
    fn dispatch_errors_map_to_gateway_statuses() {
        assert_eq!(
            DispatchError::NoEndpoint.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let timeout = DispatchError::Timeout {
            url: "http://remote".to_string(),
            after: Duration::from_secs(1),
        };
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        let transport = DispatchError::Transport {
            url: "http://remote".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(transport.status(), StatusCode::BAD_GATEWAY);
        assert!(transport.to_string().contains("connection refused"));
    }
}
