//! Process configuration read from the environment.
//!
//! Configuration is read once at startup into [`ServerConfig`]. The parts
//! every request needs are split off into an immutable [`RuntimeConfig`]
//! shared behind an `Arc`; nothing here is reassigned after startup.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::gate::GateMode;
use crate::logging::ClaimsLogging;
use crate::properties::RequestProperties;
use crate::sensitive::Sensitive;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;
/// Placeholder remote endpoint used when `REMOTE_URL` is unset.
pub const DEFAULT_REMOTE_URL: &str = "https://your-remote-endpoint.com";
/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "error";
/// Default GraphQL endpoint path.
pub const DEFAULT_ENDPOINT_PATH: &str = "/copilotkit";
/// Default timeout for one remote dispatch.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Which identity provider verifies inbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthProviderKind {
    /// No provider; every request is anonymous
    #[default]
    None,
    /// Session tokens verified as JWTs
    Jwt,
    /// Identity headers set by an authenticating proxy
    Header,
}

impl FromStr for AuthProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(AuthProviderKind::None),
            "jwt" => Ok(AuthProviderKind::Jwt),
            "header" => Ok(AuthProviderKind::Header),
            other => Err(format!("expected one of none, jwt, header; got '{}'", other)),
        }
    }
}

/// Key material for verifying session tokens.
#[derive(Debug)]
pub enum JwtKey {
    /// HS256 shared secret
    Secret(Sensitive<String>),
    /// RS256 public key in PEM form
    RsaPublicPem(String),
}

/// Session token verification settings.
#[derive(Debug)]
pub struct JwtSettings {
    /// Verification key
    pub key: JwtKey,
    /// Required `iss` claim, if any
    pub issuer: Option<String>,
    /// Required `aud` claim, if any
    pub audience: Option<String>,
}

/// Everything the gateway reads from the environment.
#[derive(Debug)]
pub struct ServerConfig {
    /// `PORT`
    pub port: u16,
    /// `REMOTE_URL`
    pub remote_url: Url,
    /// `LOG_LEVEL`
    pub log_level: String,
    /// `ENDPOINT_PATH`
    pub endpoint_path: String,
    /// `BASELINE_PROPERTIES`
    pub baseline: RequestProperties,
    /// `AUTH_PROVIDER`
    pub auth_provider: AuthProviderKind,
    /// `REQUIRE_AUTH`
    pub gate_mode: GateMode,
    /// `AUTH_JWT_*`; present only when `auth_provider` is `Jwt`
    pub jwt: Option<JwtSettings>,
    /// `LOG_CLAIMS`
    pub claims_logging: ClaimsLogging,
    /// `REMOTE_TIMEOUT_SECS`
    pub remote_timeout: Duration,
}

impl ServerConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first variable with an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration from the process environment, falling back to a
    /// `.env` file in the working directory or one of its parents.
    ///
    /// Variables set in the process environment win over the file. A missing
    /// file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` keyed on `.env` if the file exists but cannot be
    /// read or parsed, or naming the first variable with an unusable value.
    pub fn from_env_and_dotenv() -> Result<Self, ConfigError> {
        match dotenvy::dotenv_iter() {
            Ok(file) => Self::from_env_over(file),
            Err(e) if e.not_found() => Self::from_env(),
            Err(e) => Err(dotenv_error(e)),
        }
    }

    /// Like [`from_env_and_dotenv`](Self::from_env_and_dotenv), with the
    /// dotenv file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` keyed on `.env` if `path` cannot be read or
    /// parsed, or naming the first variable with an unusable value.
    pub fn from_env_and_dotenv_path(path: &Path) -> Result<Self, ConfigError> {
        let file = dotenvy::from_path_iter(path).map_err(dotenv_error)?;
        Self::from_env_over(file)
    }

    fn from_env_over<R: Read>(file: dotenvy::Iter<R>) -> Result<Self, ConfigError> {
        let file: HashMap<String, String> = file
            .collect::<Result<_, _>>()
            .map_err(dotenv_error)?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Reads configuration through `lookup`.
    ///
    /// Unset and blank variables take their defaults; set but invalid
    /// variables are errors.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first variable with an unusable value.
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_gateway::ServerConfig;
    ///
    /// let config = ServerConfig::from_lookup(|key| match key {
    ///     "PORT" => Some("8080".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.port, 8080);
    /// assert_eq!(config.endpoint_path, "/copilotkit");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::new("PORT", format!("'{}': {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let remote_raw = get("REMOTE_URL").unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string());
        let remote_url = Url::parse(remote_raw.trim())
            .map_err(|e| ConfigError::new("REMOTE_URL", format!("'{}': {}", remote_raw, e)))?;
        if !matches!(remote_url.scheme(), "http" | "https") {
            return Err(ConfigError::new(
                "REMOTE_URL",
                format!("unsupported scheme '{}'", remote_url.scheme()),
            ));
        }

        let log_level = get("LOG_LEVEL")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let endpoint_path = get("ENDPOINT_PATH")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ENDPOINT_PATH.to_string());
        if !endpoint_path.starts_with('/') || endpoint_path == "/healthz" {
            return Err(ConfigError::new(
                "ENDPOINT_PATH",
                format!("'{}' must start with '/' and not be /healthz", endpoint_path),
            ));
        }

        let baseline = match get("BASELINE_PROPERTIES") {
            Some(raw) => RequestProperties::from_json_str(&raw).map_err(|e| {
                ConfigError::new("BASELINE_PROPERTIES", format!("expected a JSON object: {}", e))
            })?,
            None => RequestProperties::new(),
        };

        let auth_provider = match get("AUTH_PROVIDER") {
            Some(raw) => raw
                .parse::<AuthProviderKind>()
                .map_err(|e| ConfigError::new("AUTH_PROVIDER", e))?,
            None => AuthProviderKind::None,
        };

        let gate_mode = match get("REQUIRE_AUTH") {
            Some(raw) => GateMode::from_flag(parse_flag(&raw).ok_or_else(|| {
                ConfigError::new("REQUIRE_AUTH", format!("expected a boolean, got '{}'", raw))
            })?),
            None => GateMode::Optional,
        };

        if gate_mode == GateMode::Required && auth_provider == AuthProviderKind::None {
            return Err(ConfigError::new(
                "REQUIRE_AUTH",
                "REQUIRE_AUTH=true needs AUTH_PROVIDER=jwt or AUTH_PROVIDER=header",
            ));
        }

        let jwt = match auth_provider {
            AuthProviderKind::Jwt => Some(jwt_settings(&get)?),
            AuthProviderKind::None | AuthProviderKind::Header => None,
        };

        let claims_logging = match get("LOG_CLAIMS") {
            Some(raw) => raw
                .parse::<ClaimsLogging>()
                .map_err(|e| ConfigError::new("LOG_CLAIMS", e))?,
            None => ClaimsLogging::default(),
        };

        let remote_timeout = match get("REMOTE_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::new(
                        "REMOTE_TIMEOUT_SECS",
                        format!("expected a positive integer, got '{}'", raw),
                    ))
                }
            },
            None => DEFAULT_REMOTE_TIMEOUT,
        };

        Ok(Self {
            port,
            remote_url,
            log_level,
            endpoint_path,
            baseline,
            auth_provider,
            gate_mode,
            jwt,
            claims_logging,
            remote_timeout,
        })
    }

    /// Returns the per-request view of this configuration.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            endpoint_path: self.endpoint_path.clone(),
            remote_urls: vec![self.remote_url.clone()],
            gate_mode: self.gate_mode,
            claims_logging: self.claims_logging,
        }
    }
}

/// Read-only configuration visible to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Path of the GraphQL endpoint
    pub endpoint_path: String,
    /// Remote agent endpoints, in dispatch order
    pub remote_urls: Vec<Url>,
    /// Whether the inbound gate rejects anonymous requests
    pub gate_mode: GateMode,
    /// How identity values are logged
    pub claims_logging: ClaimsLogging,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            remote_urls: Vec::new(),
            gate_mode: GateMode::Optional,
            claims_logging: ClaimsLogging::default(),
        }
    }
}

fn jwt_settings<G>(get: &G) -> Result<JwtSettings, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let key = match (get("AUTH_JWT_SECRET"), get("AUTH_JWT_PUBLIC_KEY")) {
        (Some(secret), None) => JwtKey::Secret(Sensitive::new(secret)),
        // PEM blocks often arrive with escaped newlines from .env files.
        (None, Some(pem)) => JwtKey::RsaPublicPem(pem.replace("\\n", "\n")),
        (Some(_), Some(_)) => {
            return Err(ConfigError::new(
                "AUTH_JWT_SECRET",
                "set either AUTH_JWT_SECRET or AUTH_JWT_PUBLIC_KEY, not both",
            ))
        }
        (None, None) => {
            return Err(ConfigError::new(
                "AUTH_JWT_SECRET",
                "AUTH_PROVIDER=jwt requires AUTH_JWT_SECRET or AUTH_JWT_PUBLIC_KEY",
            ))
        }
    };
    Ok(JwtSettings {
        key,
        issuer: get("AUTH_JWT_ISSUER").map(|v| v.trim().to_string()),
        audience: get("AUTH_JWT_AUDIENCE").map(|v| v.trim().to_string()),
    })
}

fn dotenv_error(e: dotenvy::Error) -> ConfigError {
    ConfigError::new(".env", e.to_string())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
