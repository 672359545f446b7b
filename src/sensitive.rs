use std::fmt;

/// A wrapper that keeps identity values out of formatted output.
///
/// User, session and organization identifiers travel through the gateway on
/// every request. `Sensitive<T>` lets them be carried into log statements and
/// `Debug` output without their values being printed. The wrapped value can
/// only be read through [`expose`](Self::expose).
///
/// # Examples
///
/// ```
/// use copilot_gateway::Sensitive;
///
/// let user_id = Sensitive::new("user_2abc".to_string());
///
/// assert_eq!(format!("{:?}", user_id), "[REDACTED]");
/// assert_eq!(format!("{}", user_id), "[REDACTED]");
/// assert_eq!(user_id.expose(), "user_2abc");
/// ```
// Do NOT derive Clone, Copy or Default. Copies of an identifier should be made
// from the exposed value at the call site, where the intent is visible.
pub struct Sensitive<T> {
    // Must stay private: a public field would bypass redaction.
    inner: T,
}

impl<T> Sensitive<T> {
    /// Wraps a value that must not appear in logs.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Returns the wrapped value.
    ///
    /// Callers are responsible for not formatting the result into log output.
    pub fn expose(&self) -> &T {
        &self.inner
    }

    /// Consumes the wrapper and returns the value.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
