//! Configuration types for safety-api.

use std::time::Duration;

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/safewomen/api";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for connecting to the safety backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL the PHP endpoints live under (e.g., "https://host/safewomen/api").
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Bearer token sent with every request, if any.
    pub auth_token: Option<String>,
}

impl BackendConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            auth_token: None,
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GUARDIAN_BACKEND_URL` | `http://127.0.0.1:8000/safewomen/api` |
    /// | `GUARDIAN_AUTH_TOKEN` | none |
    /// | `GUARDIAN_BACKEND_TIMEOUT_SECS` | `15` |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("GUARDIAN_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let auth_token = std::env::var("GUARDIAN_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        let timeout = std::env::var("GUARDIAN_BACKEND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self {
            base_url,
            timeout,
            auth_token,
        }
    }

    /// URL of a backend endpoint script.
    pub fn endpoint(&self, script: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), script)
    }

    /// URL probed by the health check.
    pub fn health_url(&self) -> String {
        self.endpoint("get_contacts.php")
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = BackendConfig::new("http://localhost/safewomen/api/");
        assert_eq!(
            config.endpoint("create_alert.php"),
            "http://localhost/safewomen/api/create_alert.php"
        );
    }

    #[test]
    fn test_defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.auth_token.is_none());
    }
}
