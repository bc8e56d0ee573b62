use std::time::Duration;

use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Session client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(super) base_url: Url,
    pub(super) timeout: Duration,
    pub(super) auth_path: String,
}

impl ClientConfig {
    /// Config for the API at `base_url`, with a 30 second request timeout.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            auth_path: "/auth".into(),
        }
    }

    /// Timeout applied to every request, refresh included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Prefix of the issuer routes (default `/auth`).
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = path.into();
        self
    }

    pub(super) fn refresh_path(&self) -> String {
        format!("{}/refresh", self.auth_path)
    }

    pub(super) fn login_path(&self) -> String {
        format!("{}/google", self.auth_path)
    }

    pub(super) fn logout_path(&self) -> String {
        format!("{}/logout", self.auth_path)
    }

    pub(super) fn me_path(&self) -> String {
        format!("{}/me", self.auth_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://localhost:3000".parse().unwrap());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_path(), "/auth/refresh");
        assert_eq!(config.login_path(), "/auth/google");
        assert_eq!(config.me_path(), "/auth/me");
    }

    #[test]
    fn custom_auth_path() {
        let config = ClientConfig::new("http://localhost:3000".parse().unwrap())
            .with_auth_path("/api/auth")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.logout_path(), "/api/auth/logout");
        assert_eq!(config.me_path(), "/api/auth/me");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
