//! Process-wide configuration seed for a sandbox connection.
//!
//! Each field resolves by precedence explicit argument -> environment
//! variable -> compiled default, evaluated lazily at `build()` time rather
//! than at process start -- no statics read the environment at load time.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;
use crate::error::SandboxError;

const DEFAULT_DOMAIN: &str = "api.sbxcloud.dev/v1";
const DEFAULT_DEBUG_HOST: &str = "localhost:8888";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Immutable, per-handle configuration. Once passed into a `SandboxHandle`
/// it is treated as frozen for that handle's lifetime.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub domain: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub debug: bool,
    pub debug_host: String,
    /// `None` means "no timeout" (the caller passed `0` or the default
    /// resolved to no timeout); `Some(d)` is the positive duration.
    pub request_timeout: Option<Duration>,
    pub headers: HashMap<String, String>,
    pub proxy: Option<String>,
}

/// Builder for [`ConnectionConfig`], the idiomatic Rust replacement for
/// optional-argument overloads.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    domain: Option<String>,
    api_key: Option<String>,
    access_token: Option<String>,
    debug: Option<bool>,
    debug_host: Option<String>,
    /// Seconds; `Some(0)` means "disable timeout", `None` means "use default".
    request_timeout_secs: Option<u64>,
    headers: HashMap<String, String>,
    proxy: Option<String>,
}

impl ConnectionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn debug_host(mut self, debug_host: impl Into<String>) -> Self {
        self.debug_host = Some(debug_host.into());
        self
    }

    /// `0` disables the timeout entirely.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Resolves every field against the environment and compiled defaults,
    /// producing a frozen `ConnectionConfig`. Fails with `InvalidArgument`
    /// only in the (currently unreachable, but reserved) case a required
    /// domain cannot be resolved at all -- `DEFAULT_DOMAIN` always supplies
    /// one, so this is infallible in practice; kept `Result` so a future
    /// caller-supplied domain can be rejected without changing the
    /// signature.
    pub fn build(self) -> Result<ConnectionConfig> {
        let domain = self
            .domain
            .or_else(|| std::env::var("SBX_DOMAIN").ok())
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
        if domain.trim().is_empty() {
            return Err(SandboxError::InvalidArgument(
                "domain resolved to an empty string".to_string(),
            ));
        }

        let debug = self.debug.unwrap_or_else(|| {
            std::env::var("SBX_DEBUG")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        });

        let api_key = self.api_key.or_else(|| std::env::var("SBX_API_KEY").ok());
        let access_token = self
            .access_token
            .or_else(|| std::env::var("SBX_ACCESS_TOKEN").ok());
        let debug_host = self
            .debug_host
            .or_else(|| std::env::var("SBX_DEBUG_HOST").ok())
            .unwrap_or_else(|| DEFAULT_DEBUG_HOST.to_string());

        let request_timeout = resolve_timeout(self.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);

        Ok(ConnectionConfig {
            domain,
            api_key,
            access_token,
            debug,
            debug_host,
            request_timeout,
            headers: self.headers,
            proxy: self.proxy,
        })
    }
}

/// `0` means "no timeout"; `None` (not supplied) falls back to `default_secs`.
fn resolve_timeout(secs: Option<u64>, default_secs: u64) -> Option<Duration> {
    match secs {
        Some(0) => None,
        Some(s) => Some(Duration::from_secs(s)),
        None => Some(Duration::from_secs(default_secs)),
    }
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// `"https://" + domain`. A `domain` that already carries an explicit
    /// scheme (e.g. a `http://127.0.0.1:port` test server) is passed through
    /// unchanged rather than double-prefixed, mirroring the way the wider
    /// workspace's `ModelProviderInfo::base_url` accepts a caller-supplied
    /// scheme for pointing at a local mock.
    pub fn api_url(&self) -> String {
        if self.domain.contains("://") {
            self.domain.clone()
        } else {
            format!("https://{}", self.domain)
        }
    }

    /// Implements the same zero-means-none rule as the builder, but for a
    /// per-call override against an already-resolved config. `Some(0)`
    /// disables the timeout for this call; `None` reuses the config's
    /// resolved timeout.
    pub fn get_request_timeout(&self, override_secs: Option<u64>) -> Option<Duration> {
        match override_secs {
            Some(0) => None,
            Some(s) => Some(Duration::from_secs(s)),
            None => self.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]
    use super::*;

    #[test]
    fn zero_timeout_means_none() {
        let cfg = ConnectionConfig::builder()
            .domain("example.com")
            .request_timeout_secs(0)
            .build()
            .expect("build");
        assert_eq!(cfg.request_timeout, None);
    }

    #[test]
    fn positive_timeout_is_seconds() {
        let cfg = ConnectionConfig::builder()
            .domain("example.com")
            .request_timeout_secs(45)
            .build()
            .expect("build");
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn default_timeout_when_unspecified() {
        let cfg = ConnectionConfig::builder()
            .domain("example.com")
            .build()
            .expect("build");
        assert_eq!(
            cfg.request_timeout,
            Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        );
    }

    #[test]
    fn api_url_is_https_domain() {
        let cfg = ConnectionConfig::builder()
            .domain("sbx.example.com")
            .build()
            .expect("build");
        assert_eq!(cfg.api_url(), "https://sbx.example.com");
    }

    #[test]
    fn per_call_override_takes_precedence() {
        let cfg = ConnectionConfig::builder()
            .domain("example.com")
            .request_timeout_secs(45)
            .build()
            .expect("build");
        assert_eq!(cfg.get_request_timeout(Some(0)), None);
        assert_eq!(
            cfg.get_request_timeout(Some(10)),
            Some(Duration::from_secs(10))
        );
        assert_eq!(cfg.get_request_timeout(None), Some(Duration::from_secs(45)));
    }
}
