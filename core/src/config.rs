//! Client configuration.
//!
//! `ClientConfig` is an immutable value handed to `RestClient::new`. Every
//! field can be overridden on an individual call; `ClientConfig::DEFAULT`
//! documents the values used when nothing is set.

use std::path::PathBuf;
use std::time::Duration;

use crate::http::Headers;
use crate::request::Encoding;

/// Default cap on concurrently running transport tasks per client.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Default upper bound for a whole call, including waiting for connectivity.
pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the cache directory created under the system temp dir when no
/// cache directory is configured.
pub const DEFAULT_CACHE_DIR_NAME: &str = "restline-cache";

/// How a transport behaves while the network is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityPolicy {
    /// Keep trying to connect until `resource_timeout` instead of failing on
    /// the first connection error.
    pub wait_for_connectivity: bool,
    pub resource_timeout: Duration,
}

impl ConnectivityPolicy {
    pub const DEFAULT: Self = Self {
        wait_for_connectivity: true,
        resource_timeout: DEFAULT_RESOURCE_TIMEOUT,
    };
}

impl Default for ConnectivityPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Headers sent with every call. Call-level headers override these.
    pub headers: Headers,
    /// Body encoding for mutating verbs.
    pub encoding: Encoding,
    /// Per-request timeout; `None` leaves it to the transport.
    pub timeout: Option<Duration>,
    /// Worker pool size shared by every call of one client.
    pub max_concurrent: usize,
    pub connectivity: ConnectivityPolicy,
    /// Where finished downloads are moved. `None` means
    /// `<temp dir>/restline-cache`.
    pub cache_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub const DEFAULT: Self = Self {
        headers: Headers::new(),
        encoding: Encoding::UrlEncoded,
        timeout: None,
        max_concurrent: DEFAULT_MAX_CONCURRENT,
        connectivity: ConnectivityPolicy::DEFAULT,
        cache_dir: None,
    };

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_connectivity(mut self, connectivity: ConnectivityPolicy) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// The cache directory downloads are relocated into.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let config = ClientConfig::default();
        assert!(config.headers.is_empty());
        assert_eq!(config.encoding, Encoding::UrlEncoded);
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_concurrent, 3);
        assert!(config.connectivity.wait_for_connectivity);
        assert_eq!(config.connectivity.resource_timeout, Duration::from_secs(30));
    }

    #[test]
    fn builders_override_fields() {
        let config = ClientConfig::DEFAULT
            .with_header("Authorization", "Bearer t")
            .with_encoding(Encoding::Json)
            .with_timeout(Duration::from_secs(5))
            .with_max_concurrent(8)
            .with_cache_dir("/var/cache/app");
        assert_eq!(config.headers["Authorization"], "Bearer t");
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.resolved_cache_dir(), PathBuf::from("/var/cache/app"));
    }

    #[test]
    fn cache_dir_falls_back_to_temp_dir() {
        let dir = ClientConfig::DEFAULT.resolved_cache_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with(DEFAULT_CACHE_DIR_NAME));
    }
}
