//! Server configuration with environment-driven defaults.
//!
//! [`ServerConfig`] owns everything the tool layer injects into the cache
//! store and the upstream clients: API credentials, the base cache
//! directory, the freshness window, and retry/timeout knobs. Credentials are
//! optional at startup so `tools/list` works on a bare machine; collection
//! tools surface an auth error at call time instead.

use std::path::PathBuf;
use std::time::Duration;

/// data.go.kr RTMS base. Per-dataset service paths are appended.
pub const MOLIT_BASE_URL: &str = "https://apis.data.go.kr/1613000";

/// Bank of Korea ECOS base.
pub const ECOS_BASE_URL: &str = "https://ecos.bok.or.kr/api";

/// odcloud endpoint serving the full legal district code table.
pub const REGION_CODE_URL: &str =
    "https://api.odcloud.kr/api/15063424/v1/uddi:257e1510-0eeb-44de-8883-8295c94dadf7";

/// Configuration for the tool server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// data.go.kr service key (MOLIT transactions, district codes).
    /// Env: `PUBLIC_DATA_API_KEY`.
    pub public_data_api_key: Option<String>,
    /// ECOS key for Bank of Korea statistics. Env: `ECOS_API_KEY`.
    pub ecos_api_key: Option<String>,
    /// Base directory for cache artifacts.
    pub cache_dir: PathBuf,
    /// Maximum age at which a cached entry is served without a refresh
    /// attempt. Default: 24 hours.
    pub freshness: Duration,
    /// Per-request upstream timeout. Default: 30 seconds.
    pub timeout: Duration,
    /// Retry budget for transient upstream failures. Default: 3.
    pub max_retries: u32,
    /// Interval between retention sweeps. Default: 6 hours.
    pub sweep_interval: Duration,
    /// Entries older than this are deleted by the sweep. Default: 7 days.
    pub max_retention: Duration,
    /// Whether the background sweep runs at all.
    pub sweep_enabled: bool,
    /// MOLIT RTMS base URL (overridable for tests).
    pub molit_base_url: String,
    /// ECOS base URL (overridable for tests).
    pub ecos_base_url: String,
    /// District code table URL (overridable for tests).
    pub region_code_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_data_api_key: None,
            ecos_api_key: None,
            cache_dir: default_cache_dir(),
            freshness: Duration::from_secs(24 * 3600),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            sweep_interval: Duration::from_secs(6 * 3600),
            max_retention: Duration::from_secs(7 * 24 * 3600),
            sweep_enabled: true,
            molit_base_url: MOLIT_BASE_URL.to_string(),
            ecos_base_url: ECOS_BASE_URL.to_string(),
            region_code_url: REGION_CODE_URL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Build a config from the environment.
    ///
    /// Reads `PUBLIC_DATA_API_KEY`, `ECOS_API_KEY`, and `ONDOL_CACHE_DIR`.
    /// Missing keys are tolerated here and reported by the tools that need
    /// them.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.public_data_api_key = non_empty_env("PUBLIC_DATA_API_KEY");
        config.ecos_api_key = non_empty_env("ECOS_API_KEY");
        if let Some(dir) = non_empty_env("ONDOL_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        config
    }

    /// Override the cache directory (builder pattern).
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Build the shared HTTP client with the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, String> {
        reqwest::Client::builder()
            .user_agent(concat!("ondol/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))
    }
}

/// Resolve the default cache directory.
///
/// Priority: `ONDOL_CACHE_DIR` is handled by [`ServerConfig::from_env`];
/// here the chain is the OS user cache dir, then the system temp dir.
fn default_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(base) => base.join("ondol"),
        None => std::env::temp_dir().join("ondol-cache"),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
