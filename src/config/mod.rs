use crate::error::{ProxyError, Result};
use crate::router::RouteMatcher;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Supported configuration schema version
pub const CONFIG_VERSION: u32 = 1;

/// Environment variable holding the upstream auth service base URL
pub const BASE_URL_ENV: &str = "NEON_AUTH_BASE_URL";

/// Prefix for layered environment overrides (`AUTH_PROXY__AUTH__PREFIX=...`)
pub const ENV_PREFIX: &str = "AUTH_PROXY";

/// Main proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream auth service configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Session guard configuration
    #[serde(default)]
    pub guard: GuardConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upstream auth service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth service, e.g. `https://auth.example.com/neondb/auth`
    #[serde(default)]
    pub base_url: String,
    /// Local path prefix the proxy is mounted under
    #[serde(default = "default_auth_prefix")]
    pub prefix: String,
    /// Append the inbound query string to the upstream URL
    #[serde(default = "default_true")]
    pub forward_query: bool,
    /// Upstream request timeout in seconds (client default when unset)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Maximum buffered request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Session guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Where requests without a session are redirected
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Route patterns that require a session (e.g. "/dashboard", "/account/*rest")
    #[serde(default)]
    pub matched_routes: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

/// Log output formats
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and expose the scrape endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Scrape endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_auth_prefix() -> String {
    "/api/auth".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_login_url() -> String {
    "/auth/sign-in".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            prefix: default_auth_prefix(),
            forward_query: true,
            timeout_secs: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            matched_routes: vec![],
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl ServerConfig {
    /// `host:port` the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ProxyConfig {
    /// Load configuration from a YAML file without environment layering
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ProxyError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from an optional YAML file, then `AUTH_PROXY__*`
    /// environment variables, then `NEON_AUTH_BASE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.base_url", std::env::var(BASE_URL_ENV).ok())
            .map_err(|e| ProxyError::Config(format!("Failed to apply {}: {}", BASE_URL_ENV, e)))?
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to load config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| ProxyError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(ProxyError::Config(format!(
                "Unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            )));
        }

        let base_url = self.auth.base_url.trim();
        if base_url.is_empty() {
            return Err(ProxyError::Config(format!(
                "auth.base_url is required (set it in the config file or via {})",
                BASE_URL_ENV
            )));
        }

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ProxyError::Config(format!(
                "auth.base_url must start with http:// or https://: {}",
                base_url
            )));
        }

        Url::parse(base_url)
            .map_err(|e| ProxyError::Config(format!("Invalid auth.base_url '{}': {}", base_url, e)))?;

        let prefix = &self.auth.prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ProxyError::Config(format!(
                "auth.prefix must start with '/' and must not end with '/': {}",
                prefix
            )));
        }

        if self.auth.max_body_bytes == 0 {
            return Err(ProxyError::Config(
                "auth.max_body_bytes must be > 0".to_string(),
            ));
        }

        if self.auth.timeout_secs == Some(0) {
            return Err(ProxyError::Config(
                "auth.timeout_secs must be > 0 when set".to_string(),
            ));
        }

        if self.guard.login_url.is_empty() {
            return Err(ProxyError::Config(
                "guard.login_url cannot be empty".to_string(),
            ));
        }

        let matcher = RouteMatcher::new(&self.guard.matched_routes)?;
        if let Some(login_path) = self.login_path() {
            if let Some(pattern) = matcher.matches(&login_path) {
                return Err(ProxyError::InvalidRoute(format!(
                    "guard.login_url '{}' is guarded by '{}' and would redirect to itself",
                    self.guard.login_url, pattern
                )));
            }
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(ProxyError::Config(format!(
                "metrics.path must start with '/': {}",
                self.metrics.path
            )));
        }

        if self.metrics.enabled {
            let path = self.metrics.path.as_str();
            let under_prefix = path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
            if under_prefix {
                return Err(ProxyError::Config(format!(
                    "metrics.path '{}' overlaps auth.prefix '{}'",
                    path, prefix
                )));
            }
        }

        Ok(())
    }

    /// Path component of the login URL when it points at this host
    pub fn login_path(&self) -> Option<String> {
        let login_url = &self.guard.login_url;
        if login_url.starts_with('/') {
            let path = login_url.split(&['?', '#'][..]).next().unwrap_or(login_url);
            return Some(path.to_string());
        }

        None
    }

    /// Create a default configuration for the given upstream, for testing
    pub fn default_config(base_url: &str) -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerConfig::default(),
            auth: AuthConfig {
                base_url: base_url.to_string(),
                ..AuthConfig::default()
            },
            guard: GuardConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
