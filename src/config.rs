//! Configuration module

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Control-surface port
    pub port: u16,

    /// Proxy ingress port
    pub proxy_port: u16,

    /// SQLite audit database path
    pub database_path: String,

    /// Blocking threshold (0.0 - 1.0). One value for every entry point.
    pub threshold: f64,

    /// Fold header content into the feature vector
    pub include_headers: bool,

    /// Upstream relay timeout in seconds
    pub relay_timeout_secs: u64,

    /// Relayed response bodies are truncated beyond this many characters
    pub relay_body_cap: usize,

    /// Maximum inbound request body size in bytes
    pub max_body_bytes: usize,

    /// Start the proxy listener at boot
    pub proxy_autostart: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("WAF_CONTROL_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            proxy_port: env::var("WAF_PROXY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8888),

            database_path: env::var("WAF_DATABASE_PATH")
                .unwrap_or_else(|_| "waf.db".to_string()),

            threshold: env::var("WAF_THRESHOLD")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(0.35),

            include_headers: env::var("WAF_INCLUDE_HEADERS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),

            relay_timeout_secs: env::var("WAF_RELAY_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(15),

            relay_body_cap: env::var("WAF_RELAY_BODY_CAP")
                .ok()
                .and_then(|c| c.parse().ok())
                .unwrap_or(20_000),

            max_body_bytes: env::var("WAF_MAX_BODY_BYTES")
                .ok()
                .and_then(|c| c.parse().ok())
                .unwrap_or(2 * 1024 * 1024),

            proxy_autostart: env::var("WAF_PROXY_AUTOSTART")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            proxy_port: 8888,
            database_path: "waf.db".to_string(),
            threshold: 0.35,
            include_headers: false,
            relay_timeout_secs: 15,
            relay_body_cap: 20_000,
            max_body_bytes: 2 * 1024 * 1024,
            proxy_autostart: false,
        }
    }
}
