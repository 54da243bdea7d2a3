//! Network configuration for the REST boundary.

use std::time::Duration;

/// Bind address, public URL, and HTTP limits for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Externally visible base URL used in resource links. When unset, links
    /// are built from the bound host and port.
    pub public_url: Option<String>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Upper bound on handling one request. Must exceed the longest
    /// invocation timeout or slow engines surface as request timeouts.
    pub request_timeout: Duration,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            public_url: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(330),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl NetworkConfig {
    /// Base URL for links, without a trailing slash.
    #[must_use]
    pub fn base_url(&self, bound_port: u16) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{bound_port}", self.host),
        }
    }
}
