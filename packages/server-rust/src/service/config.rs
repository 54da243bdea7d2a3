use std::time::Duration;

/// Server-level configuration for the catalog, listing, and invocation paths.
///
/// Controls page sizes, invocation timeouts, concurrency limits, and the
/// environment handed to process engines.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Page size used when the caller passes no limit or zero.
    pub default_page_limit: usize,
    /// Upper bound on page size; larger requests are clamped.
    pub max_page_limit: usize,
    /// Invocation timeout used when the caller does not supply one.
    pub default_invoke_timeout: Duration,
    /// No invocation may run longer than this, whatever the caller asks for.
    pub max_invoke_timeout: Duration,
    /// Maximum number of invocations in flight before load shedding.
    pub max_concurrent_invocations: u32,
    /// Default cap on the size of an engine's raw output in bytes.
    pub max_output_bytes: usize,
    /// Maximum bytes of stderr / error body echoed back in an execution error.
    pub max_error_bytes: usize,
    /// Environment variables passed through to process engines. Everything
    /// else is stripped; per-engine `env` entries are added on top.
    pub process_env_allowlist: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_page_limit: 50,
            max_page_limit: 1000,
            default_invoke_timeout: Duration::from_secs(30),
            max_invoke_timeout: Duration::from_secs(300),
            max_concurrent_invocations: 256,
            max_output_bytes: 1024 * 1024,
            max_error_bytes: 4096,
            process_env_allowlist: ["PATH", "HOME", "USER", "LANG", "LC_ALL", "TZ"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
