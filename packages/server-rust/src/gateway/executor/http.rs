//! Engines reached over HTTP.
//!
//! The input document is POSTed as `application/json` to the engine's URL
//! and the response body is the output document. Any non-2xx status is an
//! execution failure. The body is read incrementally and abandoned as soon as
//! it exceeds the output budget.

use std::time::Duration;

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use scoring_core::ExecutionTarget;
use tracing::debug;

use super::Executor;
use crate::error::{ScoringError, ScoringResult};
use crate::gateway::invocation::Invocation;
use crate::gateway::output::RawOutput;
use crate::service::config::ServerConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs HTTP engines over a shared connection pool.
pub struct HttpExecutor {
    client: reqwest::Client,
    max_error_bytes: usize,
}

impl HttpExecutor {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (TLS backend
    /// initialization failure).
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            max_error_bytes: config.max_error_bytes,
        })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, inv: &Invocation) -> ScoringResult<RawOutput> {
        let ExecutionTarget::Http { url } = &inv.engine.target else {
            return Err(ScoringError::Internal(anyhow!(
                "http executor received a {} engine",
                inv.engine.target.kind()
            )));
        };
        let failed = |message: String| ScoringError::ExecutionError {
            engine: inv.engine_name().to_string(),
            message,
        };

        let mut response = self
            .client
            .post(url)
            .json(&*inv.input)
            .send()
            .await
            .map_err(|e| failed(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        debug!(call_id = inv.call_id, engine = inv.engine_name(), %status, "engine responded");

        let limit = if status.is_success() {
            inv.max_output_bytes
        } else {
            self.max_error_bytes
        };
        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| failed(format!("failed to read response from {url}: {e}")))?
        {
            let room = limit.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        if !status.is_success() {
            let mut message = format!("engine returned {status}");
            let text = String::from_utf8_lossy(&body);
            let text = text.trim();
            if !text.is_empty() {
                message.push_str(": ");
                message.push_str(text);
                if truncated {
                    message.push_str("...[truncated]");
                }
            }
            return Err(failed(message));
        }
        if truncated {
            return Err(ScoringError::InvalidOutput {
                engine: inv.engine_name().to_string(),
                reason: format!("output exceeds {limit} bytes"),
            });
        }
        Ok(RawOutput::Bytes(body))
    }
}
