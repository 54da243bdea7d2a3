//! Engines that run as a child process.
//!
//! The input document is written to the child's stdin and its stdout is read
//! back as the output document. The child gets a scrubbed environment: only
//! the allowlisted variables from the server's own environment plus the
//! engine's `env` entries.
//!
//! On Unix each child leads its own process group, and the whole group is
//! killed when the invocation settles or is dropped (timeout, cancellation).
//! Grandchildren a shell engine forks are reclaimed along with it. Elsewhere
//! only the direct child is killed, through `kill_on_drop`.

use std::io::ErrorKind;
use std::process::Stdio;

use anyhow::anyhow;
use async_trait::async_trait;
use scoring_core::ExecutionTarget;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use super::Executor;
use crate::error::{ScoringError, ScoringResult};
use crate::gateway::invocation::Invocation;
use crate::gateway::output::RawOutput;
use crate::service::config::ServerConfig;

const READ_CHUNK: usize = 8 * 1024;

/// Runs process engines.
pub struct ProcessExecutor {
    env_allowlist: Vec<String>,
    max_error_bytes: usize,
}

impl ProcessExecutor {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            env_allowlist: config.process_env_allowlist.clone(),
            max_error_bytes: config.max_error_bytes,
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, inv: &Invocation) -> ScoringResult<RawOutput> {
        let ExecutionTarget::Process { program, args, env } = &inv.engine.target else {
            return Err(ScoringError::Internal(anyhow!(
                "process executor received a {} engine",
                inv.engine.target.kind()
            )));
        };
        let failed = |message: String| ScoringError::ExecutionError {
            engine: inv.engine_name().to_string(),
            message,
        };

        let mut cmd = Command::new(program);
        cmd.args(args).env_clear();
        for key in &self.env_allowlist {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| failed(format!("failed to start {program}: {e}")))?;
        debug!(call_id = inv.call_id, engine = inv.engine_name(), pid = child.id(), "process started");
        #[cfg(unix)]
        let _group = ProcessGroup::new(child.id());

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ScoringError::Internal(anyhow!("child stdio was not piped")));
        };
        let payload = serde_json::to_vec(&*inv.input).map_err(anyhow::Error::from)?;

        let write = async move {
            let result = stdin.write_all(&payload).await;
            // Closing stdin signals end of input.
            drop(stdin);
            match result {
                // The child may exit without reading its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };
        let (written, out, err) = tokio::join!(
            write,
            read_bounded(stdout, inv.max_output_bytes),
            read_bounded(stderr, self.max_error_bytes),
        );
        written.map_err(|e| failed(format!("failed to write input: {e}")))?;
        let (out, out_truncated) = out.map_err(|e| failed(format!("failed to read output: {e}")))?;
        let (err, err_truncated) = err.map_err(|e| failed(format!("failed to read stderr: {e}")))?;

        let status = child
            .wait()
            .await
            .map_err(|e| failed(format!("failed to wait for process: {e}")))?;

        if !status.success() {
            let mut message = format!("process {status}");
            let stderr = String::from_utf8_lossy(&err);
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                message.push_str(": ");
                message.push_str(stderr);
                if err_truncated {
                    message.push_str("...[truncated]");
                }
            }
            return Err(failed(message));
        }
        if out_truncated {
            return Err(ScoringError::InvalidOutput {
                engine: inv.engine_name().to_string(),
                reason: format!("output exceeds {} bytes", inv.max_output_bytes),
            });
        }
        Ok(RawOutput::Bytes(out))
    }
}

/// Kills a child's process group when dropped.
#[cfg(unix)]
struct ProcessGroup(Option<nix::unistd::Pid>);

#[cfg(unix)]
impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self(
            pid.and_then(|pid| i32::try_from(pid).ok())
                .map(nix::unistd::Pid::from_raw),
        )
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        use nix::sys::signal::{killpg, Signal};

        if let Some(pgid) = self.0 {
            // ESRCH: the group already exited.
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                if e != nix::errno::Errno::ESRCH {
                    tracing::warn!(pgid = pgid.as_raw(), error = %e, "failed to kill engine process group");
                }
            }
        }
    }
}

/// Reads up to `limit` bytes, then drains the rest so the writer never blocks
/// on a full pipe. Returns the kept bytes and whether anything was discarded.
async fn read_bounded<R>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = vec![0_u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok((kept, truncated));
        }
        let room = limit.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
}
