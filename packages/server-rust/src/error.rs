//! Error taxonomy shared by the catalog, listing service, and gateway.

/// Errors surfaced to callers of the registry.
///
/// Every variant names the identity it concerns so the boundary can report
/// kind + identity without extra context. Nothing here is retried
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("scoring engine not found: {ident}")]
    NotFound { ident: String },
    #[error("malformed metainfo for {name}: {reason}")]
    MalformedMetainfo { name: String, reason: String },
    #[error("scoring engine name already registered: {name}")]
    Conflict { name: String },
    #[error("scoring engine {engine} timed out after {timeout_ms}ms")]
    Timeout { engine: String, timeout_ms: u64 },
    #[error("scoring engine {engine} produced invalid output: {reason}")]
    InvalidOutput { engine: String, reason: String },
    #[error("scoring engine {engine} failed: {message}")]
    ExecutionError { engine: String, message: String },
    #[error("too many concurrent invocations of {scope}, try again later")]
    Overloaded { scope: String },
    #[error("invocation of {engine} was cancelled")]
    Cancelled { engine: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ScoringError {
    /// Stable machine-readable name of the variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound { .. } => "not_found",
            Self::MalformedMetainfo { .. } => "malformed_metainfo",
            Self::Conflict { .. } => "conflict",
            Self::Timeout { .. } => "timeout",
            Self::InvalidOutput { .. } => "invalid_output",
            Self::ExecutionError { .. } => "execution_error",
            Self::Overloaded { .. } => "overloaded",
            Self::Cancelled { .. } => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// `true` when the engine's own computation is at fault, as opposed to
    /// the caller or the infrastructure around the engine.
    #[must_use]
    pub fn is_engine_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidOutput { .. } | Self::ExecutionError { .. }
        )
    }

    pub(crate) fn not_found(ident: impl Into<String>) -> Self {
        Self::NotFound {
            ident: ident.into(),
        }
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_faults_are_distinguished_from_infrastructure_faults() {
        let output = ScoringError::InvalidOutput {
            engine: "e1".into(),
            reason: "not json".into(),
        };
        let failed = ScoringError::ExecutionError {
            engine: "e1".into(),
            message: "exit code 3".into(),
        };
        let timeout = ScoringError::Timeout {
            engine: "e1".into(),
            timeout_ms: 5000,
        };
        assert!(output.is_engine_fault());
        assert!(failed.is_engine_fault());
        assert!(!timeout.is_engine_fault());
        assert!(!ScoringError::not_found("x").is_engine_fault());
    }

    #[test]
    fn messages_carry_identity() {
        let err = ScoringError::Timeout {
            engine: "power-score".into(),
            timeout_ms: 5000,
        };
        assert_eq!(err.kind(), "timeout");
        assert_eq!(
            err.to_string(),
            "scoring engine power-score timed out after 5000ms"
        );
    }

    #[test]
    fn anyhow_errors_become_internal() {
        let err: ScoringError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.kind(), "internal");
    }
}
