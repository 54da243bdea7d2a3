//! Minimal output contract every engine result must satisfy.
//!
//! Output must be a well-formed JSON document, must not be `null`, and must
//! fit within the byte budget. Anything else is an engine defect reported as
//! [`ScoringError::InvalidOutput`]; nothing is coerced.

use serde_json::Value;

use crate::error::{ScoringError, ScoringResult};

/// Raw result handed back by an executor, before validation.
#[derive(Debug)]
pub enum RawOutput {
    /// Serialized output from an external process or endpoint.
    Bytes(Vec<u8>),
    /// Structured output from an in-process function.
    Value(Value),
}

/// Applies the output contract.
///
/// # Errors
///
/// Returns [`ScoringError::InvalidOutput`] naming `engine` and the violation.
pub fn validate_output(engine: &str, raw: RawOutput, max_bytes: usize) -> ScoringResult<Value> {
    let invalid = |reason: String| ScoringError::InvalidOutput {
        engine: engine.to_string(),
        reason,
    };

    let value = match raw {
        RawOutput::Bytes(bytes) => {
            if bytes.len() > max_bytes {
                return Err(invalid(format!(
                    "output is {} bytes, limit is {max_bytes}",
                    bytes.len()
                )));
            }
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Err(invalid("output is empty".to_string()));
            }
            serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| invalid(format!("output is not well-formed JSON: {e}")))?
        }
        RawOutput::Value(value) => {
            let size = serde_json::to_vec(&value)
                .map_err(|e| invalid(e.to_string()))?
                .len();
            if size > max_bytes {
                return Err(invalid(format!("output is {size} bytes, limit is {max_bytes}")));
            }
            value
        }
    };

    if value.is_null() {
        return Err(invalid("output is null".to_string()));
    }
    Ok(value)
}
