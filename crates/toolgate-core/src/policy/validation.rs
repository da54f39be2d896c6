//! Input and output validation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{CallContext, ExecutionContext};
use crate::error::{GateError, GateResult};
use crate::handler::{Middleware, Next};
use crate::tool::{Schema, ToolResult};

/// Validation stage settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject empty or `null` payloads.
    pub reject_empty: bool,
    /// Apply the same checks to tool output.
    pub validate_output: bool,
}

/// Check a payload against the JSON rules and an optional schema.
pub fn check_payload(payload: &[u8], schema: &dyn Schema, reject_empty: bool) -> Result<(), String> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return if reject_empty {
            Err("payload is empty".into())
        } else {
            Ok(())
        };
    }
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| format!("malformed JSON: {e}"))?;
    if value.is_null() {
        return if reject_empty {
            Err("payload is null".into())
        } else {
            Ok(())
        };
    }
    if !schema.is_empty() {
        schema.validate(payload)?;
    }
    Ok(())
}

/// Rejects malformed input before the tool runs and, when enabled,
/// malformed output after it returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationMiddleware {
    config: ValidationConfig,
}

impl ValidationMiddleware {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    async fn handle(
        &self,
        ctx: &CallContext,
        exec: &mut ExecutionContext,
        next: Next<'_>,
    ) -> GateResult<ToolResult> {
        let tool = exec.tool().clone();
        check_payload(&exec.input, tool.input_schema(), self.config.reject_empty).map_err(
            |reason| GateError::InvalidInput {
                tool: tool.name().to_string(),
                reason,
            },
        )?;

        let result = next.run(ctx, exec).await?;

        if self.config.validate_output && !result.is_error() {
            check_payload(&result.output, tool.output_schema(), self.config.reject_empty)
                .map_err(|reason| GateError::InvalidOutput {
                    tool: tool.name().to_string(),
                    reason,
                })?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{JsonFieldSchema, EMPTY_SCHEMA};

    #[test]
    fn test_malformed_json_always_rejected() {
        let err = check_payload(b"{not json", &EMPTY_SCHEMA, false).unwrap_err();
        assert!(err.starts_with("malformed JSON"));
    }

    #[test]
    fn test_empty_and_null_depend_on_flag() {
        assert!(check_payload(b"", &EMPTY_SCHEMA, false).is_ok());
        assert!(check_payload(b"null", &EMPTY_SCHEMA, false).is_ok());
        assert!(check_payload(b"  ", &EMPTY_SCHEMA, true).is_err());
        assert_eq!(
            check_payload(b"null", &EMPTY_SCHEMA, true).unwrap_err(),
            "payload is null"
        );
    }

    #[test]
    fn test_schema_is_consulted() {
        let schema = JsonFieldSchema::required(["path"]);
        assert!(check_payload(br#"{"path":"/tmp"}"#, &schema, false).is_ok());
        assert!(check_payload(br#"{"mode":1}"#, &schema, false)
            .unwrap_err()
            .contains("path"));
    }
}
