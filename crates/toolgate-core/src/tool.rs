//! Tool contract consumed by the pipeline.
//!
//! The pipeline never inspects what a tool does; it only reads the
//! [`Annotations`] a tool declares and its input/output [`Schema`]s, and
//! eventually calls [`Tool::execute`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::CallContext;
use crate::error::GateResult;

/// Risk level a tool declares for its side effects.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Informational: no approval needed.
    #[default]
    Low,
    /// Moderate risk: logged, not gated.
    Medium,
    /// High risk: always requires explicit human approval.
    High,
    /// Critical: requires approval and is never auto-approved by policy.
    Critical,
}

impl RiskLevel {
    /// Whether this level requires a human approval before execution.
    pub fn requires_approval(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Behavioral hints a tool declares about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    pub cacheable: bool,
    pub risk_level: RiskLevel,
}

impl Annotations {
    /// Read-only, cacheable, low risk.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            cacheable: true,
            ..Self::default()
        }
    }

    /// Destructive, high risk.
    pub fn destructive() -> Self {
        Self {
            destructive: true,
            risk_level: RiskLevel::High,
            ..Self::default()
        }
    }

    /// Results may be reused: marked cacheable and free of observable side
    /// effects on repeat.
    pub fn is_cacheable(&self) -> bool {
        self.cacheable && (self.read_only || self.idempotent)
    }

    pub fn requires_approval(&self) -> bool {
        self.destructive || self.risk_level.requires_approval()
    }
}

/// Structural validator for tool input or output bytes.
pub trait Schema: Send + Sync {
    /// Validate a JSON payload, returning a human-readable reason on failure.
    fn validate(&self, payload: &[u8]) -> Result<(), String>;

    /// Whether the schema imposes no constraints.
    fn is_empty(&self) -> bool;
}

/// Minimal JSON schema: required top-level fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonFieldSchema {
    pub required_fields: Vec<String>,
}

/// Schema with no constraints, returned by tools that declare none.
pub static EMPTY_SCHEMA: JsonFieldSchema = JsonFieldSchema {
    required_fields: Vec::new(),
};

impl JsonFieldSchema {
    pub fn required<const N: usize>(fields: [&str; N]) -> Self {
        Self {
            required_fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

impl Schema for JsonFieldSchema {
    fn validate(&self, payload: &[u8]) -> Result<(), String> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| format!("malformed JSON: {e}"))?;
        let object = value
            .as_object()
            .ok_or_else(|| "expected a JSON object".to_string())?;
        for field in &self.required_fields {
            if !object.contains_key(field) {
                return Err(format!("missing field '{field}'"));
            }
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.required_fields.is_empty()
    }
}

/// Outcome of one tool call, real or synthesized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Raw output bytes (JSON by convention).
    pub output: Vec<u8>,
    /// Served from the result cache.
    #[serde(default)]
    pub cached: bool,
    /// Wall-clock execution time of the innermost handler.
    #[serde(default)]
    pub duration: Duration,
    /// References to artifacts the tool produced.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Tool-level error reported alongside a completed call.
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn new(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    /// Result whose output is the serialized JSON `value`.
    pub fn json(value: &Value) -> Self {
        Self::new(value.to_string())
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Parse the output as JSON.
    pub fn output_json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.output)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A capability the agent can invoke.
///
/// Implementations must be cheap to share (`Arc<dyn Tool>`); one tool object
/// serves every concurrent call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn annotations(&self) -> Annotations {
        Annotations::default()
    }

    fn input_schema(&self) -> &dyn Schema {
        &EMPTY_SCHEMA
    }

    fn output_schema(&self) -> &dyn Schema {
        &EMPTY_SCHEMA
    }

    async fn execute(&self, ctx: &CallContext, input: &[u8]) -> GateResult<ToolResult>;
}
