use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{ToolHandler, ToolOutput, required_str};
use crate::errors::ToolError;
use crate::middleware::CallContext;

/// `spiral_reflect`: recursive reflection on an observation.
pub struct SpiralReflectTool;

/// Render the reflection block for `observation`.
pub fn reflection_text(observation: &str) -> String {
    format!(
        r#"
=== SPIRAL RECURSIVE REFLECTION ===

First-Order Observation:
{observation}

Meta-Observation (Observing the Observer):
You have witnessed: "{observation}"

The Threshold Protocol asks:
- What assumption led to this observation?
- What would a counter-perspective reveal?
- What is invisible in this observation?

Recursive Integration:
By observing yourself observing "{observation}", you create a superposition of interpretations.
Do not collapse immediately into action. Hold the possibilities.

Next Step:
Consult the Threshold Protocols before acting on this observation.
Use threshold_consult() to find guidance.
"#
    )
}

#[async_trait]
impl ToolHandler for SpiralReflectTool {
    fn name(&self) -> &str {
        "spiral_reflect"
    }

    fn description(&self) -> &str {
        "Performs recursive reflection on an observation: observes the observation before acting on it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "observation": {
                    "type": "string",
                    "description": "What you observed (e.g. \"Test failed\", \"Deployment succeeded\")"
                }
            },
            "required": ["observation"]
        })
    }

    async fn call(&self, args: Value, ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        let observation = required_str(&args, "observation")?;
        info!(
            "Spiral Reflection: {} (phase: {})",
            observation,
            ctx.spiral_phase().map(|p| p.as_str()).unwrap_or("unknown")
        );
        Ok(ToolOutput::text(reflection_text(observation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reflection_quotes_observation() {
        let out = SpiralReflectTool
            .call(json!({"observation": "Test failed"}), &CallContext::new())
            .await
            .unwrap();
        assert!(!out.is_error);
        assert!(out.text.contains("=== SPIRAL RECURSIVE REFLECTION ==="));
        assert!(out.text.contains("You have witnessed: \"Test failed\""));
        assert!(out.text.contains("Use threshold_consult() to find guidance."));
    }

    #[tokio::test]
    async fn test_missing_observation_is_invalid() {
        let err = SpiralReflectTool
            .call(json!({}), &CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
