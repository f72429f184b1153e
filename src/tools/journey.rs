use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ToolHandler, ToolOutput};
use crate::errors::ToolError;
use crate::middleware::{CallContext, SpiralMiddleware};

/// `spiral_journey`: the journey summary. Not in the transition table, so
/// asking for it never moves the phase.
pub struct SpiralJourneyTool {
    spiral: Arc<SpiralMiddleware>,
}

impl SpiralJourneyTool {
    pub fn new(spiral: Arc<SpiralMiddleware>) -> Self {
        Self { spiral }
    }
}

#[async_trait]
impl ToolHandler for SpiralJourneyTool {
    fn name(&self) -> &str {
        "spiral_journey"
    }

    fn description(&self) -> &str {
        "Summarizes the spiral journey: current phase, tool calls made, reflection depth and recent transitions."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(self.spiral.summary()))
    }
}
