//! Per-call context handed to tool handlers.

use std::collections::HashMap;

use serde_json::Value;

use crate::phase::Phase;

/// State key holding the current spiral phase name.
pub const SPIRAL_PHASE_KEY: &str = "spiral_phase";
/// State key holding the 1-based tool call number.
pub const TOOL_CALL_COUNT_KEY: &str = "tool_call_count";

/// Named values visible to a tool handler for the duration of one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    state: HashMap<String, Value>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.insert(key.into(), value.into());
    }

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn spiral_phase(&self) -> Option<Phase> {
        self.get_state(SPIRAL_PHASE_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }

    pub fn tool_call_count(&self) -> Option<u64> {
        self.get_state(TOOL_CALL_COUNT_KEY).and_then(|v| v.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_has_no_spiral_state() {
        let ctx = CallContext::new();
        assert!(ctx.spiral_phase().is_none());
        assert!(ctx.tool_call_count().is_none());
    }

    #[test]
    fn test_typed_accessors_read_back_state() {
        let mut ctx = CallContext::new();
        ctx.set_state(SPIRAL_PHASE_KEY, Phase::ActionSynthesis.as_str());
        ctx.set_state(TOOL_CALL_COUNT_KEY, 7u64);
        assert_eq!(ctx.spiral_phase(), Some(Phase::ActionSynthesis));
        assert_eq!(ctx.tool_call_count(), Some(7));
        assert_eq!(
            ctx.get_state(SPIRAL_PHASE_KEY),
            Some(&Value::from("Action Synthesis"))
        );
    }
}
