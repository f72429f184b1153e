//! Witness records for the spiral journey log.
//!
//! Two record shapes share one JSONL sink: phase transitions (keyed by
//! `from_phase`/`to_phase`) and tool-call witness events (keyed by `tool`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::tracker::Transition;

/// Maximum characters kept from a tool result in a witness event.
pub const RESULT_PREVIEW_CHARS: usize = 200;

/// Rendered in place of an empty or absent tool result.
pub const NO_RESULT_SENTINEL: &str = "None";

/// One witnessed tool invocation and the phase context it ran in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WitnessEvent {
    pub timestamp: DateTime<Utc>,
    /// Phase current when the call arrived, before any transition it caused
    #[serde(rename = "phase")]
    pub phase_at_call: Phase,
    #[serde(rename = "tool")]
    pub tool_name: String,
    pub call_number: u64,
    pub reflection_depth: u32,
    #[serde(default)]
    pub result_preview: String,
}

impl WitnessEvent {
    pub fn new(phase_at_call: Phase, tool_name: &str, call_number: u64, reflection_depth: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            phase_at_call,
            tool_name: tool_name.to_string(),
            call_number,
            reflection_depth,
            result_preview: String::new(),
        }
    }

    /// Attach the bounded preview of the tool's result.
    pub fn with_result(mut self, result: Option<&str>) -> Self {
        self.result_preview = result_preview(result);
        self
    }
}

/// A single line of the journey log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WitnessRecord {
    Transition(Transition),
    ToolCall(WitnessEvent),
}

impl WitnessRecord {
    pub fn is_transition(&self) -> bool {
        matches!(self, WitnessRecord::Transition(_))
    }
}

impl From<Transition> for WitnessRecord {
    fn from(t: Transition) -> Self {
        WitnessRecord::Transition(t)
    }
}

impl From<WitnessEvent> for WitnessRecord {
    fn from(e: WitnessEvent) -> Self {
        WitnessRecord::ToolCall(e)
    }
}

/// Render a tool result as a bounded preview.
///
/// Truncates on character boundaries, never mid code point.
pub fn result_preview(result: Option<&str>) -> String {
    match result {
        Some(text) if !text.is_empty() => text.chars().take(RESULT_PREVIEW_CHARS).collect(),
        _ => NO_RESULT_SENTINEL.to_string(),
    }
}

pub mod journey;
pub mod logger;
pub use journey::JourneyReplay;
pub use logger::WitnessLogger;
