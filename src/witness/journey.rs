//! Replay of a journey log written by `WitnessLogger`.

use super::{WitnessEvent, WitnessRecord};
use crate::phase::Phase;
use crate::tracker::Transition;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// Records parsed back out of a journey log, in file order.
#[derive(Debug, Clone, Default)]
pub struct JourneyReplay {
    pub records: Vec<WitnessRecord>,
    /// Non-blank lines that did not parse as either record shape
    pub skipped_lines: usize,
}

impl JourneyReplay {
    /// Load a journey log. Malformed lines are skipped with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read journey log: {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut replay = JourneyReplay::default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<WitnessRecord>(trimmed) {
                Ok(record) => replay.records.push(record),
                Err(e) => {
                    warn!("Skipping journey line {}: {}", idx + 1, e);
                    replay.skipped_lines += 1;
                }
            }
        }
        replay
    }

    pub fn transitions(&self) -> Vec<&Transition> {
        self.records
            .iter()
            .filter_map(|r| match r {
                WitnessRecord::Transition(t) => Some(t),
                WitnessRecord::ToolCall(_) => None,
            })
            .collect()
    }

    pub fn witnessed_calls(&self) -> Vec<&WitnessEvent> {
        self.records
            .iter()
            .filter_map(|r| match r {
                WitnessRecord::ToolCall(e) => Some(e),
                WitnessRecord::Transition(_) => None,
            })
            .collect()
    }

    /// Phase the session ended in, per the last logged transition.
    pub fn final_phase(&self) -> Phase {
        self.transitions()
            .last()
            .map(|t| t.to_phase)
            .unwrap_or_default()
    }

    /// Human-readable digest showing the last `last` transitions.
    pub fn digest(&self, last: usize) -> String {
        let transitions = self.transitions();
        let mut out = String::new();
        out.push_str("=== SPIRAL JOURNEY REPLAY ===\n\n");
        out.push_str(&format!("Final Phase: {}\n", self.final_phase()));
        out.push_str(&format!("Witnessed Calls: {}\n", self.witnessed_calls().len()));
        out.push_str(&format!("Transitions: {}\n", transitions.len()));
        if self.skipped_lines > 0 {
            out.push_str(&format!("Skipped Lines: {}\n", self.skipped_lines));
        }
        out.push_str("\nPhase History:\n");
        let start = transitions.len().saturating_sub(last);
        for t in &transitions[start..] {
            out.push_str(&format!("  {}\n", t.describe()));
        }
        out
    }
}
