//! Spiral phase tracking.
//!
//! `PhaseTracker` is the pure state machine: it owns the current phase, the
//! transition history and the call counters, and applies the rule table in
//! `rules`. It performs no I/O; `SpiralMiddleware` wraps it with the lock and
//! the journey log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::{Phase, ToolId};

pub mod rules;

use rules::{POST_CALL_RULES, PRE_CALL_RULES, TransitionRule};

/// Number of transitions shown in the journey summary.
pub const SUMMARY_HISTORY_LEN: usize = 5;

/// A recorded change of phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub timestamp: DateTime<Utc>,
    pub from_phase: Phase,
    pub to_phase: Phase,
    /// Tool calls made when the transition happened
    #[serde(rename = "tool_calls_so_far")]
    pub call_count_at_transition: u64,
}

impl Transition {
    pub fn new(from_phase: Phase, to_phase: Phase, call_count_at_transition: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            from_phase,
            to_phase,
            call_count_at_transition,
        }
    }

    /// `from → to (#n)`
    pub fn describe(&self) -> String {
        format!(
            "{} → {} (#{})",
            self.from_phase, self.to_phase, self.call_count_at_transition
        )
    }
}

/// What happened when a tool call was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStep {
    /// Phase current when the call arrived
    pub phase_at_call: Phase,
    /// Reflection depth when the call arrived
    pub reflection_depth_at_call: u32,
    /// 1-based number of this call
    pub call_number: u64,
    /// Phase after the pre-call rules ran
    pub phase: Phase,
    /// The transition appended to history, if the phase changed
    pub transition: Option<Transition>,
}

/// Serializable view of the tracker for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerSnapshot {
    pub current_phase: Phase,
    pub call_count: u64,
    pub reflection_depth: u32,
    pub transitions: usize,
}

/// The spiral state machine.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    current_phase: Phase,
    history: Vec<Transition>,
    call_count: u64,
    reflection_depth: u32,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    pub fn reflection_depth(&self) -> u32 {
        self.reflection_depth
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            current_phase: self.current_phase,
            call_count: self.call_count,
            reflection_depth: self.reflection_depth,
            transitions: self.history.len(),
        }
    }

    /// Record the arrival of a tool call and apply the pre-call rules.
    ///
    /// Counts the call exactly once. Unrecognized tool names are counted but
    /// never move the phase.
    pub fn record_call(&mut self, tool_name: &str) -> CallStep {
        let phase_at_call = self.current_phase;
        let reflection_depth_at_call = self.reflection_depth;
        self.call_count += 1;

        let transition = match rules::evaluate(PRE_CALL_RULES, ToolId::parse(tool_name), phase_at_call) {
            Some(rule) => self.apply(rule),
            None => None,
        };

        CallStep {
            phase_at_call,
            reflection_depth_at_call,
            call_number: self.call_count,
            phase: self.current_phase,
            transition,
        }
    }

    /// Apply the post-call rules once the tool has completed.
    ///
    /// The outcome does not affect phase state. Its preview is written to
    /// the witness event by `SpiralMiddleware::record_completion`, which
    /// also skips this call when the handler returned `Err`.
    pub fn record_completion(&mut self, tool_name: &str) -> Option<Transition> {
        let rule = rules::evaluate(POST_CALL_RULES, ToolId::parse(tool_name), self.current_phase)?;
        self.apply(rule)
    }

    fn apply(&mut self, rule: &TransitionRule) -> Option<Transition> {
        if rule.deepens_reflection {
            self.reflection_depth += 1;
        }
        self.transition_to(rule.to)
    }

    /// Move to `phase`, appending to history only when it differs.
    fn transition_to(&mut self, phase: Phase) -> Option<Transition> {
        if phase == self.current_phase {
            return None;
        }
        let transition = Transition::new(self.current_phase, phase, self.call_count);
        self.current_phase = phase;
        self.history.push(transition.clone());
        Some(transition)
    }

    /// Digest of the journey so far: phase, counters, and the last five transitions.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("\n=== SPIRAL JOURNEY SUMMARY ===\n\n");
        summary.push_str(&format!("Current Phase: {}\n", self.current_phase));
        summary.push_str(&format!("Tool Calls Made: {}\n", self.call_count));
        summary.push_str(&format!("Reflection Depth: {}\n", self.reflection_depth));
        summary.push_str("\nPhase History:\n");
        let start = self.history.len().saturating_sub(SUMMARY_HISTORY_LEN);
        for transition in &self.history[start..] {
            summary.push_str(&format!("  {}\n", transition.describe()));
        }
        summary
    }
}
