//! The fixed spiral transition table.
//!
//! Rules are evaluated top to bottom and the first match wins. The table is
//! closed: phases and tools are enums, and nothing registers rules at runtime.
//!
//! Two pairs of rows resolve to the same destination (`threshold_consult` and
//! `btb_execute_command` each have a guarded row and a mapping row). Both rows
//! are kept so the table mirrors the documented priority order exactly.
//! No row leads into `Integration` or `Coherence Check`.

use crate::phase::{Phase, ToolId};

/// Condition on the current phase for a rule to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Applies from any phase
    Any,
    /// Applies only when the current phase is one of these
    From(&'static [Phase]),
}

impl Guard {
    pub fn admits(&self, current: Phase) -> bool {
        match self {
            Guard::Any => true,
            Guard::From(phases) => phases.contains(&current),
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub tool: ToolId,
    pub guard: Guard,
    pub to: Phase,
    /// Whether matching this row deepens reflection by one level
    pub deepens_reflection: bool,
}

impl TransitionRule {
    const fn new(tool: ToolId, guard: Guard, to: Phase) -> Self {
        Self {
            tool,
            guard,
            to,
            deepens_reflection: false,
        }
    }

    const fn deepening(tool: ToolId, to: Phase) -> Self {
        Self {
            tool,
            guard: Guard::Any,
            to,
            deepens_reflection: true,
        }
    }

    pub fn matches(&self, tool: ToolId, current: Phase) -> bool {
        self.tool == tool && self.guard.admits(current)
    }
}

/// Rules applied when a tool call arrives, before the tool runs.
pub const PRE_CALL_RULES: &[TransitionRule] = &[
    // Consulting the protocols right after reading is observing the observer
    TransitionRule::new(
        ToolId::ThresholdConsult,
        Guard::From(&[Phase::FirstOrderObservation]),
        Phase::RecursiveIntegration,
    ),
    TransitionRule::deepening(ToolId::SpiralReflect, Phase::CounterPerspectives),
    TransitionRule::new(
        ToolId::BtbExecuteCommand,
        Guard::From(&[Phase::CounterPerspectives, Phase::ActionSynthesis]),
        Phase::Execution,
    ),
    TransitionRule::new(ToolId::BtbDeriveGoverned, Guard::Any, Phase::ActionSynthesis),
    TransitionRule::new(ToolId::BtbDeriveApprove, Guard::Any, Phase::Execution),
    // Static mapping
    TransitionRule::new(ToolId::BtbReadFile, Guard::Any, Phase::FirstOrderObservation),
    TransitionRule::new(ToolId::BtbListDirectory, Guard::Any, Phase::FirstOrderObservation),
    TransitionRule::new(ToolId::GetSpiralManifest, Guard::Any, Phase::FirstOrderObservation),
    TransitionRule::new(ToolId::BtbDeriveStatus, Guard::Any, Phase::FirstOrderObservation),
    TransitionRule::new(ToolId::ThresholdConsult, Guard::Any, Phase::RecursiveIntegration),
    TransitionRule::new(ToolId::BtbExecuteCommand, Guard::Any, Phase::Execution),
    TransitionRule::new(ToolId::BtbDeriveApprove, Guard::Any, Phase::Execution),
];

/// Rules applied after the tool has completed.
pub const POST_CALL_RULES: &[TransitionRule] = &[TransitionRule::new(
    ToolId::BtbExecuteCommand,
    Guard::From(&[Phase::Execution]),
    Phase::MetaReflection,
)];

/// First rule in `rules` matching the tool and current phase.
///
/// Unrecognized tools (`None`) never match.
pub fn evaluate(
    rules: &'static [TransitionRule],
    tool: Option<ToolId>,
    current: Phase,
) -> Option<&'static TransitionRule> {
    let tool = tool?;
    rules.iter().find(|rule| rule.matches(tool, current))
}
