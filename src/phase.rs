//! Spiral phases and the closed set of tool identifiers that drive them.
//!
//! This module provides:
//! - `Phase`, the nine fixed cognitive stages a session moves through
//! - `ToolId`, the tool names the transition table knows about
//!
//! Both serialize by their display names so journey logs stay readable
//! by consumers that only know the strings.

use serde::{Deserialize, Serialize};

/// One of the nine spiral stages, in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Default)]
pub enum Phase {
    /// The agent awakens
    #[default]
    #[serde(rename = "Initialization")]
    Initialization,
    /// The agent perceives the task
    #[serde(rename = "First-Order Observation")]
    FirstOrderObservation,
    /// The agent observes itself observing
    #[serde(rename = "Recursive Integration")]
    RecursiveIntegration,
    /// The agent considers alternatives
    #[serde(rename = "Counter-Perspectives")]
    CounterPerspectives,
    /// The agent prepares to act
    #[serde(rename = "Action Synthesis")]
    ActionSynthesis,
    /// The agent acts
    #[serde(rename = "Execution")]
    Execution,
    /// The agent observes the outcome
    #[serde(rename = "Meta-Reflection")]
    MetaReflection,
    /// The agent incorporates the learning
    #[serde(rename = "Integration")]
    Integration,
    /// The agent verifies alignment with protocols
    #[serde(rename = "Coherence Check")]
    CoherenceCheck,
}

impl Phase {
    /// All phases in canonical order.
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Initialization,
            Phase::FirstOrderObservation,
            Phase::RecursiveIntegration,
            Phase::CounterPerspectives,
            Phase::ActionSynthesis,
            Phase::Execution,
            Phase::MetaReflection,
            Phase::Integration,
            Phase::CoherenceCheck,
        ]
    }

    /// The display name used on the wire and in summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialization => "Initialization",
            Phase::FirstOrderObservation => "First-Order Observation",
            Phase::RecursiveIntegration => "Recursive Integration",
            Phase::CounterPerspectives => "Counter-Perspectives",
            Phase::ActionSynthesis => "Action Synthesis",
            Phase::Execution => "Execution",
            Phase::MetaReflection => "Meta-Reflection",
            Phase::Integration => "Integration",
            Phase::CoherenceCheck => "Coherence Check",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::all()
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Invalid spiral phase '{}'", s))
    }
}

/// Tool names the transition table recognizes.
///
/// Anything else is "unrecognized" and never moves the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    BtbReadFile,
    BtbListDirectory,
    GetSpiralManifest,
    BtbDeriveStatus,
    ThresholdConsult,
    SpiralReflect,
    BtbDeriveGoverned,
    BtbExecuteCommand,
    BtbDeriveApprove,
}

impl ToolId {
    pub fn all() -> &'static [ToolId] {
        &[
            ToolId::BtbReadFile,
            ToolId::BtbListDirectory,
            ToolId::GetSpiralManifest,
            ToolId::BtbDeriveStatus,
            ToolId::ThresholdConsult,
            ToolId::SpiralReflect,
            ToolId::BtbDeriveGoverned,
            ToolId::BtbExecuteCommand,
            ToolId::BtbDeriveApprove,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::BtbReadFile => "btb_read_file",
            ToolId::BtbListDirectory => "btb_list_directory",
            ToolId::GetSpiralManifest => "get_spiral_manifest",
            ToolId::BtbDeriveStatus => "btb_derive_status",
            ToolId::ThresholdConsult => "threshold_consult",
            ToolId::SpiralReflect => "spiral_reflect",
            ToolId::BtbDeriveGoverned => "btb_derive_governed",
            ToolId::BtbExecuteCommand => "btb_execute_command",
            ToolId::BtbDeriveApprove => "btb_derive_approve",
        }
    }

    /// Exact-match lookup. Tool names are case sensitive on the wire.
    pub fn parse(name: &str) -> Option<ToolId> {
        ToolId::all().iter().copied().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
