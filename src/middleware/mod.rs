//! Spiral middleware: phase tracking around every tool call.
//!
//! `SpiralMiddleware` is constructed once per server and shared by `Arc`.
//! It owns the `PhaseTracker` behind a mutex and the `WitnessLogger`, and
//! wraps each tool invocation:
//!
//! 1. count the call and apply the pre-call rules (logging any transition)
//! 2. publish `spiral_phase` (the phase the call arrived in) and
//!    `tool_call_count` on the `CallContext`
//! 3. run the tool
//! 4. apply the post-call rules unless the handler returned `Err`, then
//!    write the witness event
//!
//! Steps 1 and 4 each run entirely under the lock, so concurrent calls never
//! lose updates or reorder history. Nothing here fails a tool call: journey
//! log errors are reported through `tracing` and dropped.
//!
//! # Usage
//!
//! ```ignore
//! let spiral = Arc::new(SpiralMiddleware::new(WitnessLogger::new(Some(path))));
//! let output = spiral
//!     .on_call_tool("spiral_reflect", CallContext::new(), |ctx| async move {
//!         registry.call("spiral_reflect", args, &ctx).await
//!     })
//!     .await;
//! ```

pub mod context;

pub use context::{CallContext, SPIRAL_PHASE_KEY, TOOL_CALL_COUNT_KEY};

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::errors::ToolError;
use crate::phase::Phase;
use crate::tools::ToolOutput;
use crate::tracker::{PhaseTracker, TrackerSnapshot, Transition};
use crate::witness::{WitnessEvent, WitnessLogger, WitnessRecord};

/// Receipt for a call recorded by `record_call`, redeemed by `record_completion`.
#[derive(Debug, Clone)]
pub struct CallTicket {
    tool_name: String,
    /// Phase the call arrived in
    pub phase_at_call: Phase,
    pub call_number: u64,
    event: WitnessEvent,
}

pub struct SpiralMiddleware {
    tracker: Mutex<PhaseTracker>,
    logger: WitnessLogger,
}

impl SpiralMiddleware {
    pub fn new(logger: WitnessLogger) -> Self {
        match logger.log_path() {
            Some(path) => info!(
                "Spiral session started in {} (journey log: {})",
                Phase::Initialization,
                path.display()
            ),
            None => info!(
                "Spiral session started in {} (journey log disabled)",
                Phase::Initialization
            ),
        }
        Self {
            tracker: Mutex::new(PhaseTracker::new()),
            logger,
        }
    }

    /// Recover the tracker from a poisoned lock; the state machine must stay available.
    fn lock(&self) -> MutexGuard<'_, PhaseTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, record: WitnessRecord) {
        if let Err(e) = self.logger.append(&record) {
            warn!("Failed to write journey log: {}", e);
        }
    }

    fn log_transition(&self, transition: &Transition) {
        info!(
            "🔄 Phase Transition: {} → {}",
            transition.from_phase, transition.to_phase
        );
        self.write(transition.clone().into());
    }

    /// Count a tool call and apply the pre-call rules.
    pub fn record_call(&self, tool_name: &str) -> CallTicket {
        let mut tracker = self.lock();
        let step = tracker.record_call(tool_name);

        info!(
            "🌀 Spiral Phase: {} | Tool: {} | Call #{}",
            step.phase_at_call, tool_name, step.call_number
        );
        if let Some(transition) = &step.transition {
            self.log_transition(transition);
        }

        CallTicket {
            tool_name: tool_name.to_string(),
            phase_at_call: step.phase_at_call,
            call_number: step.call_number,
            event: WitnessEvent::new(
                step.phase_at_call,
                tool_name,
                step.call_number,
                step.reflection_depth_at_call,
            ),
        }
    }

    /// Finish a call: apply the post-call rules when the tool completed, then
    /// witness the call with a preview of `outcome`.
    ///
    /// A tool that returns an error result still completed; only a handler
    /// `Err` passes `completed = false`.
    ///
    /// Returns the phase after completion.
    pub fn record_completion(&self, ticket: CallTicket, completed: bool, outcome: Option<&str>) -> Phase {
        let mut tracker = self.lock();
        if completed && let Some(transition) = tracker.record_completion(&ticket.tool_name) {
            self.log_transition(&transition);
        }
        self.write(ticket.event.with_result(outcome).into());
        tracker.current_phase()
    }

    /// Run `call_next` wrapped in phase tracking.
    ///
    /// Handler errors pass through untouched; the pre-call transition is
    /// never rolled back.
    pub async fn on_call_tool<F, Fut>(
        &self,
        tool_name: &str,
        mut ctx: CallContext,
        call_next: F,
    ) -> Result<ToolOutput, ToolError>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<ToolOutput, ToolError>>,
    {
        let ticket = self.record_call(tool_name);
        ctx.set_state(SPIRAL_PHASE_KEY, ticket.phase_at_call.as_str());
        ctx.set_state(TOOL_CALL_COUNT_KEY, ticket.call_number);

        let result = call_next(ctx).await;

        let phase = match &result {
            Ok(output) => self.record_completion(ticket, true, Some(&output.text)),
            Err(e) => {
                debug!("Tool {} failed: {}", tool_name, e);
                let message = e.to_string();
                self.record_completion(ticket, false, Some(&message))
            }
        };
        debug!("Tool {} finished in phase {}", tool_name, phase);

        result
    }

    pub fn current_phase(&self) -> Phase {
        self.lock().current_phase()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.lock().snapshot()
    }

    pub fn history(&self) -> Vec<Transition> {
        self.lock().history().to_vec()
    }

    pub fn summary(&self) -> String {
        self.lock().summary()
    }
}
