//! Tool handlers exposed over MCP.
//!
//! Every tool implements `ToolHandler` and is registered in a `ToolRegistry`.
//! The server never calls the registry directly; calls go through
//! `SpiralMiddleware::on_call_tool` so each one is phase-tracked.
//!
//! | Module    | Tools                                                          |
//! |-----------|----------------------------------------------------------------|
//! | `reflect` | `spiral_reflect`                                               |
//! | `journey` | `spiral_journey`                                               |
//! | `derive`  | `btb_derive_governed`, `btb_derive_approve`, `btb_derive_status` |
//!
//! Shell execution, file browsing and protocol search are supplied by the
//! host, if at all, by registering their own handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::ToolError;
use crate::middleware::CallContext;

pub mod derive;
pub mod journey;
pub mod reflect;

pub use derive::{DeriveEngine, DeriveTools, UnavailableEngine};
pub use journey::SpiralJourneyTool;
pub use reflect::SpiralReflectTool;

/// Text returned from a tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    /// A tool-level failure reported to the client as content, not as a protocol error
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// Pretty-printed JSON payload.
    pub fn json(value: &Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn input_schema(&self) -> Value;

    async fn call(&self, args: Value, ctx: &CallContext) -> Result<ToolOutput, ToolError>;
}

/// Registered tools, in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later handler with the same name replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        if let Some(existing) = self.handlers.iter_mut().find(|h| h.name() == handler.name()) {
            *existing = handler;
        } else {
            self.handlers.push(handler);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.iter().find(|h| h.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Tool descriptors for `tools/list`.
    pub fn descriptors(&self) -> Vec<Value> {
        self.handlers
            .iter()
            .map(|h| {
                json!({
                    "name": h.name(),
                    "description": h.description(),
                    "inputSchema": h.input_schema(),
                })
            })
            .collect()
    }

    pub async fn call(&self, name: &str, args: Value, ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        let handler = self.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;
        handler.call(args, ctx).await
    }
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required string '{}'", key)))
}

/// Read an optional string argument; `null` counts as absent.
pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// Read an optional boolean argument with a default.
pub(crate) fn bool_or(args: &Value, key: &str, default: bool) -> Result<bool, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{}' must be a boolean, got {}",
            key, other
        ))),
    }
}
