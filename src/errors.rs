//! Typed error hierarchy for the temple bridge.
//!
//! - `WitnessError`: journey log sink failures (never reach a tool caller)
//! - `ConfigError`: configuration loading and repository verification
//! - `ToolError`: tool dispatch and handler failures
//! - `DeriveError`: failures reported by the governed derive engine
//! - `ResourceError`: resource lookup and read failures

use std::path::PathBuf;

use thiserror::Error;

/// Errors from appending to the journey log.
#[derive(Debug, Error)]
pub enum WitnessError {
    #[error("Failed to serialize journey record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to open journey log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock journey log at {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write journey log at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from loading or verifying bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{role} repository not found at: {path}")]
    RepositoryMissing { role: &'static str, path: PathBuf },

    #[error("Failed to read config file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from dispatching a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    NotFound { name: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the governed derive engine.
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("Governed derive not available: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors from reading an MCP resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Unknown resource: {uri}")]
    NotFound { uri: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render resource: {0}")]
    Render(#[from] serde_json::Error),
}
