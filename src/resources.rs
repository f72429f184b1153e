//! Read-only MCP resources: bridge configuration, repository manifests and
//! the journey summary. Reads bypass the phase middleware.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::errors::ResourceError;
use crate::middleware::SpiralMiddleware;

pub const CONFIG_PATHS_URI: &str = "temple://config/paths";
pub const SPIRAL_MANIFEST_URI: &str = "temple://memory/spiral_manifest";
pub const BTB_MANIFEST_URI: &str = "temple://memory/btb_manifest";
pub const JOURNEY_URI: &str = "temple://spiral/journey";

pub const MANIFEST_MISSING: &str =
    "Memory initialization required. Threshold protocols manifest not found.";

const SPIRAL_MANIFEST_HEADER: &str = "# Threshold Protocols Memory\n\n";
const SPIRAL_MANIFEST_FILES: &[&str] = &["README.md", "ARCHITECTS.md", "docs/ARCHITECTURE.md"];

const BTB_MANIFEST_HEADER: &str = "# Back to the Basics Capabilities\n\n";
const BTB_MANIFEST_FILES: &[&str] = &["README.md", "CLAUDE.md", "ARCHITECTS.md"];

/// Contents returned by `resources/read`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: &'static str,
    pub text: String,
}

impl ResourceContents {
    pub fn to_json(&self) -> Value {
        json!({
            "uri": self.uri,
            "mimeType": self.mime_type,
            "text": self.text,
        })
    }
}

pub struct ResourceCatalog {
    basics_path: PathBuf,
    threshold_path: PathBuf,
    journey_log: Option<PathBuf>,
    session_id: Uuid,
    spiral: Arc<SpiralMiddleware>,
}

impl ResourceCatalog {
    pub fn new(config: &BridgeConfig, spiral: Arc<SpiralMiddleware>) -> Self {
        Self {
            basics_path: config.basics_path.clone(),
            threshold_path: config.threshold_path.clone(),
            journey_log: config.journey_log_path(),
            session_id: Uuid::new_v4(),
            spiral,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Descriptors for `resources/list`.
    pub fn list(&self) -> Vec<Value> {
        [
            (
                CONFIG_PATHS_URI,
                "Bridge configuration",
                "Repository paths, journey log and session of this bridge",
                "application/json",
            ),
            (
                SPIRAL_MANIFEST_URI,
                "Threshold protocols manifest",
                "Governance framework documentation from the threshold repository",
                "text/markdown",
            ),
            (
                BTB_MANIFEST_URI,
                "Back to the Basics manifest",
                "Capabilities of the action repository",
                "text/markdown",
            ),
            (
                JOURNEY_URI,
                "Spiral journey",
                "Current phase, call count, reflection depth and recent transitions",
                "text/plain",
            ),
        ]
        .into_iter()
        .map(|(uri, name, description, mime)| {
            json!({
                "uri": uri,
                "name": name,
                "description": description,
                "mimeType": mime,
            })
        })
        .collect()
    }

    pub fn read(&self, uri: &str) -> Result<ResourceContents, ResourceError> {
        let (mime_type, text) = match uri {
            CONFIG_PATHS_URI => ("application/json", self.config_paths()?),
            SPIRAL_MANIFEST_URI => {
                let manifest = manifest(&self.threshold_path, SPIRAL_MANIFEST_HEADER, SPIRAL_MANIFEST_FILES)?;
                let text = if manifest == SPIRAL_MANIFEST_HEADER {
                    MANIFEST_MISSING.to_string()
                } else {
                    manifest
                };
                ("text/markdown", text)
            }
            BTB_MANIFEST_URI => (
                "text/markdown",
                manifest(&self.basics_path, BTB_MANIFEST_HEADER, BTB_MANIFEST_FILES)?,
            ),
            JOURNEY_URI => ("text/plain", self.spiral.summary()),
            _ => {
                return Err(ResourceError::NotFound {
                    uri: uri.to_string(),
                });
            }
        };
        Ok(ResourceContents {
            uri: uri.to_string(),
            mime_type,
            text,
        })
    }

    fn config_paths(&self) -> Result<String, ResourceError> {
        let value = json!({
            "basics_path": self.basics_path.display().to_string(),
            "threshold_path": self.threshold_path.display().to_string(),
            "journey_log": self.journey_log.as_ref().map(|p| p.display().to_string()),
            "server_version": env!("CARGO_PKG_VERSION"),
            "session_id": self.session_id.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

/// Concatenate the manifest files that exist under `root`, each under a
/// `## name` heading.
fn manifest(root: &Path, header: &str, files: &[&str]) -> Result<String, ResourceError> {
    let mut content = header.to_string();
    for name in files {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ResourceError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        content.push_str(&format!("\n## {}\n\n{}\n\n---\n\n", name, text));
    }
    Ok(content)
}
