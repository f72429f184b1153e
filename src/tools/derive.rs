//! Governed derive bridge.
//!
//! The clustering and reorganization engine lives outside this crate and is
//! reached through `DeriveEngine`. These tools add the approval gate on top:
//! a non-dry-run derive that the engine blocks is parked under its proposal
//! hash until `btb_derive_approve` re-runs it with approval granted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::info;

use super::{ToolHandler, ToolOutput, ToolRegistry, bool_or, optional_str, required_str};
use crate::errors::{DeriveError, ToolError};
use crate::middleware::CallContext;

/// Phase the engine reports when it stopped at a governance gate.
pub const PHASE_BLOCKED: &str = "blocked";

/// How many audit actions are echoed back in `audit_summary`.
const AUDIT_SUMMARY_LEN: usize = 5;

/// How many pending hashes an unknown-hash error lists.
const AVAILABLE_HASHES_LEN: usize = 5;

const DEFAULT_APPROVER: &str = "mcp_operator";

#[derive(Debug, Clone, PartialEq)]
pub struct DeriveRequest {
    pub source_dir: PathBuf,
    /// Engine default is `{source_dir}/organized`
    pub target_dir: Option<String>,
    pub dry_run: bool,
    pub auto_approve: bool,
    /// Detection config from the governance repository, when present
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeriveProposal {
    pub source_dir: String,
    pub target_dir: String,
    pub file_count: usize,
    pub proposed_structure: Value,
    pub reversibility_score: f64,
    pub proposal_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernanceSummary {
    pub circuit_closed: bool,
    pub events_detected: usize,
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeriveOutcome {
    pub phase: String,
    pub executed: bool,
    pub files_moved: usize,
    pub error: Option<String>,
    pub result_hash: Option<String>,
    pub proposal: Option<DeriveProposal>,
    pub governance: Option<GovernanceSummary>,
    /// Audit actions in the order the engine performed them
    pub audit_log: Vec<String>,
}

impl DeriveOutcome {
    pub fn is_blocked(&self) -> bool {
        self.phase == PHASE_BLOCKED
    }
}

/// The external derive engine.
#[async_trait]
pub trait DeriveEngine: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn derive_and_reorganize(&self, request: DeriveRequest) -> Result<DeriveOutcome, DeriveError>;
}

/// Engine used when no derive engine is installed.
#[derive(Debug, Clone, Default)]
pub struct UnavailableEngine;

#[async_trait]
impl DeriveEngine for UnavailableEngine {
    fn is_available(&self) -> bool {
        false
    }

    async fn derive_and_reorganize(&self, _request: DeriveRequest) -> Result<DeriveOutcome, DeriveError> {
        Err(DeriveError::Unavailable(
            "no derive engine is installed in this build".to_string(),
        ))
    }
}

#[derive(Debug, Clone)]
struct PendingProposal {
    source_dir: PathBuf,
    target_dir: Option<String>,
    timestamp: String,
}

/// State shared by the three derive tools.
pub struct DeriveTools {
    engine: Arc<dyn DeriveEngine>,
    basics_path: PathBuf,
    threshold_path: PathBuf,
    pending: Mutex<HashMap<String, PendingProposal>>,
}

impl DeriveTools {
    pub fn new(engine: Arc<dyn DeriveEngine>, basics_path: impl Into<PathBuf>, threshold_path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            basics_path: basics_path.into(),
            threshold_path: threshold_path.into(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register `btb_derive_governed`, `btb_derive_approve` and `btb_derive_status`.
    pub fn register(self: &Arc<Self>, registry: &mut ToolRegistry) {
        registry.register(Arc::new(DeriveGovernedTool(Arc::clone(self))));
        registry.register(Arc::new(DeriveApproveTool(Arc::clone(self))));
        registry.register(Arc::new(DeriveStatusTool(Arc::clone(self))));
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn resolve_source(&self, source_dir: &str) -> PathBuf {
        let path = Path::new(source_dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.basics_path.join(path)
        }
    }

    fn detection_config(&self) -> Option<PathBuf> {
        let path = self.threshold_path.join("detection").join("configs").join("default.yaml");
        path.exists().then_some(path)
    }

    async fn governed(&self, args: &Value) -> Result<Value, ToolError> {
        let source_dir = required_str(args, "source_dir")?;
        let target_dir = optional_str(args, "target_dir")?.map(str::to_string);
        let dry_run = bool_or(args, "dry_run", true)?;
        let auto_approve = bool_or(args, "auto_approve", false)?;

        if !self.engine.is_available() {
            return Ok(json!({
                "error": "Governed derive not available",
                "reason": "derive engine not installed",
                "suggestion": "Ensure TEMPLE_THRESHOLD_PATH points to the threshold-protocols repository",
                "phase": PHASE_BLOCKED,
            }));
        }

        let source_path = self.resolve_source(source_dir);
        if !source_path.exists() {
            return Ok(json!({
                "error": format!("Source directory does not exist: {}", source_path.display()),
                "phase": PHASE_BLOCKED,
            }));
        }

        info!(
            "Governed derive: {} (dry_run={}, auto_approve={})",
            source_path.display(),
            dry_run,
            auto_approve
        );

        let request = DeriveRequest {
            source_dir: source_path.clone(),
            target_dir: target_dir.clone(),
            dry_run,
            auto_approve,
            config_path: self.detection_config(),
        };
        let outcome = match self.engine.derive_and_reorganize(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(json!({
                    "error": format!("Derive operation failed: {}", e),
                    "phase": PHASE_BLOCKED,
                }));
            }
        };

        let mut response = outcome_fields(&outcome);

        if let Some(proposal) = &outcome.proposal {
            response.insert("proposal".into(), json!(proposal));

            if !auto_approve && !dry_run && outcome.is_blocked() {
                self.pending.lock().await.insert(
                    proposal.proposal_hash.clone(),
                    PendingProposal {
                        source_dir: source_path,
                        target_dir,
                        timestamp: Utc::now().to_rfc3339(),
                    },
                );
                response.insert("approval_required".into(), json!(true));
                response.insert(
                    "approval_instruction".into(),
                    json!(format!(
                        "Call btb_derive_approve('{}') to proceed with execution",
                        proposal.proposal_hash
                    )),
                );
            }
        }

        if let Some(governance) = &outcome.governance {
            response.insert("governance".into(), json!(governance));
        }

        response.insert("audit_entries".into(), json!(outcome.audit_log.len()));
        if !outcome.audit_log.is_empty() {
            let start = outcome.audit_log.len().saturating_sub(AUDIT_SUMMARY_LEN);
            response.insert("audit_summary".into(), json!(&outcome.audit_log[start..]));
        }

        Ok(Value::Object(response))
    }

    async fn approve(&self, args: &Value) -> Result<Value, ToolError> {
        let proposal_hash = required_str(args, "proposal_hash")?;
        let approver_id = optional_str(args, "approver_id")?.unwrap_or(DEFAULT_APPROVER);

        if !self.engine.is_available() {
            return Ok(json!({"error": "Governed derive not available"}));
        }

        let pending = {
            let mut pending = self.pending.lock().await;
            match pending.remove(proposal_hash) {
                Some(p) => p,
                None => {
                    let mut hashes: Vec<&String> = pending.keys().collect();
                    hashes.sort();
                    hashes.truncate(AVAILABLE_HASHES_LEN);
                    return Ok(json!({
                        "error": format!("No pending proposal with hash: {}", proposal_hash),
                        "pending_count": pending.len(),
                        "available_hashes": hashes,
                        "suggestion": "Run btb_derive_governed() first with dry_run=False",
                    }));
                }
            }
        };

        info!("Approving derive: {} by {}", proposal_hash, approver_id);

        let request = DeriveRequest {
            source_dir: pending.source_dir,
            target_dir: pending.target_dir,
            dry_run: false,
            auto_approve: true,
            config_path: self.detection_config(),
        };
        let outcome = match self.engine.derive_and_reorganize(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(json!({
                    "error": format!("Derive execution failed: {}", e),
                    "approved_by": approver_id,
                    "phase": PHASE_BLOCKED,
                }));
            }
        };

        let mut response = outcome_fields(&outcome);
        response.insert("approved_by".into(), json!(approver_id));
        if let Some(proposal) = &outcome.proposal {
            response.insert("final_target".into(), json!(proposal.target_dir));
        }
        Ok(Value::Object(response))
    }

    async fn status(&self) -> Value {
        let pending = self.pending.lock().await;
        if pending.is_empty() {
            return json!({
                "pending_count": 0,
                "message": "No pending derive operations",
            });
        }

        let mut proposals: Vec<(&String, &PendingProposal)> = pending.iter().collect();
        proposals.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(b.0)));
        let proposals: Vec<Value> = proposals
            .into_iter()
            .map(|(hash, p)| {
                json!({
                    "proposal_hash": hash,
                    "source_dir": p.source_dir.display().to_string(),
                    "target_dir": p.target_dir,
                    "timestamp": p.timestamp,
                })
            })
            .collect();

        json!({
            "pending_count": proposals.len(),
            "proposals": proposals,
        })
    }
}

fn outcome_fields(outcome: &DeriveOutcome) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("phase".into(), json!(outcome.phase));
    map.insert("executed".into(), json!(outcome.executed));
    map.insert("files_moved".into(), json!(outcome.files_moved));
    map.insert("error".into(), json!(outcome.error));
    map.insert("result_hash".into(), json!(outcome.result_hash));
    map
}

struct DeriveGovernedTool(Arc<DeriveTools>);

#[async_trait]
impl ToolHandler for DeriveGovernedTool {
    fn name(&self) -> &str {
        "btb_derive_governed"
    }

    fn description(&self) -> &str {
        "Discover latent structure in a directory and propose a reorganization behind governance gates. \
         Non-dry-run operations that are blocked wait for btb_derive_approve()."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source_dir": {
                    "type": "string",
                    "description": "Directory to analyze; relative paths resolve against the basics repository"
                },
                "target_dir": {
                    "type": "string",
                    "description": "Destination for organized files (default: {source_dir}/organized)"
                },
                "dry_run": {"type": "boolean", "default": true},
                "auto_approve": {"type": "boolean", "default": false}
            },
            "required": ["source_dir"]
        })
    }

    async fn call(&self, args: Value, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        let response = self.0.governed(&args).await?;
        Ok(ToolOutput::json(&response))
    }
}

struct DeriveApproveTool(Arc<DeriveTools>);

#[async_trait]
impl ToolHandler for DeriveApproveTool {
    fn name(&self) -> &str {
        "btb_derive_approve"
    }

    fn description(&self) -> &str {
        "Approve a pending derive proposal by hash and execute the reorganization."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "proposal_hash": {
                    "type": "string",
                    "description": "Hash returned by btb_derive_governed()"
                },
                "approver_id": {
                    "type": "string",
                    "default": DEFAULT_APPROVER
                }
            },
            "required": ["proposal_hash"]
        })
    }

    async fn call(&self, args: Value, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        let response = self.0.approve(&args).await?;
        Ok(ToolOutput::json(&response))
    }
}

struct DeriveStatusTool(Arc<DeriveTools>);

#[async_trait]
impl ToolHandler for DeriveStatusTool {
    fn name(&self) -> &str {
        "btb_derive_status"
    }

    fn description(&self) -> &str {
        "List derive proposals awaiting approval."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value, _ctx: &CallContext) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::json(&self.0.status().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Blocks every unapproved non-dry-run request and records what it saw.
    #[derive(Default)]
    struct GatedEngine {
        requests: StdMutex<Vec<DeriveRequest>>,
    }

    #[async_trait]
    impl DeriveEngine for GatedEngine {
        async fn derive_and_reorganize(&self, request: DeriveRequest) -> Result<DeriveOutcome, DeriveError> {
            self.requests.lock().unwrap().push(request.clone());
            let target = request
                .target_dir
                .clone()
                .unwrap_or_else(|| request.source_dir.join("organized").display().to_string());
            let blocked = !request.dry_run && !request.auto_approve;
            let executed = !request.dry_run && request.auto_approve;
            let phase = if blocked {
                PHASE_BLOCKED
            } else if executed {
                "executed"
            } else {
                "proposed"
            };
            Ok(DeriveOutcome {
                phase: phase.to_string(),
                executed,
                files_moved: if executed { 3 } else { 0 },
                error: None,
                result_hash: Some("r-1".to_string()),
                proposal: Some(DeriveProposal {
                    source_dir: request.source_dir.display().to_string(),
                    target_dir: target,
                    file_count: 3,
                    proposed_structure: json!({"cluster_0": ["a.md", "b.md"], "cluster_1": ["c.md"]}),
                    reversibility_score: 0.9,
                    proposal_hash: "abc123".to_string(),
                }),
                governance: Some(GovernanceSummary {
                    circuit_closed: !blocked,
                    events_detected: 1,
                    summary: None,
                    decision: blocked.then(|| "pause".to_string()),
                }),
                audit_log: (1..=7).map(|i| format!("step_{}", i)).collect(),
            })
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl DeriveEngine for FailingEngine {
        async fn derive_and_reorganize(&self, _request: DeriveRequest) -> Result<DeriveOutcome, DeriveError> {
            Err(DeriveError::Failed("clustering diverged".to_string()))
        }
    }

    fn setup(engine: Arc<dyn DeriveEngine>) -> (Arc<DeriveTools>, ToolRegistry, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("basics/notes")).unwrap();
        std::fs::create_dir_all(dir.path().join("threshold")).unwrap();
        let tools = Arc::new(DeriveTools::new(
            engine,
            dir.path().join("basics"),
            dir.path().join("threshold"),
        ));
        let mut registry = ToolRegistry::new();
        tools.register(&mut registry);
        (tools, registry, dir)
    }

    async fn call_json(registry: &ToolRegistry, name: &str, args: Value) -> Value {
        let out = registry.call(name, args, &CallContext::new()).await.unwrap();
        serde_json::from_str(&out.text).unwrap()
    }

    #[tokio::test]
    async fn test_registers_three_tools() {
        let (_tools, registry, _dir) = setup(Arc::new(GatedEngine::default()));
        assert_eq!(
            registry.names(),
            vec!["btb_derive_governed", "btb_derive_approve", "btb_derive_status"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_is_not_parked() {
        let engine = Arc::new(GatedEngine::default());
        let (tools, registry, _dir) = setup(engine.clone());

        let response = call_json(&registry, "btb_derive_governed", json!({"source_dir": "notes"})).await;
        assert_eq!(response["phase"], "proposed");
        assert_eq!(response["proposal"]["proposal_hash"], "abc123");
        assert_eq!(response["audit_entries"], 7);
        assert_eq!(
            response["audit_summary"],
            json!(["step_3", "step_4", "step_5", "step_6", "step_7"])
        );
        assert!(response.get("approval_required").is_none());
        assert_eq!(tools.pending_count().await, 0);

        let seen = engine.requests.lock().unwrap();
        assert!(seen[0].source_dir.ends_with("basics/notes"));
        assert!(seen[0].dry_run);
        assert_eq!(seen[0].config_path, None);
    }

    #[tokio::test]
    async fn test_blocked_derive_waits_for_approval() {
        let engine = Arc::new(GatedEngine::default());
        let (tools, registry, _dir) = setup(engine.clone());

        let response = call_json(
            &registry,
            "btb_derive_governed",
            json!({"source_dir": "notes", "dry_run": false, "target_dir": "sorted"}),
        )
        .await;
        assert_eq!(response["phase"], PHASE_BLOCKED);
        assert_eq!(response["approval_required"], true);
        assert!(
            response["approval_instruction"]
                .as_str()
                .unwrap()
                .contains("btb_derive_approve('abc123')")
        );
        assert_eq!(response["governance"]["decision"], "pause");
        assert_eq!(tools.pending_count().await, 1);

        let status = call_json(&registry, "btb_derive_status", json!({})).await;
        assert_eq!(status["pending_count"], 1);
        assert_eq!(status["proposals"][0]["proposal_hash"], "abc123");
        assert_eq!(status["proposals"][0]["target_dir"], "sorted");

        let approved = call_json(
            &registry,
            "btb_derive_approve",
            json!({"proposal_hash": "abc123", "approver_id": "alice"}),
        )
        .await;
        assert_eq!(approved["approved_by"], "alice");
        assert_eq!(approved["executed"], true);
        assert_eq!(approved["files_moved"], 3);
        assert_eq!(approved["final_target"], "sorted");
        assert_eq!(tools.pending_count().await, 0);

        let last = engine.requests.lock().unwrap().last().cloned().unwrap();
        assert!(!last.dry_run);
        assert!(last.auto_approve);
    }

    #[tokio::test]
    async fn test_auto_approve_is_not_parked() {
        let (tools, registry, _dir) = setup(Arc::new(GatedEngine::default()));
        let response = call_json(
            &registry,
            "btb_derive_governed",
            json!({"source_dir": "notes", "dry_run": false, "auto_approve": true}),
        )
        .await;
        assert_eq!(response["executed"], true);
        assert_eq!(tools.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_approve_unknown_hash_lists_pending() {
        let (_tools, registry, _dir) = setup(Arc::new(GatedEngine::default()));
        call_json(
            &registry,
            "btb_derive_governed",
            json!({"source_dir": "notes", "dry_run": false}),
        )
        .await;

        let response = call_json(&registry, "btb_derive_approve", json!({"proposal_hash": "nope"})).await;
        assert_eq!(response["error"], "No pending proposal with hash: nope");
        assert_eq!(response["pending_count"], 1);
        assert_eq!(response["available_hashes"], json!(["abc123"]));
        assert!(response["suggestion"].as_str().unwrap().contains("dry_run=False"));
    }

    #[tokio::test]
    async fn test_default_approver() {
        let (_tools, registry, _dir) = setup(Arc::new(GatedEngine::default()));
        call_json(
            &registry,
            "btb_derive_governed",
            json!({"source_dir": "notes", "dry_run": false}),
        )
        .await;
        let approved = call_json(&registry, "btb_derive_approve", json!({"proposal_hash": "abc123"})).await;
        assert_eq!(approved["approved_by"], DEFAULT_APPROVER);
    }

    #[tokio::test]
    async fn test_missing_source_is_blocked() {
        let (_tools, registry, _dir) = setup(Arc::new(GatedEngine::default()));
        let response = call_json(&registry, "btb_derive_governed", json!({"source_dir": "ghost"})).await;
        assert_eq!(response["phase"], PHASE_BLOCKED);
        assert!(
            response["error"]
                .as_str()
                .unwrap()
                .starts_with("Source directory does not exist")
        );
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported_as_blocked() {
        let (_tools, registry, _dir) = setup(Arc::new(FailingEngine));
        let response = call_json(&registry, "btb_derive_governed", json!({"source_dir": "notes"})).await;
        assert_eq!(response["phase"], PHASE_BLOCKED);
        assert_eq!(response["error"], "Derive operation failed: clustering diverged");
    }

    #[tokio::test]
    async fn test_unavailable_engine() {
        let (_tools, registry, _dir) = setup(Arc::new(UnavailableEngine));
        let response = call_json(&registry, "btb_derive_governed", json!({"source_dir": "notes"})).await;
        assert_eq!(response["error"], "Governed derive not available");
        assert_eq!(response["phase"], PHASE_BLOCKED);

        let response = call_json(&registry, "btb_derive_approve", json!({"proposal_hash": "x"})).await;
        assert_eq!(response["error"], "Governed derive not available");
    }

    #[tokio::test]
    async fn test_status_when_empty() {
        let (_tools, registry, _dir) = setup(Arc::new(UnavailableEngine));
        let status = call_json(&registry, "btb_derive_status", json!({})).await;
        assert_eq!(status["pending_count"], 0);
        assert_eq!(status["message"], "No pending derive operations");
    }

    #[tokio::test]
    async fn test_missing_source_dir_argument() {
        let (_tools, registry, _dir) = setup(Arc::new(GatedEngine::default()));
        let err = registry
            .call("btb_derive_governed", json!({}), &CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_detection_config_is_passed_when_present() {
        let engine = Arc::new(GatedEngine::default());
        let (_tools, registry, dir) = setup(engine.clone());
        let config = dir.path().join("threshold/detection/configs");
        std::fs::create_dir_all(&config).unwrap();
        std::fs::write(config.join("default.yaml"), "thresholds: {}\n").unwrap();

        call_json(&registry, "btb_derive_governed", json!({"source_dir": "notes"})).await;
        let seen = engine.requests.lock().unwrap();
        assert!(seen[0].config_path.as_ref().unwrap().ends_with("default.yaml"));
    }
}
