use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::protocol::{JSONRPC_VERSION, JsonRpcId, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, error_codes, methods};
use super::transport::read_line_bounded;
use crate::config::BridgeConfig;
use crate::errors::{ResourceError, ToolError};
use crate::middleware::{CallContext, SpiralMiddleware};
use crate::resources::ResourceCatalog;
use crate::tools::{DeriveEngine, DeriveTools, SpiralJourneyTool, SpiralReflectTool, ToolHandler, ToolRegistry, ToolOutput};
use crate::witness::WitnessLogger;

/// MCP server over line-delimited JSON-RPC.
pub struct McpServer {
    name: String,
    max_line_bytes: usize,
    spiral: Arc<SpiralMiddleware>,
    tools: ToolRegistry,
    resources: ResourceCatalog,
}

impl McpServer {
    /// Build a server with the built-in tools and resources.
    pub fn new(config: &BridgeConfig, engine: Arc<dyn DeriveEngine>) -> Self {
        let spiral = Arc::new(SpiralMiddleware::new(WitnessLogger::new(config.journey_log_path())));

        let mut tools = ToolRegistry::new();
        Arc::new(DeriveTools::new(
            engine,
            config.basics_path.clone(),
            config.threshold_path.clone(),
        ))
        .register(&mut tools);

        let resources = ResourceCatalog::new(config, Arc::clone(&spiral));
        info!("Session {}", resources.session_id());

        let mut server = Self {
            name: config.server_name.clone(),
            max_line_bytes: config.max_line_bytes,
            spiral: Arc::clone(&spiral),
            tools,
            resources,
        };
        server.register_tool(Arc::new(SpiralReflectTool));
        server.register_tool(Arc::new(SpiralJourneyTool::new(spiral)));
        server
    }

    /// Add a tool; every call to it is phase-tracked like the built-ins.
    pub fn register_tool(&mut self, handler: Arc<dyn ToolHandler>) {
        self.tools.register(handler);
    }

    pub fn spiral(&self) -> &Arc<SpiralMiddleware> {
        &self.spiral
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Handle one raw line. `None` means no reply is sent.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id: Option<JsonRpcId> = value
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id,
                error_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        self.dispatch(request).await
    }

    /// Route a request to its method. Notifications are processed but never answered.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Dispatching method: {}", request.method);
        let notification = request.is_notification();
        let id = request.id;

        let response = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(id),
            methods::INITIALIZED => {
                info!("Client initialized");
                return None;
            }
            methods::PING => JsonRpcResponse::success(id, json!({})),
            methods::TOOLS_LIST => JsonRpcResponse::success(id, json!({"tools": self.tools.descriptors()})),
            methods::TOOLS_CALL => self.handle_tools_call(id, request.params).await,
            methods::RESOURCES_LIST => {
                JsonRpcResponse::success(id, json!({"resources": self.resources.list()}))
            }
            methods::RESOURCES_READ => self.handle_resources_read(id, request.params),
            other => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };

        if notification {
            debug!("Notification {} handled, no response sent", request.method);
            return None;
        }
        Some(response)
    }

    fn handle_initialize(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        info!("Handling initialize request");
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {"listChanged": false},
                    "resources": {"subscribe": false, "listChanged": false}
                },
                "serverInfo": {
                    "name": self.name,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tools_call(&self, id: Option<JsonRpcId>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "Missing params for tools/call");
        };
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "Missing 'name' parameter in tools/call",
            );
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let tools = &self.tools;
        let result = self
            .spiral
            .on_call_tool(name, CallContext::new(), |ctx| async move {
                tools.call(name, arguments, &ctx).await
            })
            .await;

        match result {
            Ok(output) => JsonRpcResponse::success(id, self.tool_result(&output)),
            Err(e) => {
                let code = match &e {
                    ToolError::NotFound { .. } => error_codes::TOOL_NOT_FOUND,
                    ToolError::InvalidArguments(_) => error_codes::INVALID_PARAMS,
                    ToolError::Failed(_) | ToolError::Other(_) => error_codes::INTERNAL_ERROR,
                };
                JsonRpcResponse::error(id, code, e.to_string())
            }
        }
    }

    fn tool_result(&self, output: &ToolOutput) -> Value {
        let snapshot = self.spiral.snapshot();
        json!({
            "content": [{"type": "text", "text": output.text}],
            "isError": output.is_error,
            "_meta": {
                "spiral_phase": snapshot.current_phase.as_str(),
                "tool_call_count": snapshot.call_count,
                "reflection_depth": snapshot.reflection_depth
            }
        })
    }

    fn handle_resources_read(&self, id: Option<JsonRpcId>, params: Option<Value>) -> JsonRpcResponse {
        let Some(uri) = params.as_ref().and_then(|p| p.get("uri")).and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "Missing 'uri' parameter in resources/read",
            );
        };

        match self.resources.read(uri) {
            Ok(contents) => JsonRpcResponse::success(id, json!({"contents": [contents.to_json()]})),
            Err(e @ ResourceError::NotFound { .. }) => {
                JsonRpcResponse::error(id, error_codes::RESOURCE_NOT_FOUND, e.to_string())
            }
            Err(e) => {
                error!("Resource {} failed: {}", uri, e);
                JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string())
            }
        }
    }

    /// Serve requests from `reader` until EOF, writing one response per line to `writer`.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        info!("{} ready, waiting for requests", self.name);

        loop {
            line.clear();

            let response = match read_line_bounded(&mut reader, &mut line, self.max_line_bytes).await {
                Ok(0) => {
                    info!("Input closed (EOF), shutting down");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    debug!("Received: {}", trimmed);
                    self.handle_line(trimmed).await
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    warn!("Rejected request: {}", e);
                    Some(JsonRpcResponse::error(
                        None,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
                Err(e) => return Err(e).context("Failed to read request"),
            };

            let Some(response) = response else {
                continue;
            };
            let response_json = serde_json::to_string(&response).context("Failed to serialize response")?;
            debug!("Sending: {}", response_json);

            writer.write_all(response_json.as_bytes()).await.context("Failed to write response")?;
            writer.write_all(b"\n").await.context("Failed to write response")?;
            writer.flush().await.context("Failed to flush response")?;
        }

        info!("{}", self.spiral.summary());
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }
}
