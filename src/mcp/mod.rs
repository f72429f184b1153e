//! MCP server surface.
//!
//! - `protocol`: JSON-RPC request/response types and error codes
//! - `transport`: bounded line reader for stdio framing
//! - `server`: method dispatch, tool calls through the spiral middleware, run loop

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcId, JsonRpcRequest, JsonRpcResponse, error_codes};
pub use server::McpServer;
