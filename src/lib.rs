pub mod config;
pub mod errors;
pub mod mcp;
pub mod middleware;
pub mod phase;
pub mod resources;
pub mod telemetry;
pub mod tools;
pub mod tracker;
pub mod witness;
