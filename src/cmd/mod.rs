//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `config`  | `Config`         |
//! | `journey` | `Journey`        |

pub mod config;
pub mod journey;
pub mod serve;

pub use config::cmd_config;
pub use journey::cmd_journey;
pub use serve::cmd_serve;
