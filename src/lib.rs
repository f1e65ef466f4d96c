//! toolgate: a streaming chat gateway that exposes MCP provider tools to a
//! model and holds every proposed tool call for human approval.

pub mod config;
pub mod logging;
pub mod model;
pub mod routers;
pub mod server;

pub use config::{Cli, Command, ServerConfig};
pub use server::{build_app, AppState};
