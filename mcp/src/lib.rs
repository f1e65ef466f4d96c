//! Model Context Protocol (MCP) client side of toolgate.
//!
//! ## Modules
//!
//! - [`core`]: provider config, connector, per-turn registry, dispatcher, status probe
//! - [`inventory`]: merged, namespaced tool catalog and schema translation
//! - [`approval`]: the human-in-the-loop approval gate
//!
//! Every turn opens its own connections and closes them before it ends.
//! No connection or catalog outlives the turn that built it.

pub mod error;

pub mod approval;
pub mod core;
pub mod inventory;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use core::{
    invoke, open_all, probe, probe_all, Connection, ConnectionSet, Connector, McpConfig,
    McpConnector, McpTransport, ProviderClient, ProviderConfig, ProviderMap, ServerStatus,
    StatusReport, Tool, ToolExecutor, TransportKind,
};

pub use approval::{pending_decisions, process_tool_calls, PendingDecision};
pub use error::{McpError, McpResult};
pub use inventory::{QualifiedToolName, ToolCatalog, ToolCatalogEntry, NAMESPACE_SEPARATOR};
