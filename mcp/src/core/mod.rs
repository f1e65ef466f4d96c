//! Core MCP client infrastructure.

pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod registry;
pub mod status;

pub use config::{
    validate_provider_name, McpConfig, McpTransport, ProviderConfig, ProviderMap, Tool,
    TransportKind,
};
pub use connector::{
    Connection, Connector, McpClient, McpConnector, ProviderClient, DEFAULT_CONNECT_TIMEOUT,
};
pub use dispatcher::{coerce_arg_types, invoke, result_to_text, ToolExecutor, TOOL_ERROR_PREFIX};
pub use registry::{open_all, ConnectionSet};
pub use status::{probe, probe_all, ServerStatus, StatusReport, ToolSummary, NO_DESCRIPTION};
