//! Provider status probe: connect, list tools, disconnect.
//!
//! Lets a caller preview which tools each configured provider exposes
//! without running a conversational turn.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    config::{McpConfig, ProviderConfig},
    connector::Connector,
};
use crate::error::McpError;

/// Description reported for tools that do not declare one.
pub const NO_DESCRIPTION: &str = "No description";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub name: String,
    pub connected: bool,
    pub tools_count: usize,
    pub tools: Vec<ToolSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerStatus {
    fn failed(name: &str, error: &McpError) -> Self {
        Self {
            name: name.to_string(),
            connected: false,
            tools_count: 0,
            tools: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub servers: Vec<ServerStatus>,
    pub total_tools_count: usize,
}

/// Probe one provider within `timeout`.
pub async fn probe(
    connector: &dyn Connector,
    name: &str,
    config: &ProviderConfig,
    timeout: Duration,
) -> ServerStatus {
    let connection = match tokio::time::timeout(timeout, connector.connect(name, config)).await {
        Ok(Ok(connection)) => connection,
        Ok(Err(e)) => {
            warn!(provider = %name, error = %e, "Status probe failed");
            return ServerStatus::failed(name, &e);
        }
        Err(_) => {
            let e = McpError::Timeout {
                operation: format!("status probe of '{}'", name),
                seconds: timeout.as_secs(),
            };
            warn!(provider = %name, error = %e, "Status probe timed out");
            return ServerStatus::failed(name, &e);
        }
    };

    let tools: Vec<ToolSummary> = connection
        .tools()
        .iter()
        .map(|tool| ToolSummary {
            name: tool.name.to_string(),
            description: tool
                .description
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        })
        .collect();

    if let Err(e) = connection.close().await {
        debug!(provider = %name, "Close after status probe failed: {}", e);
    }

    ServerStatus {
        name: name.to_string(),
        connected: true,
        tools_count: tools.len(),
        tools,
        error: None,
    }
}

/// Probe every provider concurrently. Output follows config order.
pub async fn probe_all(
    connector: &dyn Connector,
    config: &McpConfig,
    timeout: Duration,
) -> StatusReport {
    let probes = config
        .mcp_servers
        .iter()
        .map(|(name, provider)| probe(connector, name, provider, timeout));
    let servers = join_all(probes).await;
    let total_tools_count = servers.iter().map(|s| s.tools_count).sum();
    StatusReport {
        servers,
        total_tools_count,
    }
}
