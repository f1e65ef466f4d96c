//! Transport connector: one provider config in, one live connection out.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use rmcp::{service::RunningService, RoleClient};
use tracing::{debug, info, warn};

use super::config::{McpTransport, ProviderConfig, Tool, TransportKind};
use crate::{
    error::{McpError, McpResult},
    inventory::ToolCatalogEntry,
};

/// Default bound on one provider connect, handshake and tool listing included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client half of an rmcp session.
pub type McpClient = RunningService<RoleClient, ()>;

/// Live client, tagged by the transport it runs over.
pub enum ProviderClient {
    Stdio(McpClient),
    Streamable(McpClient),
    Sse(McpClient),
}

impl ProviderClient {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Streamable(_) => TransportKind::Http,
            Self::Sse(_) => TransportKind::Sse,
        }
    }

    pub(crate) fn session(&self) -> &McpClient {
        match self {
            Self::Stdio(client) | Self::Streamable(client) | Self::Sse(client) => client,
        }
    }

    /// Shut the session down, terminating the child process or HTTP stream.
    pub async fn close(self) -> McpResult<()> {
        let client = match self {
            Self::Stdio(client) | Self::Streamable(client) | Self::Sse(client) => client,
        };
        match client.cancel().await {
            Ok(reason) => {
                debug!(?reason, "MCP session closed");
                Ok(())
            }
            Err(e) => Err(McpError::Transport(format!("close session: {}", e))),
        }
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProviderClient").field(&self.kind()).finish()
    }
}

/// A live connection to one provider, owned by the turn that opened it.
#[derive(Debug)]
pub struct Connection {
    name: String,
    client: ProviderClient,
    tools: Vec<Tool>,
}

impl Connection {
    pub fn new(name: impl Into<String>, client: ProviderClient, tools: Vec<Tool>) -> Self {
        Self {
            name: name.into(),
            client,
            tools,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransportKind {
        self.client.kind()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn tool(&self, tool_name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name == tool_name)
    }

    pub fn client(&self) -> &ProviderClient {
        &self.client
    }

    pub fn catalog_entries(&self) -> impl Iterator<Item = ToolCatalogEntry> + '_ {
        self.tools
            .iter()
            .map(|tool| ToolCatalogEntry::from_provider_tool(&self.name, tool))
    }

    pub async fn close(self) -> McpResult<()> {
        self.client.close().await
    }
}

/// Opens connections to providers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to provider `name`, perform the handshake and list its tools.
    async fn connect(&self, name: &str, config: &ProviderConfig) -> McpResult<Connection>;
}

/// Connector speaking MCP over stdio, streamable HTTP and SSE.
#[derive(Debug, Clone)]
pub struct McpConnector {
    connect_timeout: Duration,
}

impl McpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn connect_with_retry(
        &self,
        name: &str,
        transport: &McpTransport,
    ) -> McpResult<ProviderClient> {
        if !transport.is_remote() {
            return connect_transport(name, transport).await;
        }

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(Some(self.connect_timeout))
            .build();

        backoff::future::retry(backoff, || async {
            match connect_transport(name, transport).await {
                Ok(client) => Ok(client),
                Err(e) if e.is_permanent() => {
                    debug!(provider = %name, "Permanent connect error, not retrying: {}", e);
                    Err(backoff::Error::permanent(e))
                }
                Err(e) => {
                    warn!(provider = %name, "Failed to connect, retrying: {}", e);
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
    }

    async fn connect_and_discover(
        &self,
        name: &str,
        transport: &McpTransport,
    ) -> McpResult<Connection> {
        let client = self.connect_with_retry(name, transport).await?;
        let listed = client.session().peer().list_all_tools().await;
        match listed {
            Ok(tools) => Ok(Connection::new(name, client, tools)),
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    debug!(provider = %name, "Close after failed discovery: {}", close_err);
                }
                Err(McpError::connection_failed(
                    name,
                    format!("list tools: {}", e),
                ))
            }
        }
    }
}

impl Default for McpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for McpConnector {
    async fn connect(&self, name: &str, config: &ProviderConfig) -> McpResult<Connection> {
        let transport = config.transport(name)?;
        let seconds = self.connect_timeout.as_secs();

        let connection =
            tokio::time::timeout(self.connect_timeout, self.connect_and_discover(name, &transport))
                .await
                .map_err(|_| McpError::Timeout {
                    operation: format!("connect to '{}'", name),
                    seconds,
                })??;

        info!(
            provider = %name,
            transport = %connection.kind(),
            tools = connection.tools().len(),
            "Connected to MCP server"
        );
        Ok(connection)
    }
}

fn build_http_client() -> McpResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| McpError::Transport(format!("build HTTP client: {}", e)))
}

async fn connect_transport(name: &str, transport: &McpTransport) -> McpResult<ProviderClient> {
    use rmcp::{
        transport::{
            sse_client::SseClientConfig,
            streamable_http_client::StreamableHttpClientTransportConfig, ConfigureCommandExt,
            SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
        },
        ServiceExt,
    };

    match transport {
        McpTransport::Stdio {
            command,
            args,
            envs,
        } => {
            let transport = TokioChildProcess::new(tokio::process::Command::new(command).configure(
                |cmd| {
                    cmd.args(args)
                        .envs(envs.iter())
                        .stderr(std::process::Stdio::inherit());
                },
            ))
            .map_err(|e| McpError::Transport(format!("create stdio transport: {}", e)))?;

            let client = ().serve(transport).await.map_err(|e| {
                McpError::connection_failed(name, format!("initialize stdio client: {}", e))
            })?;
            Ok(ProviderClient::Stdio(client))
        }

        McpTransport::Sse { url } => {
            let http_client = build_http_client()?;
            let sse_config = SseClientConfig {
                sse_endpoint: url.clone().into(),
                ..Default::default()
            };

            let transport = SseClientTransport::start_with_client(http_client, sse_config)
                .await
                .map_err(|e| {
                    McpError::connection_failed(name, format!("create SSE transport: {}", e))
                })?;

            let client = ().serve(transport).await.map_err(|e| {
                McpError::connection_failed(name, format!("initialize SSE client: {}", e))
            })?;
            Ok(ProviderClient::Sse(client))
        }

        McpTransport::Streamable { url } => {
            let http_client = build_http_client()?;
            let cfg = StreamableHttpClientTransportConfig::with_uri(url.as_str());
            let transport = StreamableHttpClientTransport::with_client(http_client, cfg);

            let client = ().serve(transport).await.map_err(|e| {
                McpError::connection_failed(name, format!("initialize streamable client: {}", e))
            })?;
            Ok(ProviderClient::Streamable(client))
        }
    }
}
