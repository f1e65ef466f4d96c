//! In-memory MCP providers for tests.
//!
//! A [`FakeProvider`] is a real rmcp server running over a `tokio::io::duplex`
//! pipe, so registry, dispatcher and gate code paths run unmodified without
//! spawning processes or binding sockets.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    ErrorData, RoleServer, ServerHandler, ServiceExt,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{
    core::{
        config::{McpTransport, ProviderConfig},
        connector::{Connection, Connector, ProviderClient},
    },
    error::{McpError, McpResult},
};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Echo,
    Fail(String),
    Content(Vec<Content>),
}

/// One tool exposed by a [`FakeProvider`].
#[derive(Debug, Clone)]
pub struct FakeTool {
    name: String,
    description: Option<String>,
    schema: Map<String, Value>,
    reply: Reply,
    delay: Option<Duration>,
}

impl FakeTool {
    fn new(name: impl Into<String>, reply: Reply) -> Self {
        let name = name.into();
        Self {
            description: Some(format!("Fake {} tool", name)),
            name,
            schema: default_schema(),
            reply,
            delay: None,
        }
    }

    /// Always answers with `text`.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, Reply::Text(text.into()))
    }

    /// Answers with its arguments serialized as JSON.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name, Reply::Echo).with_schema(json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer"},
                "label": {"type": "string"}
            }
        }))
    }

    /// Reports a tool-level error carrying `message`.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Reply::Fail(message.into()))
    }

    /// Answers with arbitrary content blocks.
    pub fn content(name: impl Into<String>, content: Vec<Content>) -> Self {
        Self::new(name, Reply::Content(content))
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn without_description(mut self) -> Self {
        self.description = None;
        self
    }

    /// Replace the input schema. Non-object values are ignored.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        if let Value::Object(map) = schema {
            self.schema = map;
        }
        self
    }

    /// Sleep before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn to_tool(&self) -> Tool {
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone().unwrap_or_default(),
            Arc::new(self.schema.clone()),
        );
        if self.description.is_none() {
            tool.description = None;
        }
        tool
    }
}

fn default_schema() -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), json!({}));
    schema
}

/// A recorded tool invocation: tool name and arguments.
pub type RecordedCall = (String, Value);

/// An rmcp server with scripted tools. Clones share the call log and the
/// session count.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    tools: Vec<FakeTool>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    sessions: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tool(mut self, tool: FakeTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Server sessions not yet torn down by their client.
    pub fn open_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl ServerHandler for FakeProvider {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(
            self.tools.iter().map(FakeTool::to_tool).collect(),
        ))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(tool) = self.tools.iter().find(|t| t.name == request.name) else {
            return Err(ErrorData::invalid_params(
                format!("unknown tool: {}", request.name),
                None,
            ));
        };

        let arguments = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((tool.name.clone(), arguments.clone()));

        if let Some(delay) = tool.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(match &tool.reply {
            Reply::Text(text) => CallToolResult::success(vec![Content::text(text.clone())]),
            Reply::Echo => CallToolResult::success(vec![Content::text(arguments.to_string())]),
            Reply::Fail(message) => CallToolResult::error(vec![Content::text(message.clone())]),
            Reply::Content(content) => CallToolResult::success(content.clone()),
        })
    }
}

/// Connect to `provider` over an in-memory pipe, presenting it as a stdio provider.
pub async fn connect_in_memory(name: &str, provider: FakeProvider) -> McpResult<Connection> {
    let transport = McpTransport::Stdio {
        command: "in-memory".to_string(),
        args: Vec::new(),
        envs: HashMap::new(),
    };
    connect_in_memory_as(name, &transport, provider).await
}

async fn connect_in_memory_as(
    name: &str,
    transport: &McpTransport,
    provider: FakeProvider,
) -> McpResult<Connection> {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let provider_name = name.to_string();
    let sessions = Arc::clone(&provider.sessions);
    sessions.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        match provider.serve(server_io).await {
            Ok(service) => {
                let reason = service.waiting().await;
                debug!(provider = %provider_name, ?reason, "In-memory provider stopped");
            }
            Err(e) => debug!(provider = %provider_name, "In-memory provider failed: {}", e),
        }
        sessions.fetch_sub(1, Ordering::SeqCst);
    });

    let session = ().serve(client_io).await.map_err(|e| {
        McpError::connection_failed(name, format!("initialize in-memory client: {}", e))
    })?;
    let tools = session
        .peer()
        .list_all_tools()
        .await
        .map_err(|e| McpError::connection_failed(name, format!("list tools: {}", e)))?;

    let client = match transport {
        McpTransport::Stdio { .. } => ProviderClient::Stdio(session),
        McpTransport::Streamable { .. } => ProviderClient::Streamable(session),
        McpTransport::Sse { .. } => ProviderClient::Sse(session),
    };
    Ok(Connection::new(name, client, tools))
}

/// [`Connector`] that serves registered names from in-memory providers.
///
/// Configs are still validated as the real connector would; valid configs for
/// unregistered names fail as unreachable.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    providers: HashMap<String, FakeProvider>,
    connects: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, provider: FakeProvider) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn provider(&self, name: &str) -> Option<&FakeProvider> {
        self.providers.get(name)
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, name: &str, config: &ProviderConfig) -> McpResult<Connection> {
        let transport = config.transport(name)?;
        let Some(provider) = self.providers.get(name).cloned() else {
            return Err(McpError::connection_failed(name, "endpoint unreachable"));
        };
        let connection = connect_in_memory_as(name, &transport, provider).await?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(connection)
    }
}
