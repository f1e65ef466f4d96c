//! Tool dispatcher: route a namespaced tool call to its provider.

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    connector::{Connection, ProviderClient},
    registry::ConnectionSet,
};
use crate::{
    error::{McpError, McpResult},
    inventory::QualifiedToolName,
};

/// Prefix of the output recorded when a dispatch fails.
pub const TOOL_ERROR_PREFIX: &str = "Error executing tool";

/// Runs approved tool calls.
///
/// Failures are folded into the returned text so the conversation can carry
/// on with the failure visible to the model and the user.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, arguments: Value) -> String;
}

/// Invoke `namespaced_name` on the provider that owns it and normalize the result to text.
pub async fn invoke(
    connections: &ConnectionSet,
    namespaced_name: &str,
    arguments: Value,
) -> McpResult<String> {
    let qualified = QualifiedToolName::parse(namespaced_name)
        .ok_or_else(|| McpError::MalformedToolName(namespaced_name.to_string()))?;
    let connection = connections
        .get(&qualified.provider)
        .ok_or_else(|| McpError::ProviderNotFound(qualified.provider.clone()))?;

    let arguments = prepare_arguments(connection, &qualified.tool_name, arguments)?;
    let request = CallToolRequestParam {
        name: qualified.tool_name.clone().into(),
        arguments,
    };

    debug!(
        provider = %qualified.provider,
        tool = %qualified.tool_name,
        transport = %connection.kind(),
        "Dispatching tool call"
    );

    let result = call_on(connection.client(), request).await?;
    let text = result_to_text(&result);
    if result.is_error.unwrap_or(false) {
        return Err(McpError::ToolExecution(text));
    }
    Ok(text)
}

async fn call_on(client: &ProviderClient, request: CallToolRequestParam) -> McpResult<CallToolResult> {
    let result = match client {
        ProviderClient::Stdio(session) => session.peer().call_tool(request).await,
        ProviderClient::Streamable(session) => session.peer().call_tool(request).await,
        ProviderClient::Sse(session) => session.peer().call_tool(request).await,
    };
    result.map_err(|e| McpError::ToolExecution(format!("MCP call failed: {}", e)))
}

fn prepare_arguments(
    connection: &Connection,
    tool_name: &str,
    arguments: Value,
) -> McpResult<Option<Map<String, Value>>> {
    let mut arguments = match arguments {
        Value::Null => return Ok(None),
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(McpError::InvalidArguments(format!(
                "expected an object, got {}",
                other
            )))
        }
    };

    if let Some(tool) = connection.tool(tool_name) {
        coerce_arg_types(&mut arguments, &tool.input_schema);
    }

    match arguments {
        Value::Object(map) => Ok(Some(map)),
        _ => Ok(None),
    }
}

/// Coerce argument types based on the tool's schema.
///
/// Models often emit numbers as strings, so numeric properties given as
/// parseable strings are converted.
pub fn coerce_arg_types(args: &mut Value, schema: &Map<String, Value>) {
    let Some(props) = schema.get("properties").and_then(|p| p.as_object()) else {
        return;
    };
    let Some(args_map) = args.as_object_mut() else {
        return;
    };

    for (key, val) in args_map.iter_mut() {
        let kind = props
            .get(key)
            .and_then(|s| s.get("type"))
            .and_then(|t| t.as_str());

        let Some(s) = val.as_str() else {
            continue;
        };
        match kind {
            Some("integer") => {
                if let Ok(num) = s.trim().parse::<i64>() {
                    *val = Value::from(num);
                }
            }
            Some("number") => {
                if let Ok(num) = s.trim().parse::<f64>() {
                    if let Some(num) = serde_json::Number::from_f64(num) {
                        *val = Value::Number(num);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Join text fragments with newlines, falling back to the serialized content
/// when the result carries no text.
pub fn result_to_text(result: &CallToolResult) -> String {
    let text: Vec<&str> = result
        .content
        .iter()
        .filter_map(|content| content.as_text())
        .map(|text| text.text.as_str())
        .collect();
    if !text.is_empty() {
        return text.join("\n");
    }

    let fallback = match (&result.structured_content, result.content.is_empty()) {
        (Some(structured), true) => serde_json::to_string(structured),
        _ => serde_json::to_string(&result.content),
    };
    fallback.unwrap_or_else(|e| {
        warn!("Failed to serialize tool result: {}", e);
        String::new()
    })
}

/// Render a dispatch error as tool output.
pub fn error_output(error: &McpError) -> String {
    format!("{}: {}", TOOL_ERROR_PREFIX, error)
}

#[async_trait]
impl ToolExecutor for ConnectionSet {
    async fn execute(&self, tool_name: &str, arguments: Value) -> String {
        match invoke(self, tool_name, arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "Tool execution failed");
                error_output(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rmcp::model::Content;
    use serde_json::json;

    use super::*;
    use crate::testing::{connect_in_memory, FakeProvider, FakeTool};

    async fn fs_connections() -> ConnectionSet {
        let fs = connect_in_memory(
            "fs",
            FakeProvider::new()
                .with_tool(FakeTool::text("readFile", "hello"))
                .with_tool(FakeTool::echo("echo"))
                .with_tool(FakeTool::failing("explode", "disk on fire"))
                .with_tool(FakeTool::content(
                    "snapshot",
                    vec![Content::image("AAAA", "image/png")],
                )),
        )
        .await
        .unwrap();
        ConnectionSet::from_connections([fs]).await
    }

    #[tokio::test]
    async fn test_invoke_resolves_namespaced_tool() {
        let set = fs_connections().await;
        let out = invoke(&set, "fs__readFile", json!({"path": "/tmp/a"}))
            .await
            .unwrap();
        assert_eq!(out, "hello");
        set.close_all().await;
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_provider() {
        let set = fs_connections().await;

        let err = invoke(&set, "readFile", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::MalformedToolName(ref n) if n == "readFile"));

        let err = invoke(&set, "git__status", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::ProviderNotFound(ref p) if p == "git"));

        set.close_all().await;
    }

    #[tokio::test]
    async fn test_executor_contains_failures() {
        let set = fs_connections().await;

        assert_eq!(
            set.execute("git__status", json!({})).await,
            "Error executing tool: MCP server not found: git"
        );
        assert_eq!(
            set.execute("fs__explode", json!({})).await,
            "Error executing tool: Tool execution failed: disk on fire"
        );

        set.close_all().await;
    }

    #[tokio::test]
    async fn test_non_text_result_is_serialized() {
        let set = fs_connections().await;
        let out = invoke(&set, "fs__snapshot", Value::Null).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["type"], "image");
        assert_eq!(parsed[0]["mimeType"], "image/png");
        set.close_all().await;
    }

    #[tokio::test]
    async fn test_arguments_are_coerced_before_dispatch() {
        let set = fs_connections().await;
        let out = invoke(&set, "fs__echo", json!({"count": "3", "label": "7"}))
            .await
            .unwrap();
        let echoed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(echoed, json!({"count": 3, "label": "7"}));
        set.close_all().await;
    }

    #[test]
    fn test_coerce_arg_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer"},
                "ratio": {"type": "number"},
                "name": {"type": "string"}
            }
        });
        let mut args = json!({"limit": "10", "ratio": "0.5", "name": "42", "extra": "1"});
        coerce_arg_types(&mut args, schema.as_object().unwrap());
        assert_eq!(
            args,
            json!({"limit": 10, "ratio": 0.5, "name": "42", "extra": "1"})
        );

        let mut bad = json!({"limit": "ten"});
        coerce_arg_types(&mut bad, schema.as_object().unwrap());
        assert_eq!(bad, json!({"limit": "ten"}));
    }

    #[test]
    fn test_result_text_joined_with_newlines() {
        let result = CallToolResult::success(vec![Content::text("a"), Content::text("b")]);
        assert_eq!(result_to_text(&result), "a\nb");
    }
}
