//! OpenAI-compatible streaming chat completions backend.
//!
//! One HTTP call is one step. Tools are advertised as `function` tools; when
//! the upstream model calls them the step ends with those calls and nothing
//! is executed here.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use toolgate_mcp::ToolCatalog;
use toolgate_protocol::{FinishReason, Message, Part, Role, ToolCallPart};
use tracing::{debug, warn};

use super::{ModelBackend, ModelError, ModelEvent, ModelEventStream, ModelRequest};

/// Channel buffer size for parsed model events.
const EVENT_CHANNEL_SIZE: usize = 128;

/// Maximum SSE buffer size (1 MB) before a frame delimiter must appear.
const MAX_SSE_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ModelError::Request(format!("build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatibleBackend {
    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream, ModelError> {
        let api_key = request
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .ok_or_else(|| ModelError::Request("no API key configured".to_string()))?;

        let body = build_request_body(&request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            max_steps = request.max_steps,
            "Sending model request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        tokio::spawn(async move {
            if let Err(e) = consume_upstream_stream(response, &tx).await {
                warn!(error = %e, "Model stream failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

// ============================================================================
// Request building
// ============================================================================

pub fn build_request_body(request: &ModelRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": convert_messages(request.system.as_deref(), &request.messages),
        "stream": true,
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(convert_tools(&request.tools));
    }
    body
}

/// Tools as `function` tools. They carry no executor.
fn convert_tools(tools: &ToolCatalog) -> Vec<Value> {
    tools
        .values()
        .map(|entry| {
            json!({
                "type": "function",
                "function": {
                    "name": entry.namespaced_name(),
                    "description": entry.description.clone().unwrap_or_default(),
                    "parameters": entry.parameters,
                }
            })
        })
        .collect()
}

/// Convert the transcript to chat completion messages.
///
/// Tool calls without a result (still awaiting a decision) are left out so
/// the upstream never sees a call it has no answer for.
pub fn convert_messages(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        out.push(json!({"role": "system", "content": system}));
    }

    for message in messages {
        match message.role {
            Role::System => {
                let text = message.text();
                if !text.is_empty() {
                    out.push(json!({"role": "system", "content": text}));
                }
            }
            Role::User => out.push(user_message(message)),
            Role::Assistant => out.extend(assistant_messages(message)),
        }
    }
    out
}

fn user_message(message: &Message) -> Value {
    let images: Vec<Value> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::File {
                url, media_type, ..
            } if media_type.starts_with("image/") => {
                Some(json!({"type": "image_url", "image_url": {"url": url}}))
            }
            _ => None,
        })
        .collect();

    let text = message.text();
    if images.is_empty() {
        return json!({"role": "user", "content": text});
    }

    let mut content = Vec::with_capacity(images.len() + 1);
    if !text.is_empty() {
        content.push(json!({"type": "text", "text": text}));
    }
    content.extend(images);
    json!({"role": "user", "content": content})
}

fn assistant_messages(message: &Message) -> Vec<Value> {
    let mut out = Vec::new();
    for step in message.parts.split(|part| matches!(part, Part::StepStart)) {
        let text: String = step
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let calls: Vec<&ToolCallPart> = step
            .iter()
            .filter_map(Part::as_tool_call)
            .filter(|call| call.has_result())
            .collect();

        if text.is_empty() && calls.is_empty() {
            continue;
        }

        let mut assistant = json!({
            "role": "assistant",
            "content": if text.is_empty() { Value::Null } else { Value::String(text) },
        });
        if !calls.is_empty() {
            assistant["tool_calls"] = calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.tool_call_id,
                        "type": "function",
                        "function": {
                            "name": call.tool_name,
                            "arguments": call.input.to_string(),
                        }
                    })
                })
                .collect();
        }
        out.push(assistant);

        for call in calls {
            out.push(json!({
                "role": "tool",
                "tool_call_id": call.tool_call_id,
                "content": call.output_text().unwrap_or_default(),
            }));
        }
    }
    out
}

// ============================================================================
// Stream consumption
// ============================================================================

async fn consume_upstream_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<Result<ModelEvent, ModelError>>,
) -> Result<(), ModelError> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut processor = ChunkProcessor::new();

    if tx.send(Ok(ModelEvent::StepStart)).await.is_err() {
        return Ok(());
    }

    'outer: while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ModelError::Stream(format!("read error: {}", e)))?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() > MAX_SSE_BUFFER_SIZE {
            return Err(ModelError::Stream(format!(
                "SSE buffer exceeded maximum size ({} bytes)",
                MAX_SSE_BUFFER_SIZE
            )));
        }

        while let Some(frame_end) = find_frame_end(&buffer) {
            let frame: Vec<u8> = buffer.drain(..frame_end + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..frame.len() - 2]);

            let Some(data) = parse_sse_data(&frame) else {
                continue;
            };
            if data == "[DONE]" {
                break 'outer;
            }
            for event in processor.process(&data)? {
                if tx.send(Ok(event)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    for event in processor.finish() {
        if tx.send(Ok(event)).await.is_err() {
            break;
        }
    }
    Ok(())
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Extract the `data:` payload of an SSE frame. Comments and empty frames yield `None`.
fn parse_sse_data(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();
    if data_lines.is_empty() {
        return None;
    }
    Some(data_lines.join("\n"))
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Turns chat completion chunks into model events for one step.
#[derive(Debug, Default)]
pub(crate) struct ChunkProcessor {
    text_id: Option<String>,
    reasoning_id: Option<String>,
    blocks: usize,
    tool_calls: BTreeMap<u64, PartialToolCall>,
    finish_reason: Option<FinishReason>,
}

impl ChunkProcessor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn next_block_id(&mut self, prefix: &str) -> String {
        let id = format!("{}-{}", prefix, self.blocks);
        self.blocks += 1;
        id
    }

    pub(crate) fn process(&mut self, data: &str) -> Result<Vec<ModelEvent>, ModelError> {
        let chunk: Value =
            serde_json::from_str(data).map_err(|e| ModelError::Decode(e.to_string()))?;

        if let Some(error) = chunk.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| error.to_string());
            return Err(ModelError::Stream(message));
        }

        let mut events = Vec::new();
        let Some(choice) = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return Ok(events);
        };

        if let Some(delta) = choice.get("delta") {
            let reasoning = delta
                .get("reasoning_content")
                .or_else(|| delta.get("reasoning"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            if let Some(reasoning) = reasoning {
                let id = match &self.reasoning_id {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.next_block_id("reasoning");
                        self.reasoning_id = Some(id.clone());
                        events.push(ModelEvent::ReasoningStart { id: id.clone() });
                        id
                    }
                };
                events.push(ModelEvent::ReasoningDelta {
                    id,
                    delta: reasoning.to_string(),
                });
            }

            if let Some(content) = delta
                .get("content")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            {
                if let Some(id) = self.reasoning_id.take() {
                    events.push(ModelEvent::ReasoningEnd { id });
                }
                let id = match &self.text_id {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.next_block_id("text");
                        self.text_id = Some(id.clone());
                        events.push(ModelEvent::TextStart { id: id.clone() });
                        id
                    }
                };
                events.push(ModelEvent::TextDelta {
                    id,
                    delta: content.to_string(),
                });
            }

            if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
                for (position, call) in calls.iter().enumerate() {
                    let index = call
                        .get("index")
                        .and_then(Value::as_u64)
                        .unwrap_or(position as u64);
                    let entry = self.tool_calls.entry(index).or_default();
                    if let Some(id) = call.get("id").and_then(Value::as_str) {
                        entry.id = id.to_string();
                    }
                    if let Some(function) = call.get("function") {
                        if let Some(name) = function.get("name").and_then(Value::as_str) {
                            if entry.name.is_empty() {
                                entry.name = name.to_string();
                            }
                        }
                        if let Some(arguments) = function.get("arguments").and_then(Value::as_str)
                        {
                            entry.arguments.push_str(arguments);
                        }
                    }
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(map_finish_reason(reason));
        }

        Ok(events)
    }

    /// Close open blocks and emit the step's tool calls and finish events.
    pub(crate) fn finish(&mut self) -> Vec<ModelEvent> {
        let mut events = Vec::new();
        if let Some(id) = self.reasoning_id.take() {
            events.push(ModelEvent::ReasoningEnd { id });
        }
        if let Some(id) = self.text_id.take() {
            events.push(ModelEvent::TextEnd { id });
        }

        let calls = std::mem::take(&mut self.tool_calls);
        let has_calls = !calls.is_empty();
        for (_, call) in calls {
            let input = if call.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
                    warn!(tool = %call.name, "Tool call arguments are not valid JSON: {}", e);
                    Value::String(call.arguments.clone())
                })
            };
            let call_id = if call.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                call.id
            };
            events.push(ModelEvent::ToolCall {
                call_id,
                tool_name: call.name,
                input,
            });
        }

        let reason = if has_calls {
            FinishReason::ToolCalls
        } else {
            self.finish_reason.take().unwrap_or(FinishReason::Stop)
        };
        events.push(ModelEvent::StepFinish { reason });
        events.push(ModelEvent::Finish { reason });
        events
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "error" => FinishReason::Error,
        _ => FinishReason::Other,
    }
}
