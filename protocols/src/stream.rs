//! UI message stream events and the writer used to emit them.
//!
//! Events are framed as server-sent events (`data: <json>\n\n`) and the stream
//! is terminated with `data: [DONE]`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Header announcing the UI message stream protocol version.
pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
pub const UI_MESSAGE_STREAM_VERSION: &str = "v1";

/// Final SSE frame of every response stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiStreamEvent {
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default)]
        dynamic: bool,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    FinishStep,
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
    },
    Error {
        error_text: String,
    },
}

impl UiStreamEvent {
    /// Whether the event carries response content, as opposed to framing.
    pub fn is_content(&self) -> bool {
        !matches!(
            self,
            Self::Start { .. } | Self::StartStep | Self::FinishStep | Self::Finish { .. }
        )
    }

    /// Format as one SSE frame.
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", json)
    }
}

/// Cloneable handle for pushing events onto a response stream.
///
/// Writes never fail loudly: once the receiving side is gone the writer turns
/// into a sink and `write` reports `false`.
#[derive(Debug, Clone)]
pub struct UiStreamWriter {
    tx: mpsc::Sender<UiStreamEvent>,
    content_written: Arc<AtomicBool>,
}

impl UiStreamWriter {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<UiStreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                tx,
                content_written: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    pub async fn write(&self, event: UiStreamEvent) -> bool {
        let is_content = event.is_content();
        match self.tx.send(event).await {
            Ok(()) => {
                if is_content {
                    self.content_written.store(true, Ordering::Release);
                }
                true
            }
            Err(_) => {
                debug!("UI stream receiver dropped, discarding event");
                false
            }
        }
    }

    /// Whether any content event has reached the stream.
    pub fn has_content(&self) -> bool {
        self.content_written.load(Ordering::Acquire)
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
