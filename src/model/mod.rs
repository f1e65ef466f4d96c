//! Model capability.
//!
//! The model is an opaque streaming capability: it takes a transcript and a
//! tool catalog and yields [`ModelEvent`]s. Tools are advertised without an
//! executor, so the model can only propose calls. Proposed calls surface as
//! [`ModelEvent::ToolCall`] and end the step.

pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;
use toolgate_mcp::ToolCatalog;
use toolgate_protocol::{FinishReason, Message};

pub use openai::OpenAiCompatibleBackend;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Model stream failed: {0}")]
    Stream(String),

    #[error("Failed to decode model output: {0}")]
    Decode(String),
}

/// One model invocation.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: ToolCatalog,
    /// Upper bound on tool-call steps within this invocation.
    pub max_steps: usize,
    /// Per-request key. Falls back to the backend's configured key.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    StepStart,
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    ReasoningStart { id: String },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },
    ToolCall {
        call_id: String,
        tool_name: String,
        input: Value,
    },
    StepFinish { reason: FinishReason },
    Finish { reason: FinishReason },
}

pub type ModelEventStream = BoxStream<'static, Result<ModelEvent, ModelError>>;

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Start a streaming invocation. Errors returned here happen before any
    /// output exists; errors inside the stream happen mid-response.
    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream, ModelError>;
}
