//! Stub model backends shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::json;
use toolgate::model::{ModelBackend, ModelError, ModelEvent, ModelEventStream, ModelRequest};
use toolgate_protocol::{FinishReason, UiStreamEvent};
use tokio::sync::mpsc;

/// Replays a fixed list of events and records every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    events: Vec<Result<ModelEvent, String>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedModel {
    pub fn new(events: Vec<ModelEvent>) -> Self {
        Self {
            events: events.into_iter().map(Ok).collect(),
            requests: Arc::default(),
        }
    }

    /// A single step answering with `text`.
    pub fn text(text: &str) -> Self {
        Self::new(vec![
            ModelEvent::StepStart,
            ModelEvent::TextStart { id: "t0".into() },
            ModelEvent::TextDelta {
                id: "t0".into(),
                delta: text.into(),
            },
            ModelEvent::TextEnd { id: "t0".into() },
            ModelEvent::StepFinish {
                reason: FinishReason::Stop,
            },
            ModelEvent::Finish {
                reason: FinishReason::Stop,
            },
        ])
    }

    /// Append a mid-stream failure.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.events.push(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream, ModelError> {
        self.requests.lock().unwrap().push(request);
        let events = self
            .events
            .clone()
            .into_iter()
            .map(|event| event.map_err(ModelError::Stream));
        Ok(stream::iter(events).boxed())
    }
}

/// Proposes a tool call in every step, forever.
#[derive(Clone, Default)]
pub struct LoopingModel;

#[async_trait]
impl ModelBackend for LoopingModel {
    async fn stream(&self, _request: ModelRequest) -> Result<ModelEventStream, ModelError> {
        let steps = (0..).flat_map(|step: usize| {
            [
                ModelEvent::StepStart,
                ModelEvent::ToolCall {
                    call_id: format!("call_{}", step),
                    tool_name: "fs__readFile".into(),
                    input: json!({"path": "/tmp/a"}),
                },
                ModelEvent::StepFinish {
                    reason: FinishReason::ToolCalls,
                },
            ]
        });
        Ok(stream::iter(steps.map(Ok)).boxed())
    }
}

/// Fails before producing a stream.
#[derive(Clone, Default)]
pub struct RejectingModel;

#[async_trait]
impl ModelBackend for RejectingModel {
    async fn stream(&self, _request: ModelRequest) -> Result<ModelEventStream, ModelError> {
        Err(ModelError::Upstream {
            status: 401,
            body: "invalid api key".into(),
        })
    }
}

/// Panics when invoked.
#[derive(Clone, Default)]
pub struct PanickingModel;

#[async_trait]
impl ModelBackend for PanickingModel {
    async fn stream(&self, _request: ModelRequest) -> Result<ModelEventStream, ModelError> {
        panic!("model backend exploded");
    }
}

/// Opens a step and then never produces another event.
#[derive(Clone, Default)]
pub struct StalledModel;

#[async_trait]
impl ModelBackend for StalledModel {
    async fn stream(&self, _request: ModelRequest) -> Result<ModelEventStream, ModelError> {
        Ok(stream::once(async { Ok(ModelEvent::StepStart) })
            .chain(stream::pending())
            .boxed())
    }
}

/// Drain everything written to a closed stream.
pub async fn collect_events(mut rx: mpsc::Receiver<UiStreamEvent>) -> Vec<UiStreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
