//! Turn orchestration.
//!
//! One turn: open providers, resolve pending decisions, stream one model
//! invocation to the caller, release providers. Release runs on every exit
//! path, including cancellation, errors and panics inside the turn.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use toolgate_mcp::{open_all, process_tool_calls, ConnectionSet, Connector, ProviderMap};
use toolgate_protocol::{FinishReason, Message, UiStreamEvent, UiStreamWriter};
use tracing::{debug, error, info, warn};

use crate::model::{ModelBackend, ModelEvent, ModelRequest};

/// Error text shown when the turn fails before any output was streamed.
pub const GENERIC_FAILURE: &str = "An error occurred while processing your request.";

/// Everything one turn needs. Nothing here outlives the turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub request_id: String,
    pub messages: Vec<Message>,
    pub providers: ProviderMap,
    pub model: String,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model finished on its own.
    Finished,
    /// The tool step cap was reached and the model stream was abandoned.
    StepLimit,
    /// The caller went away or the server is shutting down.
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub providers_opened: Vec<String>,
    pub providers_closed: Vec<String>,
    pub tool_steps: usize,
    pub finish_reason: Option<FinishReason>,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Default)]
struct TurnProgress {
    tool_steps: usize,
    finish_reason: Option<FinishReason>,
}

pub struct TurnOrchestrator {
    connector: Arc<dyn Connector>,
    model: Arc<dyn ModelBackend>,
    max_tool_steps: usize,
}

impl TurnOrchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        model: Arc<dyn ModelBackend>,
        max_tool_steps: usize,
    ) -> Self {
        Self {
            connector,
            model,
            max_tool_steps,
        }
    }

    pub fn max_tool_steps(&self) -> usize {
        self.max_tool_steps
    }

    /// Run one turn to completion, writing UI events to `writer`.
    pub async fn run(
        &self,
        request: TurnRequest,
        writer: UiStreamWriter,
        cancel: CancellationToken,
    ) -> TurnSummary {
        let connections = open_all(self.connector.as_ref(), &request.providers).await;
        let providers_opened = connections.names();
        info!(
            providers = ?providers_opened,
            configured = request.providers.len(),
            "Providers opened"
        );

        let mut progress = TurnProgress::default();
        let result = AssertUnwindSafe(self.drive(
            request,
            &connections,
            &writer,
            &cancel,
            &mut progress,
        ))
        .catch_unwind()
        .await;

        let providers_closed = connections.close_all().await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(%reason, "Turn panicked");
                if !writer.has_content() {
                    writer
                        .write(UiStreamEvent::Error {
                            error_text: GENERIC_FAILURE.to_string(),
                        })
                        .await;
                }
                TurnOutcome::Failed(reason)
            }
        };

        TurnSummary {
            providers_opened,
            providers_closed,
            tool_steps: progress.tool_steps,
            finish_reason: progress.finish_reason,
            outcome,
        }
    }

    async fn drive(
        &self,
        request: TurnRequest,
        connections: &ConnectionSet,
        writer: &UiStreamWriter,
        cancel: &CancellationToken,
        progress: &mut TurnProgress,
    ) -> TurnOutcome {
        let TurnRequest {
            request_id,
            messages,
            model,
            system_prompt,
            api_key,
            ..
        } = request;

        let message_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
        if !writer
            .write(UiStreamEvent::Start {
                message_id: Some(message_id),
            })
            .await
        {
            return TurnOutcome::Cancelled;
        }

        let tools = connections.merge_catalog();
        debug!(tools = tools.len(), "Merged tool catalog");

        // Without providers there is nothing to dispatch to; decisions stay
        // pending for a later turn that opens them. Dispatches already issued
        // here run to completion even if the caller cancels meanwhile.
        let messages = if tools.is_empty() {
            messages
        } else {
            process_tool_calls(messages, connections, writer).await
        };
        if cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }

        let model_request = ModelRequest {
            model,
            system: system_prompt,
            messages,
            tools,
            max_steps: self.max_tool_steps,
            api_key,
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TurnOutcome::Cancelled,
            result = self.model.stream(model_request) => match result {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(%request_id, error = %e, "Model invocation failed");
                    return fail(writer, e.to_string()).await;
                }
            },
        };

        let mut step_open = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Turn cancelled while streaming");
                    return TurnOutcome::Cancelled;
                }
                next = stream.next() => next,
            };

            let event = match next {
                None => break,
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!(%request_id, error = %e, "Model stream failed");
                    return fail(writer, e.to_string()).await;
                }
            };

            let ui_event = match event {
                ModelEvent::StepStart => {
                    step_open = true;
                    UiStreamEvent::StartStep
                }
                ModelEvent::TextStart { id } => UiStreamEvent::TextStart { id },
                ModelEvent::TextDelta { id, delta } => UiStreamEvent::TextDelta { id, delta },
                ModelEvent::TextEnd { id } => UiStreamEvent::TextEnd { id },
                ModelEvent::ReasoningStart { id } => UiStreamEvent::ReasoningStart { id },
                ModelEvent::ReasoningDelta { id, delta } => {
                    UiStreamEvent::ReasoningDelta { id, delta }
                }
                ModelEvent::ReasoningEnd { id } => UiStreamEvent::ReasoningEnd { id },
                ModelEvent::ToolCall {
                    call_id,
                    tool_name,
                    input,
                } => {
                    info!(tool_call_id = %call_id, tool = %tool_name, "Tool call awaiting approval");
                    UiStreamEvent::ToolInputAvailable {
                        tool_call_id: call_id,
                        tool_name,
                        input,
                        dynamic: true,
                    }
                }
                ModelEvent::StepFinish { reason } => {
                    step_open = false;
                    if !writer.write(UiStreamEvent::FinishStep).await {
                        return TurnOutcome::Cancelled;
                    }
                    if reason == FinishReason::ToolCalls {
                        progress.tool_steps += 1;
                        if progress.tool_steps >= self.max_tool_steps {
                            info!(steps = progress.tool_steps, "Tool step limit reached");
                            progress.finish_reason = Some(FinishReason::ToolCalls);
                            writer
                                .write(UiStreamEvent::Finish {
                                    finish_reason: Some(FinishReason::ToolCalls),
                                })
                                .await;
                            return TurnOutcome::StepLimit;
                        }
                    }
                    continue;
                }
                ModelEvent::Finish { reason } => {
                    progress.finish_reason = Some(reason);
                    if step_open {
                        writer.write(UiStreamEvent::FinishStep).await;
                    }
                    writer
                        .write(UiStreamEvent::Finish {
                            finish_reason: Some(reason),
                        })
                        .await;
                    return TurnOutcome::Finished;
                }
            };

            if !writer.write(ui_event).await {
                return TurnOutcome::Cancelled;
            }
        }

        debug!("Model stream ended without a finish event");
        if step_open {
            writer.write(UiStreamEvent::FinishStep).await;
        }
        writer
            .write(UiStreamEvent::Finish {
                finish_reason: None,
            })
            .await;
        TurnOutcome::Finished
    }
}

/// Report a model failure. The error reaches the caller only if nothing has
/// been streamed yet; otherwise the stream simply ends.
async fn fail(writer: &UiStreamWriter, message: String) -> TurnOutcome {
    if !writer.has_content() {
        writer
            .write(UiStreamEvent::Error {
                error_text: message.clone(),
            })
            .await;
    }
    TurnOutcome::Failed(message)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
