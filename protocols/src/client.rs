//! Client-side half of the approval state machine.
//!
//! The approving client records a decision by writing a sentinel onto an
//! `input-available` tool call and resending the transcript. While a response
//! streams in, [`MessageAccumulator`] folds the events into the assistant
//! message the client is displaying.

use std::collections::HashMap;

use thiserror::Error;

use crate::{
    messages::{Decision, Message, Part, Role, ToolCallState},
    stream::{FinishReason, UiStreamEvent},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("Tool call not found: {0}")]
    UnknownCall(String),

    #[error("Tool call {0} is not awaiting approval")]
    NotAwaitingApproval(String),
}

/// Record an approve/deny decision on the last message's tool call.
pub fn record_decision(
    messages: &mut [Message],
    call_id: &str,
    decision: Decision,
) -> Result<(), DecisionError> {
    let call = messages
        .last_mut()
        .and_then(|message| message.tool_call_mut(call_id))
        .ok_or_else(|| DecisionError::UnknownCall(call_id.to_string()))?;

    if !call.is_awaiting_approval() {
        return Err(DecisionError::NotAwaitingApproval(call_id.to_string()));
    }

    call.output = Some(decision.sentinel().into());
    call.state = ToolCallState::OutputAvailable;
    Ok(())
}

/// Whether any tool call in the transcript still waits for a human decision.
/// The client keeps its input disabled while this holds.
pub fn has_pending_approval(messages: &[Message]) -> bool {
    messages
        .iter()
        .flat_map(Message::tool_calls)
        .any(|call| call.is_awaiting_approval())
}

/// Folds UI stream events into an assistant message.
#[derive(Debug)]
pub struct MessageAccumulator {
    message: Message,
    open_blocks: HashMap<String, usize>,
    finish_reason: Option<FinishReason>,
    error: Option<String>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::continuing(Message::new("", Role::Assistant, Vec::new()))
    }

    /// Continue an existing assistant message (the response to a resent transcript
    /// whose last message is the assistant's).
    pub fn continuing(message: Message) -> Self {
        Self {
            message,
            open_blocks: HashMap::new(),
            finish_reason: None,
            error: None,
        }
    }

    pub fn apply(&mut self, event: &UiStreamEvent) {
        match event {
            UiStreamEvent::Start { message_id } => {
                if let Some(id) = message_id {
                    if self.message.id.is_empty() {
                        self.message.id = id.clone();
                    }
                }
            }
            UiStreamEvent::StartStep => self.message.parts.push(Part::StepStart),
            UiStreamEvent::TextStart { id } => {
                self.open_blocks.insert(id.clone(), self.message.parts.len());
                self.message.parts.push(Part::text(""));
            }
            UiStreamEvent::ReasoningStart { id } => {
                self.open_blocks.insert(id.clone(), self.message.parts.len());
                self.message.parts.push(Part::Reasoning {
                    text: String::new(),
                });
            }
            UiStreamEvent::TextDelta { id, delta } | UiStreamEvent::ReasoningDelta { id, delta } => {
                if let Some(index) = self.open_blocks.get(id) {
                    if let Some(Part::Text { text } | Part::Reasoning { text }) =
                        self.message.parts.get_mut(*index)
                    {
                        text.push_str(delta);
                    }
                }
            }
            UiStreamEvent::TextEnd { id } | UiStreamEvent::ReasoningEnd { id } => {
                self.open_blocks.remove(id);
            }
            UiStreamEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
                ..
            } => match self.message.tool_call_mut(tool_call_id) {
                Some(call) => call.input = input.clone(),
                None => self.message.parts.push(Part::DynamicTool(
                    crate::messages::ToolCallPart::awaiting_approval(
                        tool_call_id.clone(),
                        tool_name.clone(),
                        input.clone(),
                    ),
                )),
            },
            UiStreamEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            } => {
                if let Some(call) = self.message.tool_call_mut(tool_call_id) {
                    call.output = Some(output.clone());
                    call.state = ToolCallState::OutputAvailable;
                    call.resolved = true;
                }
            }
            UiStreamEvent::ToolOutputError {
                tool_call_id,
                error_text,
            } => {
                if let Some(call) = self.message.tool_call_mut(tool_call_id) {
                    call.error_text = Some(error_text.clone());
                    call.state = ToolCallState::OutputError;
                    call.resolved = true;
                }
            }
            UiStreamEvent::FinishStep => {}
            UiStreamEvent::Finish { finish_reason } => self.finish_reason = *finish_reason,
            UiStreamEvent::Error { error_text } => self.error = Some(error_text.clone()),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

impl Default for MessageAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
