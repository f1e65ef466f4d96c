//! Wire types shared by the toolgate crates.
//!
//! - [`messages`]: conversation transcript, tool-call parts, decision sentinels
//! - [`stream`]: UI message stream events and the response writer
//! - [`client`]: the approving client's half of the approval state machine

pub mod client;
pub mod messages;
pub mod stream;

pub use client::{has_pending_approval, record_decision, DecisionError, MessageAccumulator};
pub use messages::{
    Decision, Message, Part, Role, ToolCallPart, ToolCallState, APPROVAL_NO, APPROVAL_YES,
    DENIED_OUTPUT,
};
pub use stream::{
    FinishReason, UiStreamEvent, UiStreamWriter, DONE_FRAME, UI_MESSAGE_STREAM_HEADER,
    UI_MESSAGE_STREAM_VERSION,
};
