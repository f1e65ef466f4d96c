//! Human-in-the-loop approval of tool calls.
//!
//! Tools never run on the model's say-so. The model proposes a call, the
//! client records the user's decision on it, and the gate acts on that
//! decision at the start of the next turn.

pub mod gate;

pub use gate::{pending_decisions, process_tool_calls, PendingDecision};
