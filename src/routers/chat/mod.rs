//! Chat endpoint and the turn orchestrator behind it.

pub mod handler;
pub mod orchestrator;
pub mod request;

pub use handler::{chat, ui_stream_response};
pub use orchestrator::{TurnOrchestrator, TurnOutcome, TurnRequest, TurnSummary, GENERIC_FAILURE};
pub use request::{ApiKeys, ChatRequest, StatusRequest};
