//! Approval gate: act on human decisions recorded in the transcript.
//!
//! Only the last message is inspected. A tool call moves out of
//! `input-available` when the client writes a decision sentinel into its
//! output. The gate runs approved calls, records the denial text for denied
//! ones and marks both `resolved` so no later pass touches them again.

use futures::future::join_all;
use serde_json::Value;
use toolgate_protocol::{
    Decision, Message, Part, ToolCallPart, UiStreamEvent, UiStreamWriter, DENIED_OUTPUT,
};
use tracing::{debug, info};

use crate::core::dispatcher::ToolExecutor;

/// A tool call in the last message carrying a decision the server has not acted on.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDecision {
    pub part_index: usize,
    pub call: ToolCallPart,
    pub decision: Decision,
}

/// Decisions awaiting action in `message`, in part order.
pub fn pending_decisions(message: &Message) -> Vec<PendingDecision> {
    message
        .parts
        .iter()
        .enumerate()
        .filter_map(|(part_index, part)| {
            let call = part.as_tool_call()?;
            let decision = call.pending_decision()?;
            Some(PendingDecision {
                part_index,
                call: call.clone(),
                decision,
            })
        })
        .collect()
}

/// Resolve every decided tool call in the last message.
///
/// Approved calls are dispatched concurrently. Each resolution is written to
/// `writer` as soon as it completes; the returned transcript keeps the
/// original part order and leaves every other message untouched. A
/// transcript with no pending decisions comes back unchanged.
pub async fn process_tool_calls(
    mut messages: Vec<Message>,
    executor: &dyn ToolExecutor,
    writer: &UiStreamWriter,
) -> Vec<Message> {
    let Some(last) = messages.last_mut() else {
        return messages;
    };

    let pending = pending_decisions(last);
    if pending.is_empty() {
        debug!("No pending tool decisions");
        return messages;
    }

    let resolutions = pending.into_iter().map(|pending| async move {
        let PendingDecision {
            part_index,
            call,
            decision,
        } = pending;
        info!(
            tool_call_id = %call.tool_call_id,
            tool = %call.tool_name,
            ?decision,
            "Applying tool decision"
        );

        let output = match decision {
            Decision::Approved => executor.execute(&call.tool_name, call.input.clone()).await,
            Decision::Denied => DENIED_OUTPUT.to_string(),
        };

        writer
            .write(UiStreamEvent::ToolOutputAvailable {
                tool_call_id: call.tool_call_id.clone(),
                output: Value::String(output.clone()),
            })
            .await;

        (part_index, call.resolved_with(output))
    });

    for (part_index, resolved) in join_all(resolutions).await {
        if let Some(slot) = last
            .parts
            .get_mut(part_index)
            .and_then(Part::as_tool_call_mut)
        {
            *slot = resolved;
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use serde_json::json;
    use toolgate_protocol::{Role, ToolCallState, APPROVAL_NO, APPROVAL_YES};

    use super::*;
    use crate::{
        core::registry::ConnectionSet,
        testing::{connect_in_memory, FakeProvider, FakeTool},
    };

    /// Executor that records calls and answers after an optional per-tool delay.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
        delays: Vec<(&'static str, Duration)>,
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(&self, tool_name: &str, arguments: Value) -> String {
            self.calls.lock().unwrap().push(tool_name.to_string());
            if let Some((_, delay)) = self.delays.iter().find(|(name, _)| *name == tool_name) {
                tokio::time::sleep(*delay).await;
            }
            format!("{} ran with {}", tool_name, arguments)
        }
    }

    fn decided(id: &str, tool: &str, sentinel: &str) -> Part {
        let mut call = ToolCallPart::awaiting_approval(id, tool, json!({"path": "/tmp/a"}));
        call.state = ToolCallState::OutputAvailable;
        call.output = Some(json!(sentinel));
        Part::DynamicTool(call)
    }

    fn transcript(parts: Vec<Part>) -> Vec<Message> {
        vec![
            Message::user_text("u1", "do things"),
            Message::new("a1", Role::Assistant, parts),
        ]
    }

    async fn drain(mut rx: tokio::sync::mpsc::Receiver<UiStreamEvent>) -> Vec<UiStreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_approved_call_is_executed() {
        let executor = RecordingExecutor::default();
        let (writer, rx) = UiStreamWriter::channel(16);

        let out = process_tool_calls(
            transcript(vec![decided("c1", "fs__readFile", APPROVAL_YES)]),
            &executor,
            &writer,
        )
        .await;

        let call = out[1].tool_call("c1").unwrap();
        assert_eq!(call.state, ToolCallState::OutputAvailable);
        assert!(call.resolved);
        assert_eq!(
            call.output,
            Some(json!("fs__readFile ran with {\"path\":\"/tmp/a\"}"))
        );
        assert_eq!(*executor.calls.lock().unwrap(), vec!["fs__readFile"]);

        let events = drain(rx).await;
        assert!(matches!(
            events.as_slice(),
            [UiStreamEvent::ToolOutputAvailable { tool_call_id, .. }] if tool_call_id == "c1"
        ));
    }

    #[tokio::test]
    async fn test_denied_call_is_not_executed() {
        let executor = RecordingExecutor::default();
        let (writer, rx) = UiStreamWriter::channel(16);

        let out = process_tool_calls(
            transcript(vec![decided("c1", "fs__readFile", APPROVAL_NO)]),
            &executor,
            &writer,
        )
        .await;

        let call = out[1].tool_call("c1").unwrap();
        assert_eq!(call.output, Some(json!(DENIED_OUTPUT)));
        assert!(call.resolved);
        assert!(executor.calls.lock().unwrap().is_empty());
        assert_eq!(
            drain(rx).await,
            vec![UiStreamEvent::ToolOutputAvailable {
                tool_call_id: "c1".to_string(),
                output: json!(DENIED_OUTPUT),
            }]
        );
    }

    #[tokio::test]
    async fn test_undecided_and_foreign_outputs_untouched() {
        let executor = RecordingExecutor::default();
        let (writer, rx) = UiStreamWriter::channel(16);

        let parts = vec![
            Part::text("thinking"),
            Part::DynamicTool(ToolCallPart::awaiting_approval("c1", "fs__a", json!({}))),
            decided("c2", "fs__b", "maybe later"),
            decided("c3", "fs__c", "yes, confirmed."),
        ];
        let input = transcript(parts);
        let out = process_tool_calls(input.clone(), &executor, &writer).await;

        assert_eq!(out, input);
        assert!(executor.calls.lock().unwrap().is_empty());
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_gate_is_idempotent() {
        let executor = RecordingExecutor::default();
        let (writer, _rx) = UiStreamWriter::channel(16);

        let once = process_tool_calls(
            transcript(vec![decided("c1", "fs__readFile", APPROVAL_YES)]),
            &executor,
            &writer,
        )
        .await;
        let twice = process_tool_calls(once.clone(), &executor, &writer).await;
        let thrice = process_tool_calls(twice.clone(), &executor, &writer).await;

        assert_eq!(once, twice);
        assert_eq!(twice, thrice);
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_static_tool_part_resolved_in_place() {
        let executor = RecordingExecutor::default();
        let (writer, rx) = UiStreamWriter::channel(16);

        let part: Part = serde_json::from_value(json!({
            "type": "tool-fs__readFile",
            "toolCallId": "c1",
            "state": "output-available",
            "input": {"path": "/tmp/a"},
            "output": APPROVAL_YES
        }))
        .unwrap();
        let out = process_tool_calls(transcript(vec![part]), &executor, &writer).await;

        assert!(matches!(&out[1].parts[0], Part::Tool(call) if call.resolved));
        assert_eq!(*executor.calls.lock().unwrap(), vec!["fs__readFile"]);
        assert_eq!(drain(rx).await.len(), 1);

        let wire = serde_json::to_value(&out[1].parts[0]).unwrap();
        assert_eq!(wire["type"], "tool-fs__readFile");
        assert_eq!(wire["resolved"], true);
    }

    #[tokio::test]
    async fn test_resolved_part_never_reprocessed() {
        // A tool whose result text happens to equal the approval sentinel.
        let call = ToolCallPart::awaiting_approval("c1", "fs__echo", json!({}))
            .resolved_with(APPROVAL_YES);
        let input = transcript(vec![Part::DynamicTool(call)]);

        let executor = RecordingExecutor::default();
        let (writer, _rx) = UiStreamWriter::channel(16);
        let out = process_tool_calls(input.clone(), &executor, &writer).await;

        assert_eq!(out, input);
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_last_message_is_inspected() {
        let executor = RecordingExecutor::default();
        let (writer, _rx) = UiStreamWriter::channel(16);

        let mut input = transcript(vec![decided("old", "fs__readFile", APPROVAL_YES)]);
        input.push(Message::user_text("u2", "thanks"));

        let out = process_tool_calls(input.clone(), &executor, &writer).await;
        assert_eq!(out, input);
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_updates_emitted_in_completion_order_parts_kept_in_order() {
        let executor = RecordingExecutor {
            delays: vec![("slow__tool", Duration::from_millis(200))],
            ..Default::default()
        };
        let (writer, rx) = UiStreamWriter::channel(16);

        let out = process_tool_calls(
            transcript(vec![
                decided("first", "slow__tool", APPROVAL_YES),
                decided("second", "fast__tool", APPROVAL_YES),
                decided("third", "fast__other", APPROVAL_NO),
            ]),
            &executor,
            &writer,
        )
        .await;

        let ids: Vec<_> = out[1].tool_calls().map(|c| c.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!(out[1].tool_calls().all(|c| c.resolved));

        let emitted: Vec<_> = drain(rx)
            .await
            .into_iter()
            .filter_map(|event| match event {
                UiStreamEvent::ToolOutputAvailable { tool_call_id, .. } => Some(tool_call_id),
                _ => None,
            })
            .collect();
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted.last().map(String::as_str), Some("first"));
    }

    #[tokio::test]
    async fn test_empty_transcript() {
        let executor = RecordingExecutor::default();
        let (writer, _rx) = UiStreamWriter::channel(1);
        assert!(process_tool_calls(Vec::new(), &executor, &writer)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_approved_call_reaches_stdio_provider() {
        let provider = FakeProvider::new().with_tool(FakeTool::text("readFile", "hello"));
        let connection = connect_in_memory("fs", provider.clone()).await.unwrap();
        let connections = ConnectionSet::from_connections([connection]).await;
        let (writer, _rx) = UiStreamWriter::channel(16);

        let out = process_tool_calls(
            transcript(vec![decided("c1", "fs__readFile", APPROVAL_YES)]),
            &connections,
            &writer,
        )
        .await;

        assert_eq!(out[1].tool_call("c1").unwrap().output, Some(json!("hello")));
        assert_eq!(
            provider.calls(),
            vec![("readFile".to_string(), json!({"path": "/tmp/a"}))]
        );
        connections.close_all().await;
    }

    #[tokio::test]
    async fn test_denied_call_never_reaches_provider() {
        let provider = FakeProvider::new().with_tool(FakeTool::text("readFile", "hello"));
        let connection = connect_in_memory("fs", provider.clone()).await.unwrap();
        let connections = ConnectionSet::from_connections([connection]).await;
        let (writer, _rx) = UiStreamWriter::channel(16);

        let out = process_tool_calls(
            transcript(vec![decided("c1", "fs__readFile", APPROVAL_NO)]),
            &connections,
            &writer,
        )
        .await;

        assert_eq!(
            out[1].tool_call("c1").unwrap().output,
            Some(json!(DENIED_OUTPUT))
        );
        assert_eq!(provider.call_count(), 0);
        connections.close_all().await;
    }

    #[tokio::test]
    async fn test_dispatch_error_resolves_with_message() {
        let connections = ConnectionSet::new();
        let (writer, _rx) = UiStreamWriter::channel(16);

        let out = process_tool_calls(
            transcript(vec![decided("c1", "readFile", APPROVAL_YES)]),
            &connections,
            &writer,
        )
        .await;

        let call = out[1].tool_call("c1").unwrap();
        assert_eq!(call.state, ToolCallState::OutputAvailable);
        assert_eq!(
            call.output,
            Some(json!("Error executing tool: Invalid tool name format: readFile"))
        );
    }
}
