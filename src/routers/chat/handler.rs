use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use toolgate_protocol::{
    UiStreamEvent, UiStreamWriter, DONE_FRAME, UI_MESSAGE_STREAM_HEADER, UI_MESSAGE_STREAM_VERSION,
};
use tracing::{error, info, info_span, Instrument};
use validator::Validate;

use super::{orchestrator::TurnRequest, request::ChatRequest};
use crate::{
    routers::error::ApiError,
    server::AppState,
};

/// Buffered UI events per turn before the writer waits on the client.
const STREAM_BUFFER: usize = 256;

/// `POST /api/chat`: run one turn and stream it back as UI message events.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let request_id = format!("req_{}", uuid::Uuid::new_v4().simple());
    let turn = TurnRequest {
        request_id: request_id.clone(),
        messages: request.messages,
        providers: request
            .mcp_config
            .map(|config| config.mcp_servers)
            .unwrap_or_default(),
        model: request
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| state.config.default_model.clone()),
        system_prompt: request.system_prompt,
        api_key: request.api_keys.and_then(|keys| keys.resolve()),
    };

    let (writer, rx) = UiStreamWriter::channel(STREAM_BUFFER);
    let cancel = state.shutdown.child_token();
    let orchestrator = state.orchestrator.clone();
    let span = info_span!("turn", request_id = %request_id);

    tokio::spawn(
        async move {
            info!(
                model = %turn.model,
                messages = turn.messages.len(),
                providers = turn.providers.len(),
                "Turn started"
            );
            let summary = orchestrator.run(turn, writer, cancel).await;
            info!(
                outcome = ?summary.outcome,
                tool_steps = summary.tool_steps,
                finish_reason = ?summary.finish_reason,
                providers_closed = summary.providers_closed.len(),
                "Turn finished"
            );
        }
        .instrument(span),
    );

    Ok(ui_stream_response(rx))
}

/// Wrap a UI event channel as an SSE response terminated by `[DONE]`.
pub fn ui_stream_response(rx: mpsc::Receiver<UiStreamEvent>) -> Response {
    let frames = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(Bytes::from(event.to_sse_frame())))
        .chain(stream::once(async {
            Ok::<_, Infallible>(Bytes::from_static(DONE_FRAME.as_bytes()))
        }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(UI_MESSAGE_STREAM_HEADER, UI_MESSAGE_STREAM_VERSION)
        .body(Body::from_stream(frames))
        .unwrap_or_else(|e| {
            error!("Failed to build streaming response: {}", e);
            ApiError::ResponseBuild.into_response()
        })
}
