use axum::{extract::State, response::IntoResponse, Json};
use toolgate_mcp::probe_all;
use tracing::info;

use super::chat::StatusRequest;
use crate::server::AppState;

/// `POST /api/mcp/status`: connect to each provider, list its tools, disconnect.
pub async fn mcp_status(
    State(state): State<AppState>,
    Json(request): Json<StatusRequest>,
) -> impl IntoResponse {
    let report = probe_all(
        state.connector.as_ref(),
        &request.mcp_config,
        state.config.status_timeout(),
    )
    .await;
    info!(
        servers = report.servers.len(),
        total_tools = report.total_tools_count,
        "MCP status probed"
    );
    Json(report)
}
