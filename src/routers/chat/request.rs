use serde::{Deserialize, Serialize};
use toolgate_mcp::McpConfig;
use toolgate_protocol::Message;
use validator::Validate;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "messages must not be empty"))]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub mcp_config: Option<McpConfig>,

    #[serde(default)]
    pub api_keys: Option<ApiKeys>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Keys supplied by the caller for this turn only.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeys {
    #[serde(default)]
    pub ai_gateway: Option<String>,
    #[serde(default)]
    pub openai: Option<String>,
}

impl ApiKeys {
    /// First non-blank key, gateway key preferred.
    pub fn resolve(&self) -> Option<String> {
        [&self.ai_gateway, &self.openai]
            .into_iter()
            .flatten()
            .find(|key| !key.trim().is_empty())
            .cloned()
    }
}

/// Body of `POST /api/mcp/status`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[serde(default)]
    pub mcp_config: McpConfig,
}
