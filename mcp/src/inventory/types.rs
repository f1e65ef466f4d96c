//! Core types for the merged tool catalog.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::config::Tool;

/// Separator between provider name and tool name in a namespaced tool name.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Unique tool identifier: `provider__tool`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedToolName {
    pub provider: String,
    pub tool_name: String,
}

impl QualifiedToolName {
    pub fn new(provider: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tool_name: tool_name.into(),
        }
    }

    /// Parse from `provider__tool`, splitting on the first separator.
    pub fn parse(s: &str) -> Option<Self> {
        let (provider, tool) = s.split_once(NAMESPACE_SEPARATOR)?;
        Some(Self::new(provider, tool))
    }
}

impl fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.provider, NAMESPACE_SEPARATOR, self.tool_name
        )
    }
}

/// A tool as advertised to the model.
///
/// Entries carry no executor. The model can only propose a call; running it
/// is left to the approval gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCatalogEntry {
    pub name: QualifiedToolName,
    pub description: Option<String>,
    /// Input schema already translated for the model.
    pub parameters: Value,
    /// Raw schema as the provider declared it, used for argument coercion.
    #[serde(skip)]
    pub input_schema: Map<String, Value>,
}

impl ToolCatalogEntry {
    pub fn from_provider_tool(provider: &str, tool: &Tool) -> Self {
        let input_schema = tool.input_schema.as_ref().clone();
        Self {
            name: QualifiedToolName::new(provider, tool.name.to_string()),
            description: tool.description.as_ref().map(|d| d.to_string()),
            parameters: super::schema::translate_input_schema(&input_schema),
            input_schema,
        }
    }

    pub fn namespaced_name(&self) -> String {
        self.name.to_string()
    }
}

/// Namespaced name → catalog entry.
pub type ToolCatalog = BTreeMap<String, ToolCatalogEntry>;
