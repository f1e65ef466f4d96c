//! Provider configuration.
//!
//! Configs arrive per request in the `mcpServers` shape used by desktop MCP
//! clients: a mapping from provider name to either a local command or a
//! remote endpoint.

use std::{collections::HashMap, fmt, path::Path};

pub use rmcp::model::Tool;
use serde::{Deserialize, Serialize};

use crate::{
    error::{McpError, McpResult},
    inventory::types::NAMESPACE_SEPARATOR,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct McpConfig {
    /// Providers in declaration order.
    #[serde(rename = "mcpServers", alias = "servers", default)]
    pub mcp_servers: ProviderMap,
}

impl McpConfig {
    /// Load from a YAML or JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> McpResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Parse YAML (JSON is valid YAML).
    pub fn from_yaml(content: &str) -> McpResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn is_empty(&self) -> bool {
        self.mcp_servers.is_empty()
    }
}

/// Provider name → config, keeping the order the caller declared them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMap(Vec<(String, ProviderConfig)>);

impl ProviderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, config: ProviderConfig) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = config,
            None => self.0.push((name, config)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, config)| config)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProviderConfig)> {
        self.0.iter().map(|(name, config)| (name.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, ProviderConfig)> for ProviderMap {
    fn from_iter<I: IntoIterator<Item = (N, ProviderConfig)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, config) in iter {
            map.insert(name, config);
        }
        map
    }
}

impl Serialize for ProviderMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, config) in &self.0 {
            map.serialize_entry(name, config)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProviderMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::{MapAccess, Visitor};

        struct ProviderMapVisitor;

        impl<'de> Visitor<'de> for ProviderMapVisitor {
            type Value = ProviderMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping from provider name to provider config")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(ProviderMap::new())
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut map = ProviderMap::new();
                while let Some((name, config)) = access.next_entry::<String, ProviderConfig>()? {
                    map.insert(name, config);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_any(ProviderMapVisitor)
    }
}

/// Transport kind named in a provider config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    #[serde(alias = "streamable", alias = "streamable-http", alias = "streamableHttp")]
    Http,
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
        })
    }
}

/// One provider entry as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default, alias = "executable", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, alias = "arguments", skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, alias = "environment", skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(default, alias = "endpoint", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(
        default,
        rename = "type",
        alias = "kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<TransportKind>,
}

impl ProviderConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    pub fn remote(url: impl Into<String>, kind: Option<TransportKind>) -> Self {
        Self {
            url: Some(url.into()),
            kind,
            ..Default::default()
        }
    }

    /// Resolve the concrete transport for provider `name`.
    ///
    /// A command always selects the local-process transport. A bare endpoint
    /// defaults to streamable HTTP.
    pub fn transport(&self, name: &str) -> McpResult<McpTransport> {
        validate_provider_name(name)?;

        if let Some(command) = self.command.as_deref().filter(|c| !c.trim().is_empty()) {
            return Ok(McpTransport::Stdio {
                command: command.to_string(),
                args: self.args.clone(),
                envs: self.env.clone(),
            });
        }

        let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Err(McpError::invalid_config(
                name,
                "either 'command' or 'url' must be set",
            ));
        };

        match self.kind.unwrap_or(TransportKind::Http) {
            TransportKind::Http => Ok(McpTransport::Streamable {
                url: url.to_string(),
            }),
            TransportKind::Sse => Ok(McpTransport::Sse {
                url: url.to_string(),
            }),
            TransportKind::Stdio => Err(McpError::invalid_config(
                name,
                "type 'stdio' requires 'command'",
            )),
        }
    }
}

/// Provider names key the namespace, so they cannot be empty or contain the separator.
pub fn validate_provider_name(name: &str) -> McpResult<()> {
    if name.trim().is_empty() {
        return Err(McpError::invalid_config(name, "provider name is empty"));
    }
    if name.contains(NAMESPACE_SEPARATOR) {
        return Err(McpError::invalid_config(
            name,
            format!("provider name must not contain '{}'", NAMESPACE_SEPARATOR),
        ));
    }
    Ok(())
}

/// Resolved transport for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpTransport {
    Stdio {
        command: String,
        args: Vec<String>,
        envs: HashMap<String, String>,
    },
    Streamable {
        url: String,
    },
    Sse {
        url: String,
    },
}

impl McpTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Streamable { .. } => TransportKind::Http,
            Self::Sse { .. } => TransportKind::Sse,
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Stdio { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_config_shape() {
        let json = r#"{
            "mcpServers": {
                "fs": {"command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]},
                "search": {"url": "https://search.example.com/mcp"},
                "legacy": {"url": "https://legacy.example.com/sse", "type": "sse"}
            }
        }"#;
        let config: McpConfig = serde_json::from_str(json).unwrap();

        let names: Vec<_> = config.mcp_servers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["fs", "search", "legacy"]);

        let fs = config.mcp_servers.get("fs").unwrap().transport("fs").unwrap();
        assert!(matches!(fs, McpTransport::Stdio { ref command, ref args, .. }
            if command == "npx" && args.len() == 3));

        let search = config.mcp_servers.get("search").unwrap();
        assert_eq!(search.transport("search").unwrap().kind(), TransportKind::Http);

        let legacy = config.mcp_servers.get("legacy").unwrap();
        assert_eq!(legacy.transport("legacy").unwrap().kind(), TransportKind::Sse);
    }

    #[test]
    fn test_abstract_field_aliases() {
        let json = r#"{
            "executable": "node",
            "arguments": ["server.js"],
            "environment": {"TOKEN": "x"}
        }"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.command.as_deref(), Some("node"));
        assert_eq!(config.args, vec!["server.js"]);
        assert_eq!(config.env.get("TOKEN").map(String::as_str), Some("x"));

        let remote: ProviderConfig =
            serde_json::from_str(r#"{"endpoint": "https://x", "kind": "sse"}"#).unwrap();
        assert_eq!(remote.transport("x").unwrap().kind(), TransportKind::Sse);
    }

    #[test]
    fn test_missing_transport_is_invalid() {
        let err = ProviderConfig::default().transport("empty").unwrap_err();
        assert!(matches!(err, McpError::InvalidConfig { ref provider, .. } if provider == "empty"));

        let err = ProviderConfig::remote("https://x", Some(TransportKind::Stdio))
            .transport("x")
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidConfig { .. }));
    }

    #[test]
    fn test_command_wins_over_url() {
        let config = ProviderConfig {
            command: Some("server".to_string()),
            url: Some("https://x".to_string()),
            ..Default::default()
        };
        assert_eq!(config.transport("p").unwrap().kind(), TransportKind::Stdio);
    }

    #[test]
    fn test_provider_name_rules() {
        let config = ProviderConfig::stdio("server", vec![]);
        assert!(config.transport("fs").is_ok());
        assert!(config.transport("").is_err());
        assert!(config.transport("my__fs").is_err());
        assert!(config.transport("my_fs").is_ok());
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
mcpServers:
  local:
    command: ./server
    env:
      DEBUG: "1"
  remote:
    url: http://localhost:8000/mcp
    type: http
"#;
        let config = McpConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.mcp_servers.len(), 2);
        assert_eq!(
            config.mcp_servers.get("remote").unwrap().kind,
            Some(TransportKind::Http)
        );
    }

    #[test]
    fn test_empty_config() {
        let config: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(config.is_empty());

        let config: McpConfig = serde_json::from_str(r#"{"mcpServers": {}}"#).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = ProviderMap::new();
        map.insert("a", ProviderConfig::stdio("one", vec![]));
        map.insert("b", ProviderConfig::stdio("two", vec![]));
        map.insert("a", ProviderConfig::stdio("three", vec![]));

        let entries: Vec<_> = map
            .iter()
            .map(|(n, c)| (n, c.command.as_deref().unwrap()))
            .collect();
        assert_eq!(entries, vec![("a", "three"), ("b", "two")]);
    }
}
