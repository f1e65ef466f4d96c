//! Command-line and environment configuration.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{builder::RangedU64ValueParser, Args, Parser, Subcommand};

pub const DEFAULT_MODEL_BASE_URL: &str = "https://ai-gateway.vercel.sh/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-lite";
/// Sequential tool-call steps allowed within one model invocation.
pub const DEFAULT_MAX_TOOL_STEPS: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(author, version, about = "Human-in-the-loop MCP tool gateway for streaming chat")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP gateway (default)
    Serve,
    /// Probe every provider in a config file and print the status report
    Status {
        /// Path to a JSON or YAML file with an `mcpServers` mapping
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    #[arg(long, env = "TOOLGATE_HOST", default_value = "127.0.0.1", global = true)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3001, global = true)]
    pub port: u16,

    /// Base URL of the OpenAI-compatible model endpoint
    #[arg(
        long,
        env = "TOOLGATE_MODEL_BASE_URL",
        default_value = DEFAULT_MODEL_BASE_URL,
        global = true
    )]
    pub model_base_url: String,

    /// Model used when a request does not name one
    #[arg(long, default_value = DEFAULT_MODEL, global = true)]
    pub default_model: String,

    /// Server-wide model API key. Requests may supply their own.
    #[arg(long, env = "AI_GATEWAY_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Tool-calling steps the model may take in one turn (at least 1)
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_TOOL_STEPS,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..),
        global = true
    )]
    pub max_tool_steps: usize,

    #[arg(long, default_value_t = 30, global = true)]
    pub connect_timeout_secs: u64,

    #[arg(long, default_value_t = 15, global = true)]
    pub status_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
            connect_timeout_secs: 30,
            status_timeout_secs: 15,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.bind_addr().parse().ok()
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    /// Default filter when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["toolgate"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.server.max_tool_steps, 10);
        assert_eq!(cli.server.default_model, DEFAULT_MODEL);
        assert_eq!(cli.logging.log_level, "info");
        assert!(!cli.logging.log_json);
    }

    #[test]
    fn test_status_subcommand() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "status",
            "--config",
            "servers.yaml",
            "--status-timeout-secs",
            "3",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Status { config }) => assert_eq!(config, PathBuf::from("servers.yaml")),
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.server.status_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_max_tool_steps_must_be_positive() {
        assert!(Cli::try_parse_from(["toolgate", "--max-tool-steps", "0"]).is_err());
        let cli = Cli::try_parse_from(["toolgate", "--max-tool-steps", "1"]).unwrap();
        assert_eq!(cli.server.max_tool_steps, 1);
    }

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert!(config.socket_addr().is_some());
    }
}
