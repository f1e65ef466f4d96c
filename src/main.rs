use anyhow::{Context, Result};
use clap::Parser;
use toolgate::{
    config::{Cli, Command},
    logging, server,
};
use toolgate_mcp::{probe_all, McpConfig, McpConnector};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.logging.log_level, cli.logging.log_json)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(version = env!("CARGO_PKG_VERSION"), "Starting toolgate");
            server::run(cli.server).await?;
        }
        Command::Status { config } => {
            let mcp_config = McpConfig::from_file(&config)
                .await
                .with_context(|| format!("failed to load {}", config.display()))?;
            let connector = McpConnector::new(cli.server.connect_timeout());
            let report = probe_all(&connector, &mcp_config, cli.server.status_timeout()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
