//! mail-summary-mcp-rs: email summary MCP server over stdio
//!
//! Process entry point: loads `.env`, initializes tracing on stderr, reads
//! configuration, and serves the summary tools over stdio.

use mail_summary_mcp_rs::config::ServerConfig;
use mail_summary_mcp_rs::server::MailSummaryServer;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing from environment, loads config, and serves the MCP
/// server over stdio. This process expects to be spawned by an MCP client
/// via `stdio` transport.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// MAIL_SUMMARY_DEFAULT_EMAIL=user@example.com \
/// MAIL_SUMMARY_WEBHOOK_URL=https://workflow.example.com/webhook/overview \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load_from_env()?;
    info!(
        accounts = config.accounts.len(),
        enabled = config.enabled,
        cache_enabled = config.cache_enabled,
        file_cache = config.cache_dir.is_some(),
        "starting summary server"
    );
    let service = MailSummaryServer::new(config)?.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
