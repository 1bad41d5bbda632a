//! Property tools MCP server - stdio entry point
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout. Logs go to stderr.
//!
//! # Configuration
//!
//! `DATABASE_PATH` selects the listings database (default `RealEstate.db`).
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "realestate": { "command": "realestate-mcp", "args": [] }
//!   }
//! }
//! ```

use realestate_assistant::{
    config::StoreConfig, mcp::McpServer, store::PropertyStore, tools::ToolRegistry,
};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realestate_assistant=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = PropertyStore::new(&StoreConfig::from_env());
    let path = store.path().display().to_string();
    match store.count().await {
        Ok(listings) => tracing::info!(%path, listings, "Opened property store"),
        Err(e) => tracing::warn!(%path, error = %e, "Property store is not readable"),
    }

    let mut server = McpServer::new(ToolRegistry::new(store));
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    Ok(())
}
