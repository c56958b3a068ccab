mod app;
mod config;
mod models;
mod providers;
mod services;
mod ui;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use app::ChatShell;
use providers::ScriptedTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let transport = Arc::new(ScriptedTransport::new().with_token_delay(config::TOKEN_DELAY));
    ChatShell::new(transport).run().await
}
