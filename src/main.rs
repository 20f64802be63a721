use std::sync::Arc;

use anyhow::Context as _;
use secrecy::ExposeSecret;
use serenity::all::{Client, Http};

use duck_pond::channels::{DiscordStore, DuckPondHandler, MessageStore, ProxyChannel, WebhookProxy};
use duck_pond::config::Config;
use duck_pond::pond::RelayEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    let token = config.bot_token.expose_secret();

    eprintln!("🦆 Duck pond v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Threshold: {}", config.relay.threshold);
    eprintln!("   Staff roles: {}", config.relay.staff_roles.len());
    eprintln!("   Webhook: {}\n", config.relay.webhook_id);

    // ── Collaborators ────────────────────────────────────────────────────
    // Both must be reachable before the handler starts receiving events.
    let http = Arc::new(Http::new(token));

    let discord_store = Arc::new(
        DiscordStore::connect(Arc::clone(&http))
            .await
            .context("failed to authenticate with Discord")?,
    );
    let store: Arc<dyn MessageStore> = discord_store.clone();
    let proxy: Arc<dyn ProxyChannel> = Arc::new(
        WebhookProxy::connect(Arc::clone(&http), config.relay.webhook_id)
            .await
            .context("failed to resolve the duck pond webhook")?,
    );

    let engine = Arc::new(RelayEngine::new(Arc::new(config.relay), store, proxy));

    // ── Gateway ──────────────────────────────────────────────────────────
    let mut client = Client::builder(token, DuckPondHandler::intents())
        .event_handler(DuckPondHandler::new(engine, discord_store))
        .await
        .context("failed to build Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.context("Discord gateway stopped")?;

    Ok(())
}
