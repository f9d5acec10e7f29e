//! RATNA: a Telegram relay bot.
//!
//! This is the application entry point. It loads configuration, initializes
//! tracing, starts the health server, connects to the Bot API, spawns the
//! relay workers and the update poller, and serves until a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratna::account::{AccountApi, MtprotoAccounts};
use ratna::bot::{Bot, BotSettings};
use ratna::config::{
    AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, POLL_RETRY_DELAY_SECS, SHUTDOWN_GRACE_SECS,
};
use ratna::http;
use ratna::queue::{RelayQueue, RelayWorker};
use ratna::relay::{Relay, RelayOptions};
use ratna::routes::create_router;
use ratna::state::AppState;
use ratna::store::Store;
use ratna::telegram::{wait_for_identity, BotApiClient, TelegramApi};

/// RATNA: a Telegram relay bot
#[derive(Parser, Debug)]
#[command(name = "ratna", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "ratna=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(filter: &str, format: &str) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // The default path may be absent when everything comes from the environment
    let required = args.config != DEFAULT_CONFIG_PATH;
    let config = AppConfig::load(&args.config, required)?;

    // Log filter priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    init_tracing(&log_filter, &config.logging.format);

    tracing::info!(
        owner_id = config.bot.owner_id,
        workers = config.queue.workers,
        staging_chat_id = config.staging_chat_id(),
        account_login = config.account.enabled(),
        "Loaded configuration"
    );

    // User store, restored from the last snapshot if there is one
    let store = Arc::new(Store::new(config.bot.owner_id, &config.bot.premium_ids));
    let state_file = config.storage.state_file.as_ref().map(PathBuf::from);
    if let Some(path) = &state_file {
        match store.load(path).await {
            Ok(users) => tracing::info!(path = %path.display(), users, "Restored state snapshot"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to restore state snapshot"),
        }
    }

    let queue = RelayQueue::new(config.queue.capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    http::setup_shutdown_handler(shutdown_tx);

    // Serve first so the health check answers while the bot connects
    let listener = http::bind(&config.http).await?;
    let app = create_router(AppState::new(Arc::clone(&store), queue.clone()));
    let server = tokio::spawn(http::start_server(listener, app, shutdown_rx.clone()));

    let api: Arc<dyn TelegramApi> = Arc::new(BotApiClient::new(&config.telegram)?);
    let mut identity_rx = shutdown_rx.clone();
    let me = wait_for_identity(
        api.as_ref(),
        Duration::from_secs(POLL_RETRY_DELAY_SECS),
        &mut identity_rx,
    )
    .await?;
    let Some(me) = me else {
        tracing::info!("Shutdown requested before Telegram was reachable");
        server.await??;
        return Ok(());
    };
    tracing::info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or_default(),
        "Connected to Telegram"
    );

    let accounts: Option<Arc<dyn AccountApi>> = config
        .account
        .enabled()
        .then(|| Arc::new(MtprotoAccounts::new(&config.account)) as Arc<dyn AccountApi>);

    let mut bot = Bot::new(
        Arc::clone(&api),
        Arc::clone(&store),
        queue.clone(),
        BotSettings::from_config(&config),
        shutdown_rx.clone(),
    );
    let mut relay = Relay::new(
        Arc::clone(&api),
        Arc::clone(&store),
        RelayOptions::from_config(&config),
    );
    if let Some(accounts) = &accounts {
        bot = bot.with_accounts(Arc::clone(accounts));
        relay = relay.with_accounts(Arc::clone(accounts));
    }
    let bot = Arc::new(bot);
    let relay = Arc::new(relay);
    bot.register_commands().await;

    let mut tasks = Vec::new();
    for id in 0..config.queue.workers {
        let worker = RelayWorker::new(
            id,
            queue.clone(),
            Arc::clone(&relay),
            Duration::from_millis(config.queue.task_delay_ms),
            Duration::from_secs(config.queue.progress_interval_seconds),
            shutdown_rx.clone(),
        );
        tasks.push(tokio::spawn(worker.run()));
    }
    tracing::info!(workers = config.queue.workers, "Spawned relay workers");

    tasks.push(tokio::spawn(Arc::clone(&bot).run()));

    if let Some(path) = state_file.clone() {
        tasks.push(tokio::spawn(Arc::clone(&store).run_snapshots(
            path,
            Duration::from_secs(config.storage.snapshot_interval_seconds),
            shutdown_rx.clone(),
        )));
    }

    server.await??;

    // Server is down; let the workers finish their current transfer
    queue.close();
    let drain = futures::future::join_all(tasks);
    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), drain)
        .await
        .is_err()
    {
        tracing::warn!("Background tasks did not stop in time");
    }

    if let Some(path) = &state_file {
        match store.save(path).await {
            Ok(()) => tracing::info!(path = %path.display(), "State snapshot saved"),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to save state snapshot"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
