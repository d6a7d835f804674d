use std::sync::Arc;

use anyhow::Context as _;
use secrecy::ExposeSecret;

use bouncer::channels::DiscordHandler;
use bouncer::config::BouncerConfig;
use bouncer::gate::MessageGate;
use bouncer::judge::LlmJudge;
use bouncer::llm::{LlmConfig, create_provider};
use bouncer::store::{HistoryStore, InMemoryHistoryStore, LibSqlHistoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("a rustls crypto provider is already installed"))?;

    // A missing .env is fine; real env vars take precedence anyway.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BouncerConfig::from_env().context("invalid configuration")?;

    eprintln!("🚪 Bouncer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.model, config.llm_backend.name());
    eprintln!("   Guild: {}", config.guild.guild_id);
    eprintln!(
        "   Queue → Bar: {} → {}",
        config.guild.queue_channel_id, config.guild.admitted_channel_id
    );

    // ── History store ───────────────────────────────────────────────────
    let store: Arc<dyn HistoryStore> = if config.uses_in_memory_store() {
        eprintln!("   History: in-memory (not persisted)");
        Arc::new(InMemoryHistoryStore::new())
    } else {
        let store = LibSqlHistoryStore::open(&config.db_path)
            .await
            .with_context(|| format!("failed to open history store at {}", config.db_path.display()))?;
        eprintln!("   History: {}", config.db_path.display());
        Arc::new(store)
    };

    // ── Judgment ────────────────────────────────────────────────────────
    let llm = create_provider(&LlmConfig {
        backend: config.llm_backend.clone(),
        api_key: config.llm_api_key.clone(),
        model: config.model.clone(),
    })?;
    let mut judge = LlmJudge::new(llm);
    if let Some(persona) = &config.persona {
        judge = judge.with_personality(persona.clone());
    }
    let judge = Arc::new(judge);

    let gate = Arc::new(MessageGate::new(
        Arc::clone(&store),
        judge,
        config.guild,
        config.judge_timeout,
    ));

    // ── Discord ─────────────────────────────────────────────────────────
    let mut client = serenity::Client::builder(
        config.discord_token.expose_secret(),
        DiscordHandler::intents(),
    )
    .event_handler(DiscordHandler::new(gate, config.guild))
    .await
    .context("failed to build Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    let result = client.start().await;

    store.close().await?;
    result.context("Discord client stopped with an error")?;
    Ok(())
}
