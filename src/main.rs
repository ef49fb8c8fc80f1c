use std::sync::Arc;
use std::time::Duration;

use wallwarden::classifier::{ClassifierClient, ModelBackend, ModelConfig, create_model};
use wallwarden::classifier::budget::RateBudget;
use wallwarden::config::EngineConfig;
use wallwarden::dispatch::ActionDispatcher;
use wallwarden::feed::http::{HttpFeed, HttpFeedConfig};
use wallwarden::feed::FeedSource;
use wallwarden::fetcher::WallFetcher;
use wallwarden::monitor::{MonitorDeps, MonitorRegistry};
use wallwarden::notify::{Notifier, WebhookNotifier};
use wallwarden::store::{AuditStore, LibSqlStore, SubscriptionStore};

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

    // Group API credential
    let cookie = std::env::var("WALLWARDEN_COOKIE").unwrap_or_else(|_| {
        eprintln!("Error: WALLWARDEN_COOKIE not set");
        eprintln!("  export WALLWARDEN_COOKIE=<session cookie of the moderating account>");
        std::process::exit(1);
    });

    let base_url = std::env::var("WALLWARDEN_API_URL")
        .unwrap_or_else(|_| "https://groups.roblox.com".to_string());

    // Classifier backend: Anthropic by default, OpenAI when selected
    let backend = match std::env::var("WALLWARDEN_MODEL_BACKEND").as_deref() {
        Ok("openai") => ModelBackend::OpenAi,
        _ => ModelBackend::Anthropic,
    };
    let key_var = match backend {
        ModelBackend::Anthropic => "ANTHROPIC_API_KEY",
        ModelBackend::OpenAi => "OPENAI_API_KEY",
    };
    let api_key = std::env::var(key_var).unwrap_or_else(|_| {
        eprintln!("Error: {key_var} not set");
        std::process::exit(1);
    });
    let model = std::env::var("WALLWARDEN_MODEL")
        .unwrap_or_else(|_| match backend {
            ModelBackend::Anthropic => "claude-sonnet-4-20250514".to_string(),
            ModelBackend::OpenAi => "gpt-4o-mini".to_string(),
        });

    let mut config = EngineConfig::default();
    if let Ok(secs) = std::env::var("WALLWARDEN_POLL_SECS")
        && let Ok(secs) = secs.parse::<u64>()
    {
        config.poll_interval = Duration::from_secs(secs);
    }

    eprintln!("🛡  wallwarden v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {model}");
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::env::var("WALLWARDEN_DB_PATH")
        .unwrap_or_else(|_| "./data/wallwarden.db".to_string());
    let store = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Feed ─────────────────────────────────────────────────────────────
    let feed: Arc<dyn FeedSource> = Arc::new(HttpFeed::new(HttpFeedConfig {
        base_url,
        cookie: secrecy::SecretString::from(cookie),
    }));

    // Audit entries are attributed to the account behind the cookie.
    let issuing_agent_id = match feed.authenticated_user().await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: Could not authenticate with the group API: {e}");
            std::process::exit(1);
        }
    };
    eprintln!("   Moderating as user {issuing_agent_id}");

    // ── Classifier ───────────────────────────────────────────────────────
    let model_config = ModelConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let policy_model = create_model(&model_config)?;
    let budget = Arc::new(RateBudget::new(
        config.rate_capacity,
        config.rate_refill_per_minute,
    ));
    let classifier = Arc::new(ClassifierClient::new(policy_model, budget));

    // ── Dispatch ─────────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(
        std::env::var("WALLWARDEN_WEBHOOK_URL").unwrap_or_default(),
    ));
    let dispatcher = Arc::new(ActionDispatcher::new(
        Arc::clone(&feed),
        Arc::clone(&store) as Arc<dyn AuditStore>,
        notifier,
        issuing_agent_id,
    ));

    // ── Monitors ─────────────────────────────────────────────────────────
    let deps = MonitorDeps {
        fetcher: Arc::new(WallFetcher::new(Arc::clone(&feed), config.fetch_limit)),
        classifier,
        dispatcher,
        subscriptions: Arc::clone(&store) as Arc<dyn SubscriptionStore>,
        config: config.clone(),
    };
    let registry = Arc::new(MonitorRegistry::new(deps));

    let groups = store.subscribed_groups().await?;
    eprintln!("   Subscribed groups: {}\n", groups.len());
    registry.start_many(&groups).await;

    let _reconciler = registry.spawn_reconciler(
        Arc::clone(&store) as Arc<dyn SubscriptionStore>,
        config.reconcile_interval,
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, draining monitors");
    registry.shutdown().await;

    Ok(())
}
