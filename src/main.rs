use std::sync::Arc;

use charla::agents::{self, AgentRuntime, Router};
use charla::config::CoreConfig;
use charla::dispatch::{Dispatcher, InboundContent};
use charla::gateway::TelegramGateway;
use charla::model::{Platform, User};
use charla::onboarding::OnboardingManager;
use charla::prompts::{default_templates, PromptRegistry};
use charla::providers::{AiProvider, FailoverProvider, OpenAiCompatProvider};
use charla::session::SessionPipeline;
use charla::storage::{BlobStorage, FsBlobStorage};
use charla::store::{Database, LibSqlBackend, MemoryCache, StateStore};

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

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: OPENAI_API_KEY not set");
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });
    let base_url = std::env::var("CHARLA_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let telegram_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: TELEGRAM_BOT_TOKEN not set");
        std::process::exit(1);
    });

    let config = CoreConfig::from_env();

    eprintln!("💬 charla v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Persona: {}", config.persona);

    // ── Database ─────────────────────────────────────────────────────
    let db_path =
        std::env::var("CHARLA_DB_PATH").unwrap_or_else(|_| "./data/charla.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Prompt registry ──────────────────────────────────────────────
    if db.count_templates().await? == 0 {
        tracing::info!("Empty prompt store; seeding default templates");
        for template in default_templates(&config.persona) {
            db.insert_template(&template).await?;
        }
    }
    let registry = Arc::new(PromptRegistry::new(db.load_active_templates().await?));
    // A broken catalog means silent misrouting later; refuse to start.
    agents::verify_catalog(&registry, &config.persona)?;
    eprintln!("   Prompts: {} active templates", registry.len());

    // ── AI providers ─────────────────────────────────────────────────
    let mut providers: Vec<Arc<dyn AiProvider>> = vec![Arc::new(
        OpenAiCompatProvider::new("openai", &base_url, secrecy::SecretString::from(api_key))
            .with_call_timeouts(config.stt_timeout, config.tts_timeout),
    )];
    if let (Ok(fallback_url), Ok(fallback_key)) = (
        std::env::var("CHARLA_FALLBACK_BASE_URL"),
        std::env::var("CHARLA_FALLBACK_API_KEY"),
    ) {
        providers.push(Arc::new(
            OpenAiCompatProvider::new(
                "fallback",
                &fallback_url,
                secrecy::SecretString::from(fallback_key),
            )
            .with_call_timeouts(config.stt_timeout, config.tts_timeout),
        ));
        eprintln!("   Providers: openai + fallback");
    } else {
        eprintln!("   Providers: openai");
    }
    let provider: Arc<dyn AiProvider> = Arc::new(
        FailoverProvider::new(providers)
            .with_retry(config.provider_retries, config.retry_backoff),
    );

    // ── Gateway, storage, state store ────────────────────────────────
    let gateway =
        Arc::new(TelegramGateway::new(telegram_token).with_request_timeout(config.gateway_timeout));
    if let Err(e) = gateway.health_check().await {
        eprintln!("Error: Telegram health check failed: {e}");
        std::process::exit(1);
    }

    let media_dir =
        std::env::var("CHARLA_MEDIA_DIR").unwrap_or_else(|_| "./data/media".to_string());
    let media_base_url = std::env::var("CHARLA_MEDIA_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8080/media".to_string());
    let storage: Arc<dyn BlobStorage> = Arc::new(FsBlobStorage::new(&media_dir, media_base_url));

    let cache = Arc::new(MemoryCache::new());
    let state_store = Arc::new(StateStore::new(
        cache,
        Arc::clone(&db),
        config.onboarding_ttl,
    ));

    // ── Dispatcher ───────────────────────────────────────────────────
    let router = Router::new(
        Arc::clone(&provider),
        Arc::clone(&registry),
        config.clone(),
    );
    let runtime = AgentRuntime::new(
        Arc::clone(&provider),
        Arc::clone(&registry),
        config.clone(),
    );
    let pipeline = SessionPipeline::new(
        Arc::clone(&db),
        Arc::clone(&provider),
        Arc::clone(&registry),
        storage,
        gateway.clone() as Arc<dyn charla::gateway::MessagingGateway>,
        config.clone(),
    );
    let onboarding = OnboardingManager::new(
        Arc::clone(&db),
        Arc::clone(&state_store),
        Arc::clone(&provider),
        Arc::clone(&registry),
        config.clone(),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&db),
        Arc::clone(&provider),
        router,
        runtime,
        pipeline,
        onboarding,
        gateway.clone() as Arc<dyn charla::gateway::MessagingGateway>,
        config.clone(),
    ));

    eprintln!("   Listening on Telegram\n");
    tracing::info!("charla started");

    // ── Long-poll loop ───────────────────────────────────────────────
    let mut offset: i64 = 0;
    loop {
        let updates = match gateway.poll_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "Telegram poll failed; backing off");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let user = match get_or_create_user(
                &db,
                &update.external_user_id,
                &update.display_name,
            )
            .await
            {
                Ok(user) => user,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to resolve user; dropping update");
                    continue;
                }
            };

            let content = if let Some(text) = update.text {
                InboundContent::Text(text)
            } else if let Some(file_id) = update.voice_file_id {
                match gateway.download_file(&file_id).await {
                    Ok(data) => InboundContent::Audio {
                        data,
                        input_ref: Some(file_id),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Voice download failed; dropping update");
                        continue;
                    }
                }
            } else {
                continue;
            };

            let dispatcher = Arc::clone(&dispatcher);
            let chat_id = update.chat_id.clone();
            tokio::spawn(async move {
                dispatcher
                    .handle(user.id, Platform::Telegram, &chat_id, content)
                    .await;
            });
        }
    }
}

/// Look up the user by platform id, creating a fresh onboarding-pending
/// record on first contact.
async fn get_or_create_user(
    db: &Arc<dyn Database>,
    external_id: &str,
    display_name: &str,
) -> charla::Result<User> {
    if let Some(user) = db
        .get_user_by_platform(Platform::Telegram, external_id)
        .await?
    {
        return Ok(user);
    }
    let user = User::new(Platform::Telegram, external_id, display_name);
    db.create_user(&user).await?;
    tracing::info!(user_id = %user.id, "New user created");
    Ok(user)
}
