use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use fitlink::config::AppConfig;
use fitlink::flows::routes::{AppState, webhook_routes};
use fitlink::flows::token::{TokenStore, spawn_prune_task};
use fitlink::flows::{
    FlowDispatcher, FlowSender, PassthroughDecryptor, PayloadNormalizer, WebhookRouter,
};
use fitlink::gateway::{MessagingGateway, WhatsAppGateway};
use fitlink::habits::{ClientHabitLoggingHandler, HabitProgressHandler, TrainerHabitSetupHandler};
use fitlink::onboarding::{
    ClientOnboardingHandler, ProfileEditClientHandler, ProfileEditTrainerHandler,
    TextRegistrar, TrainerOnboardingHandler,
};
use fitlink::store::{Database, LibSqlBackend};

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

    let config = Arc::new(AppConfig::from_env()?);

    let http_port: u16 = std::env::var("FITLINK_HTTP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    // WhatsApp credentials are required; this service is webhook-driven.
    let phone_number_id = std::env::var("WHATSAPP_PHONE_NUMBER_ID").unwrap_or_else(|_| {
        eprintln!("Error: WHATSAPP_PHONE_NUMBER_ID not set");
        std::process::exit(1);
    });
    let access_token = std::env::var("WHATSAPP_ACCESS_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: WHATSAPP_ACCESS_TOKEN not set");
        std::process::exit(1);
    });
    let verify_token = std::env::var("WHATSAPP_VERIFY_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: WHATSAPP_VERIFY_TOKEN not set");
        std::process::exit(1);
    });

    eprintln!("🏋  fitlink v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", http_port);
    eprintln!("   Token TTL: {}s", config.token_ttl.as_secs());
    eprintln!(
        "   Fallback: trainer={}, client={}",
        config.trainer_fallback_enabled, config.client_fallback_enabled
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("FITLINK_DB_PATH").unwrap_or_else(|_| "./data/fitlink.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", db_path);

    // ── Gateway ──────────────────────────────────────────────────────────
    let gateway: Arc<dyn MessagingGateway> = Arc::new(WhatsAppGateway::new(
        phone_number_id,
        SecretString::from(access_token),
    ));

    // ── Orchestration ────────────────────────────────────────────────────
    let tokens = TokenStore::new(Arc::clone(&db));
    let normalizer = Arc::new(PayloadNormalizer::new(
        config.labels.clone(),
        config.pricing_floor,
    ));
    let registrar = Arc::new(TextRegistrar::new(
        Arc::clone(&db),
        Arc::clone(&normalizer),
    ));

    let dispatcher = FlowDispatcher::new()
        .register(Arc::new(TrainerOnboardingHandler::new(
            Arc::clone(&db),
            Arc::clone(&normalizer),
        )))
        .register(Arc::new(ClientOnboardingHandler::new(
            Arc::clone(&db),
            Arc::clone(&normalizer),
        )))
        .register(Arc::new(ProfileEditTrainerHandler::new(
            Arc::clone(&db),
            Arc::clone(&normalizer),
        )))
        .register(Arc::new(ProfileEditClientHandler::new(
            Arc::clone(&db),
            Arc::clone(&normalizer),
        )))
        .register(Arc::new(TrainerHabitSetupHandler::new(Arc::clone(&db))))
        .register(Arc::new(ClientHabitLoggingHandler::new(Arc::clone(&db))))
        .register(Arc::new(HabitProgressHandler::new(Arc::clone(&db))));
    eprintln!("   Flows: {} handlers registered", dispatcher.count());

    let router = Arc::new(WebhookRouter::new(
        tokens.clone(),
        dispatcher,
        Arc::new(PassthroughDecryptor),
    ));
    let sender = Arc::new(FlowSender::new(
        Arc::clone(&db),
        Arc::clone(&gateway),
        tokens.clone(),
        Arc::clone(&registrar),
        Arc::clone(&config),
    ));

    // Expired-token sweep; resolve() already checks expiry, this is hygiene.
    let _prune_handle = spawn_prune_task(tokens, Duration::from_secs(300));

    // ── HTTP server ──────────────────────────────────────────────────────
    let state = AppState {
        sender,
        router,
        registrar,
        gateway,
        verify_token: verify_token.into(),
    };
    let app = webhook_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port)).await?;
    tracing::info!(port = http_port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
