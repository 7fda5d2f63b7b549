use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parranda::config::{EngineConfig, ServerConfig};
use parranda::results::ScoreLog;
use parranda::state::AppState;
use parranda::supply::{
    FallbackSupplier, GeneratedSupplier, PolishingSupplier, QuestionBank, QuestionSupplier,
};
use parranda::{llm, router};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parranda=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Parranda...");

    let server_config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();

    let bank = match QuestionBank::embedded() {
        Ok(bank) => Arc::new(bank),
        Err(e) => {
            tracing::error!("Embedded question bank is unusable: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Loaded {} bank questions", bank.len());

    let llm_config = llm::LlmConfig::from_env();
    let manager = if server_config.use_ai || server_config.polish_dialect {
        match llm_config.build_manager() {
            Ok(manager) => {
                tracing::info!("LLM providers initialized successfully");
                Some(Arc::new(manager))
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize LLM providers: {}. Serving bank questions only.",
                    e
                );
                None
            }
        }
    } else {
        None
    };

    let primary: Option<Arc<dyn QuestionSupplier>> = match &manager {
        Some(manager) if server_config.use_ai => Some(Arc::new(
            GeneratedSupplier::new(
                manager.clone(),
                llm_config.default_timeout,
                llm_config.default_max_tokens,
            )
            .with_bank(bank.clone()),
        )),
        _ => None,
    };

    let mut supplier: Arc<dyn QuestionSupplier> = Arc::new(FallbackSupplier::new(primary, bank));
    if let (Some(manager), true) = (manager, server_config.polish_dialect) {
        tracing::info!("Polishing question dialect");
        supplier = Arc::new(PolishingSupplier::new(
            supplier,
            manager,
            llm_config.default_timeout,
            llm_config.default_max_tokens,
        ));
    }
    let scores = Arc::new(ScoreLog::new(server_config.scores_path.clone()));
    let state = Arc::new(AppState::new(supplier, scores, engine_config));

    let app = router(state);

    let addr = server_config.addr;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
