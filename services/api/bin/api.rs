//! Main Entrypoint for the Rouse API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the protocol engine and its collaborators.
//! 3. Optionally connecting the history database and running migrations.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server with graceful shutdown, plus the periodic
//!    session-expiry sweep.

use anyhow::Context;
use rouse_api::{
    config::Config,
    history::WakeHistoryDb,
    router::create_router,
    speech_http::{HttpSynthesizer, HttpTranscriber, ensure_static_dir},
    state::AppState,
};
use rouse_core::keyword::{FuzzyNormalizer, KeywordMatcher, KeywordMode, KeywordPolicy};
use rouse_core::messages::MessageSelector;
use rouse_core::protocol::{NoopHistory, ProtocolConfig, WakeHistory, WakeProtocol};
use rouse_core::speech::{SpeechSynthesizer, Transcriber, UnavailableSynthesizer};
use rouse_core::store::InMemorySessionStore;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Builds the keyword policy from configuration, applying vocabulary
/// overrides on top of the stock sets.
fn build_matcher(config: &Config) -> KeywordMatcher {
    let mut policy = KeywordPolicy::default();
    policy.mode = config.keyword_mode;
    if let Some(spoken) = &config.spoken_phrases {
        policy.spoken_phrases = spoken.iter().cloned().collect();
    }
    if let Some(typed) = &config.typed_keywords {
        policy.typed_keywords = typed.iter().cloned().collect();
    }
    if config.fuzzy_spoken && policy.mode == KeywordMode::Dual {
        let normalizer = FuzzyNormalizer::new(policy.spoken_phrases.iter().cloned(), 50);
        KeywordMatcher::with_normalizer(policy, Box::new(normalizer))
    } else {
        KeywordMatcher::new(policy)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize History Database (optional) ---
    let history: Arc<dyn WakeHistory> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to history database")?;
            let db = WakeHistoryDb::new(pool);
            db.run_migrations().await?;
            info!("History database connected and migrations are up-to-date.");
            Arc::new(db)
        }
        None => {
            info!("DATABASE_URL not set; wake history recording disabled.");
            Arc::new(NoopHistory)
        }
    };

    // --- 4. Initialize Speech Collaborators ---
    ensure_static_dir(&config.static_dir)
        .await
        .context("Failed to create static audio directory")?;
    let synthesizer: Arc<dyn SpeechSynthesizer> = match &config.tts_engine_url {
        Some(url) => Arc::new(HttpSynthesizer::new(
            url.clone(),
            config.static_dir.clone(),
        )),
        None => {
            info!("TTS_ENGINE_URL not set; responses will be text-only.");
            Arc::new(UnavailableSynthesizer)
        }
    };
    let transcriber: Option<Arc<dyn Transcriber>> = config
        .stt_engine_url
        .as_ref()
        .map(|url| Arc::new(HttpTranscriber::new(url.clone())) as Arc<dyn Transcriber>);

    // --- 5. Assemble the Protocol Engine ---
    let selector = match config.message_seed {
        Some(seed) => MessageSelector::with_seed(seed),
        None => MessageSelector::new(),
    };
    let protocol = Arc::new(WakeProtocol::new(
        InMemorySessionStore::new(config.session_ttl),
        build_matcher(&config),
        selector,
        synthesizer,
        history,
        ProtocolConfig {
            escalation_threshold: config.escalation_threshold,
            routine_enabled: config.routine_enabled,
            speaker: config.tts_speaker.clone(),
            synthesis_timeout: config.speech_timeout,
        },
    ));

    // Periodic sweep so abandoned sessions expire even with no traffic.
    let sweeper = protocol.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweeper.expire_idle().await;
        }
    });

    let app_state = AppState {
        protocol,
        transcriber,
        config: Arc::new(config.clone()),
    };

    // --- 6. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state, &config.static_dir).layer(cors);

    // --- 7. Start Server ---
    info!(
        keyword_mode = ?config.keyword_mode,
        escalation_threshold = config.escalation_threshold,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
