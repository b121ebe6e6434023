//! Pagesmith
//!
//! Turns task briefs into single-page web applications: an LLM writes the page,
//! GitHub hosts it, and the caller's evaluation URL is told where it lives.

mod api;
mod auth;
mod config;
mod errors;
mod generation;
mod hosting;
mod models;
mod notify;
mod pipeline;
mod retry;
mod store;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use generation::{CodeGenerator, OpenAiGenerator};
use hosting::{AttachmentResolver, GitHubClient, HostingService};
use notify::CallbackNotifier;
use pipeline::Pipeline;
use retry::RetryPolicy;
use store::{JsonFileStore, StateStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn StateStore>,
    pub generator: Arc<dyn CodeGenerator>,
    pub hosting: Arc<dyn HostingService>,
}

impl AppState {
    /// Wire the pipeline from its collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn StateStore>,
        generator: Arc<dyn CodeGenerator>,
        hosting: Arc<dyn HostingService>,
    ) -> Result<Self, reqwest::Error> {
        let notifier = CallbackNotifier::new(
            &config.secret_key,
            RetryPolicy::new(config.callback_max_attempts, config.retry_base_delay),
        )?;
        let pipeline = Pipeline::new(
            store.clone(),
            generator.clone(),
            hosting.clone(),
            AttachmentResolver::new()?,
            notifier,
            config.user_secret.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            store,
            generator,
            hosting,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    tracing::info!("Starting pagesmith {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("LLM endpoint: {} (model {})", config.llm_base_url, config.llm_model);
    tracing::info!("Hosting API: {}", config.github_api_url);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.secret_key_generated {
        tracing::warn!("SECRET_KEY not set; callback signatures use a per-process key");
    }

    let store = JsonFileStore::open(&config.state_path).await?;
    tracing::info!("State document: {}", store.path().display());
    let store: Arc<dyn StateStore> = Arc::new(store);
    let generator: Arc<dyn CodeGenerator> = Arc::new(OpenAiGenerator::new(&config)?);
    let hosting: Arc<dyn HostingService> = Arc::new(GitHubClient::new(&config)?);

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, store, generator, hosting)?;

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        .route("/deploy", post(api::deploy))
        .route("/validate", post(api::validate_request))
        .route("/status/{id}", get(api::get_status));

    Router::new()
        .route("/", get(api::index))
        .route("/health", get(api::health_check))
        .nest("/api", api_routes)
        .fallback(api::not_found)
        .layer(DefaultBodyLimit::max(api::MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
