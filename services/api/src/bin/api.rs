//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, LogNotifier, MemoryStore, PassthroughScanner},
    config::Config,
    error::ApiError,
    web::{
        actor::{USER_ID_HEADER, USER_ROLE_HEADER},
        build_router,
        rest::ApiDoc,
        state::AppState,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuteskillz_core::ports::TutoringStore;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for JSON framing around a base64 note.
const BODY_SLACK_BYTES: usize = 64 * 1024;
const DB_MAX_CONNECTIONS: u32 = 5;

async fn open_store(config: &Config) -> Result<Arc<dyn TutoringStore>, ApiError> {
    if config.uses_memory_store() {
        info!("DATABASE_URL selects the in-process store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .connect(&config.database_url)
        .await?;
    let store = DbAdapter::new(pool);
    store.run_migrations().await?;
    info!("PostgreSQL store ready, migrations applied");
    Ok(Arc::new(store))
}

fn cors_layer(config: &Config) -> Result<CorsLayer, ApiError> {
    let origins = config
        .cors_allowed_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                ApiError::Internal(format!("Invalid CORS origin '{origin}': {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
        ]))
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState {
        store: open_store(&config).await?,
        notifier: Arc::new(LogNotifier),
        scanner: Arc::new(PassthroughScanner),
        config: config.clone(),
    });

    // Base64 inflates a document by a third.
    let body_limit = config.max_note_bytes / 3 * 4 + BODY_SLACK_BYTES;
    let app = Router::new()
        .merge(
            build_router(state)
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(cors_layer(&config)?),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "TuteSkillz API listening, docs at /swagger-ui");
    axum::serve(listener, app).await?;

    Ok(())
}
