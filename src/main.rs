use std::panic;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use club_relay::auth::JwtAuthorizer;
use club_relay::broker::LocalBroker;
use club_relay::config::Config;
use club_relay::db::{MemoryStore, PgStore, Store};
use club_relay::routes::build_router;
use club_relay::AppState;

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before tracing, so LOG_LEVEL shapes the default filter
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()))
        .init();

    info!("Starting {} ({})...", config.service_name, config.environment);
    match &loaded {
        Ok(_) => info!("✅ Configuration loaded successfully"),
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
        }
    }

    let timings = match config.relay_timings() {
        Ok(timings) => timings,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let Some(jwt_secret) = config.jwt_secret.clone() else {
        error!("JWT_SECRET is not configured, refusing to serve the relay");
        std::process::exit(1);
    };

    // Initialize the store, the database when a URL is provided
    let store: Arc<dyn Store> = match &config.db_url {
        Some(db_url) => match connect_store(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to the in-memory store, nothing will be persisted");
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            warn!("No database URL configured - using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let broker = Arc::new(LocalBroker::new(config.broker_channel_capacity));
    let authorizer = Arc::new(JwtAuthorizer::new(
        store.clone(),
        jwt_secret,
        Duration::from_secs(config.member_cache_ttl_secs),
    ));
    let state = AppState::new(store, broker, authorizer, timings);

    let app_routes = build_router(state, cors_layer(&config));

    // Start the HTTP/relay server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 {} running on http://{}", config.service_name, config.server_address());
    info!("📡 Relay available at ws://{}/relay/{{club_id}}", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}

async fn connect_store(db_url: &str) -> Result<PgStore, sqlx::Error> {
    let store = PgStore::connect(db_url).await?;
    store.migrate().await?;
    Ok(store)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);
    if origins.is_empty() {
        if config.is_development() {
            return layer.allow_origin(Any).allow_headers(Any);
        }
        return layer;
    }
    layer
        .allow_origin(origins)
        .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}
