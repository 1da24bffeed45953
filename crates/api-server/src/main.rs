use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_server::http::{self, AppState, ClerkJwksCache, ClerkJwksCacheConfig, ClerkVerifier};
use shared::config::{ApiConfig, load_dotenv};
use shared::llm::{OpenAiGateway, OpenAiGatewayConfig};
use shared::repos::{ConversationRepository, MemoryStore, Store};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "api_server=info,shared=info,chat_client=info,axum=info";
const JWKS_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let dotenv_result = load_dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    if let Err(err) = dotenv_result {
        exit_on_startup_error("failed to load .env", err);
    }

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => exit_on_startup_error("failed to read config", err),
    };

    let llm_gateway = match OpenAiGatewayConfig::from_env().and_then(OpenAiGateway::new) {
        Ok(gateway) => gateway,
        Err(err) => exit_on_startup_error("failed to configure llm gateway", err),
    };

    let repository = connect_repository(&config).await;

    let clerk_jwks_cache = match ClerkJwksCache::new(ClerkJwksCacheConfig {
        default_ttl_seconds: config.clerk_jwks_cache_ttl_seconds,
        stale_ttl_seconds: config.clerk_jwks_stale_ttl_seconds,
    }) {
        Ok(cache) => cache,
        Err(err) => exit_on_startup_error("failed to configure clerk jwks cache", err),
    };

    let http_client = match reqwest::Client::builder()
        .timeout(JWKS_HTTP_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(err) => exit_on_startup_error("failed to build http client", err),
    };

    let app = http::build_router(AppState {
        repository,
        llm_gateway: Arc::new(llm_gateway),
        clerk: ClerkVerifier::new(
            http_client,
            config.clerk_jwks_url,
            config.clerk_issuer,
            config.clerk_audience,
            clerk_jwks_cache,
        ),
        calendar_description_max_chars: config.calendar_description_max_chars,
        chat_history_max_turns: config.chat_history_max_turns,
    });

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => exit_on_startup_error("invalid API_BIND_ADDR", err),
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => exit_on_startup_error("failed to bind listener", err),
    };

    info!(
        bind_addr = %listener.local_addr().unwrap_or(addr),
        "api server listening"
    );

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        exit_on_startup_error("server stopped unexpectedly", err);
    }
}

async fn connect_repository(config: &ApiConfig) -> Arc<dyn ConversationRepository> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL is not set; conversations are kept in memory");
        return Arc::new(MemoryStore::new());
    };

    let store = match Store::connect(database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(err) => exit_on_startup_error("failed to connect to postgres", err),
    };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => exit_on_startup_error("failed to load migrations", err),
    };

    if let Err(err) = migrator.run(store.pool()).await {
        exit_on_startup_error("failed to run migrations", err);
    }

    Arc::new(store)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn exit_on_startup_error(context: &str, err: impl Display) -> ! {
    error!(error = %err, "{context}");
    std::process::exit(1);
}
