//! Gateway server setup
//!
//! One listener serves the WebSocket endpoint, the REST API and the health
//! check. All of them share a [`GatewayState`].

mod middleware;
mod socket;
mod state;

pub use middleware::{apply_middleware, REQUEST_ID_HEADER};
pub use socket::gateway_handler;
pub use state::GatewayState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use chat_common::{AppConfig, AppError, JwtService, StoreBackend};
use chat_core::traits::{ChatDirectory, MessageStore, UserRepository};
use chat_core::SnowflakeGenerator;
use chat_db::{
    create_pool, run_migrations, MemoryChatDirectory, MemoryMessageStore, MemoryUserRepository,
    PgChatDirectory, PgMessageStore, PgUserRepository, PoolConfig,
};
use chat_service::ServiceContextBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::api;
use crate::engine::{Engine, EngineConfig};

/// The persistence collaborators behind the gateway
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub chats: Arc<dyn ChatDirectory>,
    pub users: Arc<dyn UserRepository>,
}

impl Stores {
    /// Empty in-memory stores
    pub fn memory() -> Self {
        Self {
            messages: Arc::new(MemoryMessageStore::new()),
            chats: Arc::new(MemoryChatDirectory::new()),
            users: Arc::new(MemoryUserRepository::new()),
        }
    }

    /// Connect to PostgreSQL and apply pending migrations.
    pub async fn postgres(config: &chat_common::DatabaseConfig) -> Result<Self, AppError> {
        tracing::info!("Connecting to PostgreSQL...");
        let pool = create_pool(&PoolConfig::from(config))
            .await
            .map_err(|e| AppError::Unavailable(format!("PostgreSQL: {e}")))?;
        run_migrations(&pool, None)
            .await
            .map_err(|e| AppError::Config(format!("Migrations failed: {e}")))?;
        tracing::info!("PostgreSQL connection established");

        Ok(Self {
            messages: Arc::new(PgMessageStore::new(pool.clone())),
            chats: Arc::new(PgChatDirectory::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool)),
        })
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        match (config.store, &config.database) {
            (StoreBackend::Memory, _) => {
                tracing::warn!("Using in-memory stores; data is lost on restart");
                Ok(Self::memory())
            }
            (StoreBackend::Postgres, Some(database)) => Self::postgres(database).await,
            (StoreBackend::Postgres, None) => {
                Err(AppError::Config("DATABASE_URL is required for postgres".to_string()))
            }
        }
    }
}

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/gateway", get(gateway_handler))
        .route("/health", get(health_check))
        .merge(api::routes())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: GatewayState, config: &AppConfig) -> Router {
    apply_middleware(create_router(), &config.cors, config.app.env.is_production())
        .with_state(state)
}

/// Start the engine over `stores` and wire the services to it.
///
/// Must be called inside a Tokio runtime. The returned task ends once the
/// engine stops.
pub fn create_gateway_state(
    stores: Stores,
    config: &AppConfig,
) -> Result<(GatewayState, JoinHandle<()>), AppError> {
    let engine_config = EngineConfig {
        typing_timeout: config.realtime.typing_timeout(),
        buffer: config.realtime.engine_buffer,
    };
    let (engine, handle) = Engine::new(
        engine_config,
        Arc::clone(&stores.messages),
        Arc::clone(&stores.users),
    );
    let engine_task = engine.spawn();

    let services = ServiceContextBuilder::new()
        .message_store(stores.messages)
        .chat_directory(stores.chats)
        .user_repo(stores.users)
        .notifier(Arc::new(handle.clone()))
        .snowflake_generator(Arc::new(SnowflakeGenerator::new(config.snowflake.worker_id)))
        .build()
        .map_err(|e| AppError::Config(e.to_string()))?;

    let verifier = Arc::new(JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expiry,
    ));

    let state = GatewayState::new(services, handle, verifier, config.realtime.clone());
    Ok((state, engine_task))
}

/// Serve `app` until Ctrl-C, then stop the engine.
pub async fn run_server(
    app: Router,
    listener: TcpListener,
    state: GatewayState,
) -> Result<(), AppError> {
    let addr = listener
        .local_addr()
        .map_err(|e| AppError::Config(format!("Listener has no address: {e}")))?;
    tracing::info!("Gateway listening on ws://{}/gateway", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))?;

    if state.engine().shutdown().await.is_err() {
        tracing::debug!("Engine already stopped");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let stores = Stores::from_config(&config).await?;
    let (state, engine_task) = create_gateway_state(stores, &config)?;
    let app = create_app(state.clone(), &config);

    let addr: SocketAddr = config
        .gateway
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address: {e}")))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    run_server(app, listener, state).await?;

    if let Err(e) = engine_task.await {
        tracing::error!(error = %e, "Engine task failed");
    }
    tracing::info!("Gateway stopped");
    Ok(())
}
