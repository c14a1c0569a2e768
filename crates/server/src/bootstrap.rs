use std::sync::Arc;
use std::time::Duration;

use geochat_agent::runtime::{ChatRuntime, RuntimeError, RuntimeSettings};
use geochat_agent::{LlmError, OpenAiClient};
use geochat_core::config::{AppConfig, ConfigError, LoadOptions};
use geochat_db::repositories::{ConversationRepository, KvConversationRepository, SqlKeyValueStore};
use geochat_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::rate_limit::{RateLimiter, SlidingWindowRateLimiter};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repository: Arc<dyn ConversationRepository>,
    pub runtime: Arc<ChatRuntime>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language model client could not be built: {0}")]
    Llm(#[source] LlmError),
    #[error("chat runtime could not be initialized: {0}")]
    Runtime(#[source] RuntimeError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repository: Arc<dyn ConversationRepository> =
        Arc::new(KvConversationRepository::new(SqlKeyValueStore::new(db_pool.clone())));
    let llm = OpenAiClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let runtime = ChatRuntime::new(
        Arc::clone(&repository),
        Arc::new(llm),
        RuntimeSettings::from_config(&config),
    )
    .map_err(BootstrapError::Runtime)?;
    let rate_limiter: Arc<dyn RateLimiter> = Arc::new(SlidingWindowRateLimiter::new(
        config.rate_limit.max_requests,
        Duration::from_secs(config.rate_limit.window_secs),
    ));
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        chat_model = %config.llm.chat_model,
        extraction_model = %config.llm.extraction_model,
        "chat runtime initialized"
    );

    Ok(Application { config, db_pool, repository, runtime: Arc::new(runtime), rate_limiter })
}
