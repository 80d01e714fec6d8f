use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use reimburse_core::config::{AppConfig, ConfigError};
use reimburse_core::identity::{IdentityResolver, StaticTokenResolver};
use reimburse_core::notify::NotificationError;
use reimburse_db::repositories::{RequestRepository, SqlRequestRepository};
use reimburse_db::{connect_with_settings, migrations, DbPool};

use crate::audit::TracingAuditSink;
use crate::notifier::build_dispatcher;
use crate::service::RequestService;
use crate::{api, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repository: Arc<dyn RequestRepository>,
    pub service: Arc<RequestService>,
    pub identity: Arc<dyn IdentityResolver>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
}

impl Application {
    /// HTTP surface: request API and health check, with request tracing.
    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.service), Arc::clone(&self.identity))
            .merge(health::router(self.db_pool.clone()))
            .layer(TraceLayer::new_for_http())
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

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

    let identity = StaticTokenResolver::from_config(&config.auth);
    if identity.is_empty() {
        warn!(
            event_name = "system.bootstrap.no_token_grants",
            correlation_id = "bootstrap",
            "no auth token grants configured; every API call will be rejected"
        );
    }

    let dispatcher = build_dispatcher(&config.notification)?;
    let repository: Arc<dyn RequestRepository> =
        Arc::new(SqlRequestRepository::new(db_pool.clone()));
    let service = Arc::new(RequestService::new(
        Arc::clone(&repository),
        dispatcher,
        Arc::new(TracingAuditSink),
        config.notification.frontend_url.clone(),
    ));

    Ok(Application { config, db_pool, repository, service, identity: Arc::new(identity) })
}
