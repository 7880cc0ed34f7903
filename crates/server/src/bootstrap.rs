use std::sync::Arc;

use assetmap_core::audit::TracingAuditSink;
use assetmap_core::config::{AppConfig, ConfigError, LoadOptions};
use assetmap_core::schema::FieldSchemas;
use assetmap_core::storage::{Credentials, IdentityStore, StoreError};
use assetmap_core::upload::ImageUploader;
use assetmap_db::{
    connect_with_config, migrations, DbPool, FilesystemObjectStore, SqlIdentityStore,
    SqlSubmissionStore,
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::{AppState, StateParts};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("could not create bootstrap admin account: {0}")]
    AdminBootstrap(#[source] StoreError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let catalog = Arc::new(config.load_catalog()?);

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let identity = Arc::new(SqlIdentityStore::new(db_pool.clone(), config.session_ttl()));
    ensure_bootstrap_admin(&config, identity.as_ref()).await?;

    let objects = FilesystemObjectStore::new(
        &config.storage.root,
        &config.storage.bucket,
        &config.storage.public_base_url,
    );
    let state = AppState::new(StateParts {
        schemas: Arc::new(FieldSchemas::new(config.schema_options(), catalog.directory().clone())),
        catalog,
        block_validation: config.intake.block_validation,
        uploader: ImageUploader::new(Arc::new(objects), config.upload_limits()),
        submissions: Arc::new(SqlSubmissionStore::new(db_pool.clone())),
        identity,
        audit_sink: Arc::new(TracingAuditSink),
        idle_timeout: config.wizard_idle_timeout(),
    });

    Ok(Application { config, db_pool, state })
}

/// Creates the configured bootstrap admin once; an existing account is left alone.
async fn ensure_bootstrap_admin(
    config: &AppConfig,
    identity: &dyn IdentityStore,
) -> Result<(), BootstrapError> {
    let (Some(email), Some(password)) =
        (&config.admin.bootstrap_email, &config.admin.bootstrap_password)
    else {
        return Ok(());
    };

    let credentials = Credentials::new(email.clone(), password.expose_secret().to_string());
    match identity.sign_up(&credentials).await {
        Ok(user) => {
            info!(
                event_name = "system.bootstrap.admin_created",
                correlation_id = "bootstrap",
                user_id = %user.id,
                "bootstrap admin account created"
            );
            Ok(())
        }
        Err(StoreError::Conflict(_)) => Ok(()),
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.admin_failed",
                correlation_id = "bootstrap",
                error = %error,
                "bootstrap admin account could not be created"
            );
            Err(BootstrapError::AdminBootstrap(error))
        }
    }
}
