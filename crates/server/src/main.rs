mod admin;
mod api;
mod bootstrap;
mod health;
mod intake;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use assetmap_core::config::{AppConfig, LoadOptions};
use axum::Router;
use tokio::sync::Notify;
use tower_http::services::ServeDir;

fn init_logging(config: &AppConfig) {
    use assetmap_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn app_router(app: &bootstrap::Application) -> Router {
    let health_state =
        health::HealthState::new(app.db_pool.clone(), app.config.bucket_dir());
    intake::router(app.state.clone())
        .merge(admin::router(app.state.clone()))
        .merge(health::router(health_state))
        .nest_service("/files", ServeDir::new(&app.config.storage.root))
}

fn idle_sweep_period(config: &AppConfig) -> Duration {
    (config.wizard_idle_timeout() / 4).max(Duration::from_secs(15))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = app_router(&app);

    let sweeper = app.state.spawn_idle_sweeper(idle_sweep_period(&app.config));
    let shutdown = Arc::new(Notify::new());
    let server = tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await
        }
    });
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "assetmap-server listening"
    );

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        open_wizards = app.state.open_sessions().await,
        "assetmap-server stopping"
    );
    shutdown.notify_one();
    sweeper.abort();

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "in-flight requests did not finish before the shutdown deadline"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use assetmap_core::config::{ConfigOverrides, LoadOptions};

    use crate::{app_router, bootstrap};

    #[tokio::test]
    async fn router_serves_health_catalog_and_uploaded_files() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap::bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(format!(
                    "sqlite://{}",
                    dir.path().join("assetmap.db").display()
                )),
                storage_root: Some(dir.path().join("uploads")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap");
        std::fs::create_dir_all(app.config.bucket_dir()).expect("bucket dir");
        std::fs::write(app.config.bucket_dir().join("1-abc.png"), [1u8, 2, 3]).expect("object");
        let router = app_router(&app);

        let health = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health response");
        assert_eq!(health.status(), StatusCode::OK);

        let catalog = router
            .clone()
            .oneshot(Request::get("/api/v1/catalog").body(Body::empty()).expect("request"))
            .await
            .expect("catalog response");
        assert_eq!(catalog.status(), StatusCode::OK);

        let uri = format!("/files/{}/1-abc.png", app.config.storage.bucket);
        let file = router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("file response");
        assert_eq!(file.status(), StatusCode::OK);

        let unauthorized = router
            .oneshot(Request::get("/api/v1/admin/submissions").body(Body::empty()).expect("request"))
            .await
            .expect("admin response");
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        app.db_pool.close().await;
    }
}
