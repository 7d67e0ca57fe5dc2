use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finsecure_core::harness::TestRunner;
use finsecure_core::storage::PgStore;

mod error;
mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = finsecure_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_log_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store = match PgStore::connect_lazy(&settings) {
        Ok(store) => {
            if let Some(pool) = store.pool() {
                if let Err(e) = finsecure_core::storage::migrate(pool).await {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; continuing, tables may be missing");
                }
            }
            store
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "database not configured; starting API in degraded mode");
            PgStore::new(None)
        }
    };

    if settings.is_production() {
        tracing::info!(origins = ?settings.allowed_origins, "production mode: test execution disabled");
    }

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    let runner = TestRunner::from_settings(&settings);
    let state = routes::AppState {
        settings: Arc::new(settings),
        store: Arc::new(store),
        runner: Arc::new(runner),
    };

    let app = routes::app(state);

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &finsecure_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(if settings.is_production() { "production" } else { "development" }.into()),
            ..Default::default()
        },
    )))
}
