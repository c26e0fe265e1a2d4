//! Server: reads settings, loads entity documents, serves the entity routes until Ctrl-C or SIGTERM.

use schema_crud::{build_router, load_entities, AppState, DefaultsRegistry, Settings};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("schema_crud=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    let defaults = DefaultsRegistry::load(&settings.paths.defaults);
    let registry = load_entities(&settings.paths.entities, &defaults, &settings.paths.form_codes)?;
    if registry.is_empty() {
        tracing::warn!(dir = %settings.paths.entities.display(), "no entities loaded");
    } else {
        tracing::info!(count = registry.len(), "entities loaded");
    }

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    let state = AppState {
        pool,
        registry: Arc::new(registry),
    };
    let app = build_router(state, settings.server.body_limit);

    let listener = TcpListener::bind(settings.bind_address()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
