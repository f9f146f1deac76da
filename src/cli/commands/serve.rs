use anyhow::Context;

use crate::auth::PasswordHasher;
use crate::config::AppConfig;
use crate::server::{app, AppState, Backend};

pub async fn handle(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    tracing::info!("Starting Product API in {:?} mode", config.environment);

    let backend = Backend::from_config(&config).await?;
    let state = AppState::new(backend, &config, PasswordHasher::default())?;

    if let Some(seed) = &config.dev_user {
        state.seed_user(seed).await?;
        tracing::info!("Development user {} available", seed.email);
    }

    let router = app(state, &config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Product API listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
