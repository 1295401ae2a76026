use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pushdeploy::pipeline::controller;
use pushdeploy::{api, config, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("PUSHDEPLOY_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    let cfg = config::Config::load();
    if cfg.webhook_secret.is_none() {
        tracing::warn!("PUSHDEPLOY_WEBHOOK_SECRET is not set; every trigger will be rejected");
    }
    tracing::info!(
        source_base = %cfg.source_base.display(),
        deploy_base = %cfg.deploy_base.display(),
        package_manager = %cfg.package_manager,
        timeout_s = cfg.command_timeout.as_secs(),
        "configuration loaded"
    );

    let addr: SocketAddr = cfg.listen.parse()?;
    let max_body_bytes = cfg.max_body_bytes;
    let shutdown_grace = cfg.shutdown_grace;
    let state = state::AppState::new(cfg);
    let runs = state.runs.clone();

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(api::router())
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state);

    tracing::info!(%addr, "starting pushdeploy");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Runs still going after the grace period are dropped with the runtime
    // and log themselves as interrupted.
    controller::drain(&runs, shutdown_grace).await;
    tracing::info!("pushdeploy stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
