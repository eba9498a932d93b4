use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api;
use crate::capability::Capabilities;
use crate::config::Settings;
use crate::metrics::gather_metrics;
use crate::orchestrator::AnalysisOrchestrator;
use crate::sentiment::ClassifierCache;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>) -> Self {
        let capabilities = Capabilities::detect().without(settings.disabled_capabilities.as_slice());
        Self::with_capabilities(settings, capabilities)
    }

    pub fn with_capabilities(settings: Arc<Settings>, capabilities: Capabilities) -> Self {
        let cache = Arc::new(ClassifierCache::new());
        Self {
            orchestrator: Arc::new(AnalysisOrchestrator::new(settings, capabilities, cache)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analysis/comments/", post(api::analyze_comments))
        .route("/api/analysis/comments", post(api::analyze_comments))
        .route("/health", get(api::health))
        .with_state(state)
}

pub async fn run(settings: Settings) -> Result<()> {
    let settings = Arc::new(settings);
    let state = AppState::new(settings.clone());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_server = spawn_server(build_router(state), settings.http_port, shutdown_tx.subscribe());
    let metrics_server = serve_metrics(settings.prometheus_port, shutdown_tx.subscribe());

    info!(
        http_port = settings.http_port,
        metrics_port = settings.prometheus_port,
        "Comment analysis service started"
    );

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());

    for (name, server) in [("http", http_server), ("metrics", metrics_server)] {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(server = name, error = %err, "Server exited with error"),
            Err(err) => error!(server = name, error = %err, "Server task crashed"),
        }
    }

    info!("Comment analysis service shutdown complete");
    Ok(())
}

fn serve_metrics(port: u16, shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<()>> {
    let router = Router::new().route(
        "/metrics",
        get(|| async { ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], gather_metrics()).into_response() }),
    );
    spawn_server(router, port, shutdown)
}

fn spawn_server(app: Router, port: u16, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await
            .context("server error")
    })
}
