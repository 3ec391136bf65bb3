//! HTTP service: upload a document, run the pipeline, download artifacts.
//!
//! ```text
//! GET  /  | /health          liveness + version
//! POST /process-document     multipart `file` (+ optional `embed_images`)
//! GET  /download/{kind}      markdown | html | pdf | images | embeddings | all
//! ```
//!
//! The upload response sets a `session_id` cookie; downloads resolve the
//! cookie through the [`SessionStore`] and only ever serve files from that
//! session's directory.

mod error;
mod handlers;

pub use error::{ApiError, ErrorResponse};
pub use handlers::{ArtifactSummary, HealthResponse, UploadResponse, SESSION_COOKIE};

use crate::config::ServerConfig;
use crate::convert::Toolchain;
use crate::session::{spawn_sweeper, InMemorySessionStore, SessionStore};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    toolchain: Toolchain,
    sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(config: ServerConfig, toolchain: Toolchain, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                toolchain,
                sessions,
            }),
        }
    }

    /// State with an in-memory session store using the configured TTL.
    pub fn in_memory(config: ServerConfig, toolchain: Toolchain) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl()));
        Self::new(config, toolchain, sessions)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn work_dir(&self) -> &Path {
        &self.inner.config.work_dir
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.inner.toolchain
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.inner.sessions
    }
}

/// Build the router with all routes and layers attached.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config().max_upload_bytes;
    Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .route("/process-document", post(handlers::process_document))
        .route("/process-document/", post(handlers::process_document))
        .route("/download/:kind", get(handlers::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind, start the session sweeper, and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: ServerConfig, toolchain: Toolchain) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&config.work_dir).await?;

    let addr = config.bind;
    let sweep_every = config.sweep_interval();
    let state = AppState::in_memory(config, toolchain);
    let sweeper = spawn_sweeper(Arc::clone(state.sessions()), sweep_every);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("docchain listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Could not install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Could not install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
