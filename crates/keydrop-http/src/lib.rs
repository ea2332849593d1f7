//! HTTP trigger for the key-to-SFTP upload pipeline
//!
//! Every request to the upload route resolves the private key from the secret
//! store, runs one SFTP upload, and answers 200 or 500 with a plain-text body.
//! TLS is left to the hosting front end.

mod handler;

pub use handler::{UPLOAD_FAILED_PREFIX, UPLOAD_SUCCEEDED, run_upload};

use axum::{Router, routing::get};
use keydrop_core::{HttpConfig, KeydropError, Result, SecretResolver, TransferJob, Uploader};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Upload route, kept at the path existing callers already use
pub const UPLOAD_ROUTE: &str = "/api/SftpUploadFunction";

pub struct HttpServer {
    config: HttpConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: HttpConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub async fn run(&self) -> Result<()> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the connection is dropped.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("HTTP server listening on http://{}{}", addr, UPLOAD_ROUTE);

        axum::serve(listener, router(self.state.clone()))
            .await
            .map_err(|e| KeydropError::Http(e.to_string()))?;

        Ok(())
    }
}

/// Build the application router: the upload route (GET and POST), its
/// `/upload` alias, and a health check.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(UPLOAD_ROUTE, get(handler::upload).post(handler::upload))
        .route("/upload", get(handler::upload).post(handler::upload))
        .route("/health", get(handler::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Shared, immutable per-process state
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<dyn SecretResolver>,
    pub uploader: Arc<dyn Uploader>,
    pub job: Arc<TransferJob>,
}

impl AppState {
    pub fn new(
        resolver: Arc<dyn SecretResolver>,
        uploader: Arc<dyn Uploader>,
        job: TransferJob,
    ) -> Self {
        Self {
            resolver,
            uploader,
            job: Arc::new(job),
        }
    }
}
