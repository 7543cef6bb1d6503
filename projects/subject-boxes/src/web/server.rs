use crate::cli::ServeArgs;
use crate::jobs::JobQueue;
use crate::pipeline::build_pipeline;
use crate::pipeline::types::Thresholds;
use crate::storage::reaper::Reaper;
use crate::storage::StorageLayout;
use crate::web::api::{download_handler, list_processed_handler, upload_handler};
use crate::web::form::index_handler;
use anyhow::Result;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Shared by all handlers.
pub struct AppState {
    pub layout: StorageLayout,
    pub jobs: JobQueue,
    pub defaults: Thresholds,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler).post(upload_handler))
        .route("/processed/*name", get(download_handler))
        .route("/api/processed", get(list_processed_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(args: ServeArgs) -> Result<()> {
    let layout = StorageLayout::new(&args.storage_root);
    layout.ensure_dirs()?;

    let ttl = Duration::from_secs(args.file_ttl_secs);
    let reaper = Reaper::new(layout.root(), ttl).spawn();
    info!(
        "Reaper started on {} with ttl {}s",
        layout.root().display(),
        ttl.as_secs()
    );

    let models = args.models.clone();
    let jobs =
        tokio::task::spawn_blocking(move || JobQueue::start(move || build_pipeline(&models)))
            .await??;

    let state = Arc::new(AppState {
        layout,
        jobs,
        defaults: args.thresholds.thresholds(),
    });

    let listener = bind_first_free(args.host, args.port)?;
    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Subject Boxes server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    let served = axum::serve(tokio_listener, router(state)).await;
    reaper.abort();
    served?;

    Ok(())
}

fn bind_first_free(host: IpAddr, port: u16) -> Result<TcpListener> {
    let mut current_port = port;
    loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Tokio requires non-blocking std listeners.
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                return Ok(listener);
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port
                    .checked_add(1)
                    .ok_or_else(|| anyhow::anyhow!("No available ports found"))?;
            }
        }
    }
}
