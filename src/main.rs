//! UploadGate server binary.
//!
//! Stores, lists and deletes files under a single base directory over HTTP.
//! Client paths are resolved against the canonical base directory, uploads
//! get randomized stored names and are streamed to disk under a size
//! ceiling, and mutating routes are guarded by a shared-secret token.

mod auth;
mod config;
mod error;
mod files;
mod http;
mod locking;
mod logging;
mod metrics;
mod storage;
mod upload;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{delete, get, put};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span, warn};

use crate::auth::AuthConfig;
use crate::config::Args;
use crate::http::{build_cors_layer, resolve_client_ip};
use crate::locking::LockManager;
use crate::metrics::Counters;
use crate::storage::Storage;
use crate::upload::UploadConfig;

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    storage: Arc<Storage>,
    auth: Arc<AuthConfig>,
    upload: Arc<UploadConfig>,
    locks: Arc<LockManager>,
    counters: Arc<Counters>,
}

/// Starts the UploadGate server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::open(&args.data_dir).await?);
    let auth = Arc::new(AuthConfig::new(&args.upload_token));
    if !auth.is_enabled() {
        warn!("UPLOAD_TOKEN is not set, authentication is disabled (development mode)");
    }
    let state = AppState {
        storage,
        auth,
        upload: Arc::new(UploadConfig {
            max_bytes: args.max_upload_bytes,
        }),
        locks: Arc::new(LockManager::new()),
        counters: Arc::new(Counters::default()),
    };
    info!(
        data_dir = ?state.storage.root_path(),
        max_upload_bytes = args.max_upload_bytes,
        "storage ready"
    );

    let mut app = build_router(state);
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("Starting HTTP server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(metrics::health))
        .route("/metrics", get(metrics::get_metrics))
        .route("/list", get(files::list_files))
        .route("/files/", delete(files::delete_file))
        .route("/files/{*path}", delete(files::delete_file))
        .route(
            "/upload/",
            put(upload::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/upload/{*path}",
            put(upload::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(Extension(state.storage))
        .layer(Extension(state.auth))
        .layer(Extension(state.upload))
        .layer(Extension(state.locks))
        .layer(Extension(state.counters))
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
