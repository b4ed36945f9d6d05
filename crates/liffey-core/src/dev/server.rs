//! The dev server.
//!
//! Serves the output directory over HTTP, answers mocked routes ahead
//! of static files, and pushes update payloads to connected WebSocket
//! clients after each successful rebuild. Rebuilds are driven by the
//! coalescing watcher; changes arriving while a rebuild is running
//! supersede its result, which is discarded unbroadcast and the rebuild
//! rerun with the merged change set.

use crate::bundle::{BuildResult, Bundler};
use crate::config::BundlerConfig;
use crate::dev::mock::MockTable;
use crate::dev::watch;
use crate::emit::ChunkManifestEntry;
use crate::error::{BuildError, Result};
use axum::body::Body;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

/// WebSocket route clients subscribe to for updates.
pub const UPDATE_ROUTE: &str = "/__liffey_ws";

/// POST here to force a rebuild, the fallback when watching is
/// unavailable.
pub const REBUILD_ROUTE: &str = "/__liffey_rebuild";

/// One push to connected clients after a successful rebuild.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    /// Stable ids of added, changed and removed modules.
    pub changed_module_ids: Vec<String>,
    /// Stable id → fresh transformed code.
    pub new_code: BTreeMap<String, String>,
    /// Chunk manifest entries that changed, keyed by chunk name.
    pub chunk_manifest_delta: BTreeMap<String, ChunkManifestEntry>,
}

struct ServerState {
    out_dir: PathBuf,
    mocks: Option<MockTable>,
    updates: broadcast::Sender<String>,
    /// Batches of changed paths; an empty batch means a forced rebuild.
    triggers: tokio::sync::mpsc::Sender<Vec<PathBuf>>,
}

/// Build once, then serve and rebuild on changes until shutdown.
///
/// # Errors
/// Returns startup failures (config, mock table, bind). Build errors
/// after startup are logged and the server keeps running.
pub async fn run(config: BundlerConfig) -> Result<()> {
    let mocks = match &config.dev.mocks {
        Some(rel) => {
            let path = if rel.is_absolute() {
                rel.clone()
            } else {
                config.root.join(rel)
            };
            let table = MockTable::load(&path)?;
            tracing::info!(fixtures = table.len(), "mock table loaded");
            Some(table)
        }
        None => None,
    };

    let host = config.dev.host.clone();
    let port = config.dev.port;
    let root = config.root.clone();
    let out_dir = config.out_dir_abs();
    let cache_dir = config.cache_dir_abs();
    let coalesce = Duration::from_millis(config.dev.coalesce_ms);

    let bundler = Arc::new(Bundler::new(config)?);
    let initial = {
        let bundler = Arc::clone(&bundler);
        tokio::task::spawn_blocking(move || bundler.build())
            .await
            .map_err(|e| BuildError::other(e.to_string()))??
    };
    if !initial.success() {
        for error in &initial.diagnostics.errors {
            tracing::error!("{error}");
        }
        tracing::warn!("initial build failed; serving last good output if any");
    }

    let (updates, _) = broadcast::channel(64);
    let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel::<Vec<PathBuf>>(16);
    let state = Arc::new(ServerState {
        out_dir,
        mocks,
        updates,
        triggers: trigger_tx.clone(),
    });

    let mut ignore = vec![state.out_dir.clone()];
    if let Some(dir) = cache_dir {
        ignore.push(dir);
    }
    match watch::start(&root, ignore, coalesce) {
        Ok(mut watcher) => {
            // Forward watch batches into the trigger channel; manual
            // rebuild requests share the same path.
            tokio::spawn(async move {
                while let Some(batch) = watcher.rx.recv().await {
                    if trigger_tx.send(batch).await.is_err() {
                        break;
                    }
                }
            });
        }
        Err(warning) => tracing::warn!("{warning}"),
    }
    tokio::spawn(rebuild_loop(
        trigger_rx,
        Arc::clone(&bundler),
        initial,
        Arc::clone(&state),
    ));

    let app = Router::new()
        .route("/", get(index_handler))
        .route(UPDATE_ROUTE, get(ws_handler))
        .route(REBUILD_ROUTE, post(rebuild_handler))
        .fallback(get(request_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!("dev server listening on http://{host}:{port}");
    axum::serve(listener, app)
        .await
        .map_err(|e| BuildError::other(e.to_string()))?;
    Ok(())
}

async fn rebuild_loop(
    mut triggers: tokio::sync::mpsc::Receiver<Vec<PathBuf>>,
    bundler: Arc<Bundler>,
    mut previous: BuildResult,
    state: Arc<ServerState>,
) {
    while let Some(mut batch) = triggers.recv().await {
        loop {
            // Merge anything already queued before starting.
            while let Ok(more) = triggers.try_recv() {
                batch.extend(more);
            }
            tracing::debug!(changed = batch.len(), "rebuilding");

            let worker = Arc::clone(&bundler);
            let handle = tokio::task::spawn_blocking(move || {
                let outcome = worker.rebuild(&previous);
                (previous, outcome)
            });
            let Ok((prev, outcome)) = handle.await else {
                return;
            };
            previous = prev;

            match outcome {
                Ok((current, diff)) => {
                    // Superseded: new changes arrived during the
                    // rebuild. Discard this result unbroadcast and
                    // keep diffing against the last broadcast build.
                    if let Ok(more) = triggers.try_recv() {
                        batch.extend(more);
                        continue;
                    }
                    // Only a broadcast build may become the diff
                    // baseline; adopting a failed build would hide its
                    // changes from the next successful payload.
                    if current.success() {
                        let payload = UpdatePayload {
                            changed_module_ids: diff.changed_module_ids,
                            new_code: diff.new_code,
                            chunk_manifest_delta: current.manifest.delta(&previous.manifest),
                        };
                        broadcast_update(&state, &payload);
                        previous = current;
                    } else {
                        for error in &current.diagnostics.errors {
                            tracing::error!("{error}");
                        }
                    }
                }
                Err(e) => tracing::error!("rebuild failed: {e}"),
            }
            break;
        }
    }
}

fn broadcast_update(state: &ServerState, payload: &UpdatePayload) {
    if payload.changed_module_ids.is_empty() && payload.chunk_manifest_delta.is_empty() {
        return;
    }
    match serde_json::to_string(payload) {
        Ok(text) => {
            let receivers = state.updates.send(text).unwrap_or(0);
            tracing::info!(
                modules = payload.changed_module_ids.len(),
                clients = receivers,
                "update broadcast"
            );
        }
        Err(e) => tracing::error!("payload serialization failed: {e}"),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.updates.subscribe();
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "slow update client");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Drain (and notice the close of) the client side.
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}

async fn rebuild_handler(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.triggers.send(Vec::new()).await.is_ok() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn index_handler(State(state): State<Arc<ServerState>>) -> Response {
    serve_file(&state.out_dir.join("index.html")).await
}

async fn request_handler(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let path = uri.path();

    // Mocks take precedence over everything static.
    if let Some(mock) = state.mocks.as_ref().and_then(|m| m.lookup(path)) {
        return Response::builder()
            .status(mock.status)
            .header(header::CONTENT_TYPE, mock.content_type.clone())
            .body(Body::from(mock.body.clone()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    let relative = path.trim_start_matches('/');
    if relative.split('/').any(|seg| seg == "..") {
        return StatusCode::NOT_FOUND.into_response();
    }
    serve_file(&state.out_dir.join(relative)).await
}

async fn serve_file(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type_for(path))
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("html") => "text/html; charset=utf-8",
        Some("js" | "mjs") => "text/javascript",
        Some("css") => "text/css",
        Some("json" | "map") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
