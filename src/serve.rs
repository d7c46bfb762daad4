//! HTTP server exposing the scanner and renderer as a JSON API.
//!
//! Every JSON response uses the `{success, data | error}` envelope. Path
//! parameters are policed before any filesystem access: traversal and
//! absolute paths are rejected with 403, a missing path with 400.

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Path as UrlPath, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use maud::html;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_livereload::LiveReloadLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::Error;
use crate::render::{Renderer, extract_table_of_contents};
use crate::scanner::{Scanner, unix_millis};
use crate::watch::Watcher;

struct AppState {
    config: Arc<Config>,
    scanner: Arc<Scanner>,
    renderer: Arc<Renderer>,
    watcher: Arc<Watcher>,
    started: Instant,
    limiter: RateLimiter,
}

/// Starts the server. With `watch` the filesystem watcher begins
/// immediately; either way it can be toggled over the API.
pub async fn serve(config: Config, watch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let scanner = Arc::new(Scanner::new(Arc::clone(&config)));
    let renderer = Arc::new(Renderer::new(Arc::clone(&config)));
    let watcher = Arc::new(Watcher::new(Arc::clone(&config)));

    let livereload = LiveReloadLayer::new();
    let reloader = livereload.reloader();

    // Filesystem changes invalidate both caches and refresh the browser.
    {
        let scanner = Arc::clone(&scanner);
        let renderer = Arc::clone(&renderer);
        let reloader = reloader.clone();
        watcher.add_listener(Box::new(move |event| {
            let rel = event.path.to_string_lossy().replace('\\', "/");
            info!("{}: {rel}", event.kind.as_str());
            scanner.invalidate();
            renderer.invalidate(Some(&rel));
            reloader.reload();
            Ok(())
        }));
    }

    if watch {
        watcher.start()?;
    }

    let limiter = RateLimiter::new(config.rate_limit, config.rate_limit_window());
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        scanner,
        renderer,
        watcher,
        started: Instant::now(),
        limiter,
    });

    let app = router(Arc::clone(&state), livereload);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "serving {} at http://localhost:{}",
        config.root_path.display(),
        config.port
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn router(state: Arc<AppState>, livereload: LiveReloadLayer) -> Router {
    let mut app = Router::new()
        .route("/", get(index))
        .route("/api/tree", get(get_tree))
        .route("/api/file", get(missing_path))
        .route("/api/file/{*path}", get(get_file))
        .route("/api/search", get(search))
        .route("/api/metadata", get(missing_path))
        .route("/api/metadata/{*path}", get(get_metadata))
        .route("/api/health", get(health))
        .route("/api/cache/clear", post(clear_cache))
        .route("/api/watch/start", post(watch_start))
        .route("/api/watch/stop", post(watch_stop));

    if let Some(dir) = &state.config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(livereload)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                rate_limit,
            )),
    )
    .with_state(state)
}

fn ok(data: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

fn error_response(err: &Error) -> Response {
    match err {
        Error::NotFound { .. } => fail(StatusCode::NOT_FOUND, "File not found"),
        Error::InvalidPath(_) => fail(StatusCode::FORBIDDEN, "Access denied: invalid file path"),
        _ => fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    }
}

/// Rejects traversal attempts and absolute paths before any filesystem
/// access happens.
fn sanitize_rel_path(raw: &str) -> Result<String, Error> {
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') || Path::new(&normalized).is_absolute() {
        return Err(Error::InvalidPath(raw.to_string()));
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(Error::InvalidPath(raw.to_string()));
    }
    Ok(normalized.trim_end_matches('/').to_string())
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let page = html! {
        (maud::DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "Markdown Server" }
            }
            body {
                h1 { "Markdown Server" }
                p { "Serving markdown from " code { (state.config.root_path.display()) } }
                p { a href="/api/tree" { "Directory tree" } }
            }
        }
    };
    Html(page.into_string())
}

async fn get_tree(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tree = state.scanner.tree();
    Json(json!({
        "success": true,
        "data": &*tree,
        "rootPath": state.config.root_path.display().to_string(),
    }))
}

async fn missing_path() -> Response {
    fail(StatusCode::BAD_REQUEST, "File path is required")
}

async fn get_file(State(state): State<Arc<AppState>>, UrlPath(raw): UrlPath<String>) -> Response {
    let rel = match sanitize_rel_path(&raw) {
        Ok(rel) => rel,
        Err(err) => return error_response(&err),
    };
    if rel.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "File path is required");
    }

    match state.renderer.render_file(&rel) {
        Ok(html) => {
            let toc = extract_table_of_contents(&html);
            ok(json!({
                "html": html,
                "filePath": rel,
                "tableOfContents": toc,
            }))
            .into_response()
        }
        Err(err) => {
            if !err.is_not_found() {
                error!("failed to render {rel}: {err}");
            }
            error_response(&err)
        }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.unwrap_or_default();
    let trimmed = query.trim();
    if trimmed.chars().count() < 2 {
        return fail(
            StatusCode::BAD_REQUEST,
            "Search query must be at least 2 characters long",
        );
    }

    let results = state.scanner.search(trimmed);
    let total = results.len();
    ok(json!({
        "query": trimmed,
        "results": results,
        "total": total,
    }))
    .into_response()
}

async fn get_metadata(
    State(state): State<Arc<AppState>>,
    UrlPath(raw): UrlPath<String>,
) -> Response {
    let rel = match sanitize_rel_path(&raw) {
        Ok(rel) => rel,
        Err(err) => return error_response(&err),
    };
    if rel.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "File path is required");
    }

    let full = state.config.root_path.join(&rel);
    let metadata = match fs::metadata(&full) {
        Ok(metadata) => metadata,
        Err(err) => return error_response(&Error::from_io(&full, err)),
    };

    ok(json!({
        "path": rel,
        "size": metadata.len(),
        "modified": metadata.modified().map(unix_millis).ok(),
        "created": metadata.created().map(unix_millis).ok(),
        "isDirectory": metadata.is_dir(),
        "isFile": metadata.is_file(),
    }))
    .into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    ok(json!({
        "status": "healthy",
        "uptimeSecs": state.started.elapsed().as_secs(),
        "watching": state.watcher.is_active(),
        "config": {
            "rootPath": state.config.root_path.display().to_string(),
            "supportedExtensions": &state.config.extensions,
        },
        "cache": {
            "scanner": state.scanner.cache_size(),
            "renderer": state.renderer.cache_size(),
        },
    }))
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.scanner.invalidate();
    state.renderer.invalidate(None);
    Json(json!({ "success": true, "message": "Cache cleared successfully" }))
}

async fn watch_start(State(state): State<Arc<AppState>>) -> Response {
    match state.watcher.start() {
        Ok(()) => Json(json!({ "success": true, "message": "File watching started" }))
            .into_response(),
        Err(err) => {
            error!("failed to start file watching: {err}");
            fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start file watching",
            )
        }
    }
}

async fn watch_stop(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.watcher.stop();
    Json(json!({ "success": true, "message": "File watching stopped" }))
}

/// Fixed-window request limiter keyed by client address.
struct RateLimiter {
    max: u32,
    window: Duration,
    state: Mutex<RateWindow>,
}

struct RateWindow {
    started: Instant,
    counts: HashMap<IpAddr, u32>,
}

impl RateLimiter {
    fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            state: Mutex::new(RateWindow {
                started: Instant::now(),
                counts: HashMap::new(),
            }),
        }
    }

    fn allow(&self, ip: IpAddr) -> bool {
        let mut window = self.state.lock().unwrap();
        if window.started.elapsed() >= self.window {
            window.started = Instant::now();
            window.counts.clear();
        }
        let count = window.counts.entry(ip).or_insert(0);
        *count += 1;
        *count <= self.max
    }
}

async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter.allow(addr.ip()) {
        return fail(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, please try again later",
        );
    }
    next.run(request).await
}
