//! Development server implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kiln_tasks::{BuildReport, GlobPattern, Scheduler, TaskGraph, TaskStatus};
use tokio::sync::{broadcast, mpsc};
use tower_http::services::ServeDir;

use crate::livereload::{inject_script, ReloadHub, ReloadMessage, CLIENT_SCRIPT, SCRIPT_PATH, SOCKET_PATH};
use crate::watcher::{FileWatcher, WatchFilter};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Project root
    pub root: PathBuf,

    /// Build output served over HTTP, relative to the root
    pub dest: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open browser on start
    pub open: bool,

    /// Globs whose changes trigger a rebuild
    pub watch: Vec<String>,

    /// Quiet period before a rebuild starts
    pub debounce: Duration,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dest: PathBuf::from("public"),
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: true,
            watch: vec![
                "content/**/*".to_string(),
                "layout/**/*".to_string(),
                "layouts/**/*".to_string(),
                "src/**/*".to_string(),
                "static/**/*".to_string(),
            ],
            debounce: Duration::from_millis(150),
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Invalid watch pattern: {0}")]
    PatternError(String),

    #[error("Server error: {0}")]
    ServeError(String),
}

/// Runs the build targets and turns the result into a reload message.
#[derive(Clone)]
pub struct Rebuilder {
    graph: Arc<TaskGraph>,
    scheduler: Scheduler,
    targets: Vec<String>,
}

impl Rebuilder {
    pub fn new(graph: Arc<TaskGraph>, scheduler: Scheduler, targets: Vec<String>) -> Self {
        Self {
            graph,
            scheduler,
            targets,
        }
    }

    /// Run one build.
    pub async fn build(&self) -> ReloadMessage {
        let targets: Vec<&str> = self.targets.iter().map(String::as_str).collect();

        match self.scheduler.run(&self.graph, &targets).await {
            Ok(report) if report.success() => {
                tracing::info!("Build finished in {} ms", report.duration.as_millis());
                ReloadMessage::Reload
            }
            Ok(report) => {
                let message = failure_summary(&report);
                tracing::error!("Build failed:\n{}", message);
                ReloadMessage::BuildFailed { message }
            }
            Err(e) => {
                tracing::error!("Build failed: {}", e);
                ReloadMessage::BuildFailed {
                    message: e.to_string(),
                }
            }
        }
    }
}

/// One line per task that did not succeed.
fn failure_summary(report: &BuildReport) -> String {
    report
        .failures()
        .map(|task| match &task.status {
            TaskStatus::Failed { error } => format!("{}: {}", task.name, error),
            TaskStatus::Blocked { dependency } => {
                format!("{}: blocked by '{}'", task.name, dependency)
            }
            status => format!("{}: {}", task.name, status.label()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Consume change events, rebuilding once per burst.
///
/// Waits for `debounce` of quiet after the first event, then builds. Events
/// that arrive during a build queue up and fold into the next one, so at
/// most one build runs at a time.
pub async fn rebuild_loop(
    mut changes: mpsc::Receiver<PathBuf>,
    rebuilder: Rebuilder,
    hub: ReloadHub,
    debounce: Duration,
) {
    while let Some(path) = changes.recv().await {
        tracing::info!("Changed: {}", path.display());

        let mut closed = false;
        loop {
            match tokio::time::timeout(debounce, changes.recv()).await {
                Ok(Some(path)) => tracing::debug!("Changed: {}", path.display()),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        hub.send(rebuilder.build().await);

        if closed {
            break;
        }
    }
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    rebuilder: Rebuilder,
    hub: ReloadHub,
}

impl DevServer {
    /// Create a server that rebuilds `rebuilder`'s targets on change.
    pub fn new(config: DevServerConfig, rebuilder: Rebuilder) -> Self {
        Self {
            config,
            rebuilder,
            hub: ReloadHub::new(),
        }
    }

    /// Watch, build once, then rebuild and serve until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        let (watcher, changes) = self.watch_and_build().await?;

        tokio::spawn(rebuild_loop(
            changes,
            self.rebuilder.clone(),
            self.hub.clone(),
            self.config.debounce,
        ));

        let app = router(self.config.root.join(&self.config.dest), self.hub.clone());

        let bind = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| ServerError::BindError(bind.clone(), e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(bind, e.to_string()))?;

        let url = format!("http://{}", addr);
        tracing::info!("Serving {} at {}", self.config.dest.display(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down");
            })
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        drop(watcher);
        Ok(())
    }

    /// Start watching, then run the first build. Edits made while that build
    /// runs are already queued for the rebuild loop.
    async fn watch_and_build(
        &self,
    ) -> Result<(FileWatcher, mpsc::Receiver<PathBuf>), ServerError> {
        let patterns = self
            .config
            .watch
            .iter()
            .map(|p| GlobPattern::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::PatternError(e.to_string()))?;
        let filter = WatchFilter::new(&self.config.root, patterns, &self.config.dest);

        let watching =
            FileWatcher::new(filter).map_err(|e| ServerError::WatchError(e.to_string()))?;

        // Serve whatever the first build produced, even if it failed
        let _ = self.rebuilder.build().await;

        Ok(watching)
    }
}

/// Routes: live reload socket and script, everything else from `dest`.
pub fn router(dest: PathBuf, hub: ReloadHub) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(ws_handler))
        .route(SCRIPT_PATH, get(script_handler))
        .fallback_service(ServeDir::new(dest))
        .layer(map_response(inject_livereload))
        .with_state(hub)
}

/// Handler for the live reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward hub messages to one browser.
async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send_json(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

async fn script_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], CLIENT_SCRIPT)
}

/// Add the live reload script to HTML responses.
async fn inject_livereload(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    // Range and error responses are served as-is
    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = match std::str::from_utf8(&bytes) {
        Ok(text) => inject_script(text),
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}
