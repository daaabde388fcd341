//! Ephemeral harness server
//!
//! One [`ServerSession`] lives for exactly one test run. `/` serves the
//! harness document, every other path is resolved against the run's server
//! roots.

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use specrun_common::{Error, Result, ServerRoots};

use crate::resolver::{self, Resolved};

/// How long in-flight requests may take to drain on stop
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Body of every 404
pub const NOT_FOUND_BODY: &str = "Not found";

/// Configuration for one server session
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (0 = pick a free port)
    pub port: u16,

    /// Roots searched for every path other than `/`
    pub roots: ServerRoots,

    /// Document served at `/`
    pub entry_document: PathBuf,

    /// Icon served at `/favicon.ico`, if any
    pub favicon: Option<PathBuf>,
}

struct ServerState {
    roots: ServerRoots,
    entry_document: PathBuf,
    favicon: Option<PathBuf>,
}

/// Handle to a listening server
pub struct ServerSession {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerSession {
    /// Bind the listener and start serving.
    ///
    /// Returns once the socket is bound, so the server accepts connections
    /// as soon as this resolves. A port already in use fails here.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let requested = SocketAddr::from(([127, 0, 0, 1], config.port));
        let listener = tokio::net::TcpListener::bind(requested)
            .await
            .map_err(|source| Error::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener.local_addr()?;

        let state = Arc::new(ServerState {
            roots: config.roots,
            entry_document: config.entry_document,
            favicon: config.favicon,
        });
        let app = router(state);

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        });

        info!("Jasmine server listening on port {}", addr.port());

        Ok(Self {
            addr,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL handed to the browser; names the bound address so it never
    /// depends on how `localhost` resolves
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Stop the server. Stopping a stopped session is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(shutdown) = self.shutdown.take() else {
            return Ok(());
        };

        info!("Stopping server on {}", self.addr);
        let _ = shutdown.send(());

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => return Err(Error::Io(e)),
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => return Err(Error::Server(e.to_string())),
                Err(_) => {
                    warn!("Server did not drain within {:?}; aborting", SHUTDOWN_GRACE);
                    abort.abort();
                }
            }
        }

        Ok(())
    }

    /// Wait for the server to exit on its own.
    ///
    /// Nothing stops a session except [`stop`](Self::stop), so for a live
    /// session this only resolves if serving fails.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let result = task.await;
        self.shutdown = None;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(e) => Err(Error::Server(e.to_string())),
        }
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(entry_handler))
        .route("/favicon.ico", get(favicon_handler))
        .fallback(resource_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn entry_handler(State(state): State<Arc<ServerState>>) -> Response {
    match tokio::fs::read(&state.entry_document).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(
                "Failed to read harness document {}: {}",
                state.entry_document.display(),
                e
            );
            not_found()
        }
    }
}

async fn favicon_handler(State(state): State<Arc<ServerState>>) -> Response {
    let Some(path) = state.favicon.as_ref() else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let mime = resolver::content_type(path);
            (StatusCode::OK, [(header::CONTENT_TYPE, mime)], bytes).into_response()
        }
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn resource_handler(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return not_found();
    }

    let raw = uri.path().trim_start_matches('/');
    let Ok(relative) = urlencoding::decode(raw) else {
        debug!("Undecodable request path {}", uri.path());
        return not_found();
    };

    match resolver::resolve(&state.roots, &relative).await {
        Some(Resolved { content, mime, .. }) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, mime)], content).into_response()
        }
        None => {
            debug!("Not found: {}", uri.path());
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    async fn start_in(dir: &std::path::Path) -> ServerSession {
        fs::write(dir.join("runner.html"), "<html>harness</html>").unwrap();
        ServerSession::start(ServerConfig {
            port: 0,
            roots: ServerRoots::new([dir.join("fixtures")]),
            entry_document: dir.join("runner.html"),
            favicon: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_root_serves_entry_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = start_in(dir.path()).await;

        for path in ["/", "/?spec=Foo%20bar"] {
            let resp = reqwest::get(format!("{}{}", server.url(), path)).await.unwrap();
            assert_eq!(resp.status(), 200);
            assert_eq!(resp.headers()["content-type"], "text/html");
            assert_eq!(resp.text().await.unwrap(), "<html>harness</html>");
        }

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_resources_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("fixtures/lib")).unwrap();
        fs::write(dir.path().join("fixtures/lib/app.js"), "var app;").unwrap();
        let mut server = start_in(dir.path()).await;

        let resp = reqwest::get(format!("{}/lib/app.js", server.url())).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "application/javascript");
        assert_eq!(resp.text().await.unwrap(), "var app;");

        let resp = reqwest::get(format!("{}/lib/missing.js", server.url())).await.unwrap();
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.text().await.unwrap(), NOT_FOUND_BODY);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_url_names_bound_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = start_in(dir.path()).await;
        assert_eq!(
            server.url(),
            format!("http://127.0.0.1:{}", server.local_addr().port())
        );
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_favicon_is_served() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("runner.html"), "<html>harness</html>").unwrap();
        fs::write(dir.path().join("jasmine_favicon.png"), b"\x89PNG\r\n").unwrap();
        let mut server = ServerSession::start(ServerConfig {
            port: 0,
            roots: ServerRoots::default(),
            entry_document: dir.path().join("runner.html"),
            favicon: Some(dir.path().join("jasmine_favicon.png")),
        })
        .await
        .unwrap();

        let resp = reqwest::get(format!("{}/favicon.ico", server.url())).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "image/png");
        assert_eq!(resp.bytes().await.unwrap().as_ref(), b"\x89PNG\r\n");

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_favicon_is_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = start_in(dir.path()).await;

        let resp = reqwest::get(format!("{}/favicon.ico", server.url())).await.unwrap();
        assert_eq!(resp.status(), 204);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = start_in(dir.path()).await;
        assert!(server.is_running());

        server.stop().await.unwrap();
        assert!(!server.is_running());
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_port_conflict_fails_at_bind() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = start_in(dir.path()).await;

        let second = ServerSession::start(ServerConfig {
            port: first.local_addr().port(),
            roots: ServerRoots::default(),
            entry_document: dir.path().join("runner.html"),
            favicon: None,
        })
        .await;
        assert!(matches!(second, Err(Error::Bind { .. })));

        first.stop().await.unwrap();
    }
}
