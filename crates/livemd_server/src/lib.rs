//! Browser preview for livemd.
//!
//! [`PreviewServer`] serves a shell page embedding the rendered document and
//! pushes updates to it over a WebSocket. The [`BrowserSink`] it owns is the
//! [`livemd_core::DisplaySink`] the document is rendered to.

mod sink;

pub use sink::BrowserSink;

use sink::PreviewState;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open the browser: {0}")]
    Browser(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The handler for the HTTP request (this gets called when the HTTP GET lands at the start
/// of websocket negotiation). After this completes, the actual switching from HTTP to
/// websocket protocol will occur. A plain GET is answered with the shell page.
async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    Extension(sink): Extension<Arc<BrowserSink>>,
) -> impl IntoResponse {
    if let Some(ws) = ws {
        ws.on_upgrade(|ws| async move { handle_websocket(ws, sink).await })
    } else {
        (StatusCode::OK, Html(sink.shell().to_string())).into_response()
    }
}

/// Serves the current page, embedded by the shell.
async fn page_handler(Extension(sink): Extension<Arc<BrowserSink>>) -> impl IntoResponse {
    match sink.current_page() {
        Some(page) => (StatusCode::OK, Html(page.to_string())).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "The document is still loading").into_response(),
    }
}

/// Message for a client showing `last_revision`, with the revision it brings the client to.
fn next_message(
    state_rx: &mut watch::Receiver<PreviewState>,
    last_revision: Option<u64>,
) -> Option<(serde_json::Value, u64)> {
    let state = state_rx.borrow_and_update();
    sink::outgoing_message(&state, last_revision).map(|msg| (msg, state.revision))
}

async fn handle_websocket(mut socket: WebSocket, sink: Arc<BrowserSink>) {
    let mut state_rx = sink.subscribe();
    let mut last_revision = None;

    // Bring the new client up to date first.
    let mut pending = next_message(&mut state_rx, last_revision);

    loop {
        if let Some((msg, revision)) = pending.take() {
            if socket.send(WsMessage::Text(msg.to_string())).await.is_err() {
                break;
            }
            last_revision = Some(revision);
        }

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                pending = next_message(&mut state_rx, last_revision);
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => sink.handle_client_message(&text),
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(?err, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    let _ = socket.send(WsMessage::Close(None)).await;
    tracing::debug!("Browser disconnected");
}

fn router(sink: Arc<BrowserSink>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/page", get(page_handler))
        .layer(Extension(sink))
}

/// HTTP server of the browser preview.
#[derive(Debug)]
pub struct PreviewServer {
    listener: tokio::net::TcpListener,
    local_addr: SocketAddr,
    sink: Arc<BrowserSink>,
}

impl PreviewServer {
    /// Binds the server, `port` 0 picks a free port.
    pub async fn bind(host: &str, port: u16, sink: Arc<BrowserSink>) -> Result<Self, ServerError> {
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        tracing::debug!("Listening on {listener:?}");

        Ok(Self {
            listener,
            local_addr,
            sink,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn open_in_browser(&self) -> Result<(), ServerError> {
        webbrowser::open(&self.url()).map_err(ServerError::Browser)
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let app = router(self.sink);

        axum::serve(self.listener, app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
