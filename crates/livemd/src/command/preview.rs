use crate::app::Args;
use anyhow::Result;
use clap::Parser;
use dirs::Dirs;
use livemd_core::{
    display_title, is_markdown_path, RenderOrchestrator, RendererKind, ScrollStateStore,
};
use livemd_server::{BrowserSink, PreviewServer, ServerError};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};

/// Grace period for the server to finish in-flight requests on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Starts the browser preview of a markdown file.
#[derive(Parser, Debug, Clone)]
pub struct Preview {
    /// Markdown file to preview.
    pub file: PathBuf,

    /// Port to listen on, overrides `port` of the `[server]` config section.
    #[clap(long)]
    pub port: Option<u16>,

    /// Do not open the preview in the browser.
    #[clap(long)]
    pub no_browser: bool,

    /// Render with the GitHub Flavored Markdown backend.
    #[clap(long)]
    pub gfm: bool,
}

type Serving = JoinHandle<Result<(), ServerError>>;

/// Why the preview is shutting down.
#[derive(Debug)]
enum Exit {
    Interrupted,
    ServerStopped(Result<Result<(), ServerError>, JoinError>),
}

/// Waits for Ctrl-C, or for the server to stop on its own.
async fn wait_for_exit(
    interrupt: impl Future<Output = std::io::Result<()>>,
    serving: &mut Serving,
) -> Exit {
    tokio::select! {
        signal = interrupt => {
            tracing::debug!("Received Ctrl-C, shutting down");
            if let Err(err) = signal {
                tracing::error!(?err, "Failed to listen for Ctrl-C");
            }
            Exit::Interrupted
        }
        res = serving => {
            tracing::error!(?res, "Preview server stopped unexpectedly");
            Exit::ServerStopped(res)
        }
    }
}

fn open_scroll_store() -> ScrollStateStore {
    match Dirs::scroll_state_file() {
        Ok(file) => ScrollStateStore::open(file),
        Err(err) => {
            tracing::warn!(%err, "Scroll positions will not be persisted");
            ScrollStateStore::in_memory()
        }
    }
}

impl Preview {
    pub async fn run(self, args: Args) -> Result<()> {
        let (config, config_err) = livemd_config::load_config_on_startup(args.config_file.clone());

        let _guard = crate::logging::init(args.log, &config.log)?;

        if let Some(err) = config_err {
            tracing::warn!(%err, "Failed to parse the config file, using the defaults");
        }
        tracing::debug!(config_file = ?livemd_config::config_file(), "Loaded config");

        if !is_markdown_path(&self.file) {
            tracing::warn!(path = %self.file.display(), "Not a markdown file, rendering anyway");
        }

        let mut orchestrator_config = config.preview.orchestrator_config();
        if self.gfm {
            orchestrator_config.renderer = RendererKind::Gfm;
        }

        let scroll_store = Arc::new(open_scroll_store());
        let orchestrator = RenderOrchestrator::new(orchestrator_config, scroll_store.clone());

        let sink = Arc::new(BrowserSink::new(&display_title(&self.file)));
        let server = PreviewServer::bind(
            &config.server.host,
            self.port.unwrap_or(config.server.port),
            sink.clone(),
        )
        .await?;

        println!("Previewing {} at {}", self.file.display(), server.url());

        if config.server.open_browser && !self.no_browser {
            if let Err(err) = server.open_in_browser() {
                tracing::warn!(%err, "Open {} manually", server.url());
            }
        }

        let document = orchestrator.open(&self.file, sink);
        if !document.is_watching() {
            eprintln!("warning: live reload is unavailable for {}", document.path().display());
        }

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let mut serving = tokio::spawn(server.serve(async move {
            let _ = shutdown_rx.await;
        }));

        let exit = wait_for_exit(tokio::signal::ctrl_c(), &mut serving).await;

        document.close().await;

        if let Err(err) = scroll_store.flush() {
            tracing::warn!(%err, "Failed to save scroll positions");
        }

        match exit {
            Exit::ServerStopped(res) => {
                res??;
                anyhow::bail!("preview server stopped unexpectedly");
            }
            Exit::Interrupted => {
                let _ = shutdown_tx.send(());
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, serving).await {
                    Ok(res) => res??,
                    Err(_) => tracing::debug!("Server did not shut down in time"),
                }
            }
        }

        Ok(())
    }
}
