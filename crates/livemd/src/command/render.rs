use crate::app::Args;
use anyhow::{Context, Result};
use clap::Parser;
use livemd_config::Config;
use livemd_core::document::absolute_document_path;
use livemd_core::loader::FsReader;
use livemd_core::{DocumentLoader, HtmlPage, RendererKind};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Renders a markdown file once, without watching it.
#[derive(Parser, Debug, Clone)]
pub struct Render {
    /// Markdown file to render.
    pub file: PathBuf,

    /// Write the page to this file instead of stdout.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Render with the GitHub Flavored Markdown backend.
    #[clap(long)]
    pub gfm: bool,
}

impl Render {
    pub async fn run(self, args: Args) -> Result<()> {
        let (config, config_err) = livemd_config::load_config_on_startup(args.config_file.clone());

        let _guard = crate::logging::init(args.log, &config.log)?;

        if let Some(err) = config_err {
            tracing::warn!(%err, "Failed to parse the config file, using the defaults");
        }
        tracing::debug!(config_file = ?livemd_config::config_file(), "Loaded config");

        let page = self.render_page(config).await?;

        match &self.output {
            Some(output) => {
                tokio::fs::write(output, page.as_str())
                    .await
                    .with_context(|| format!("failed to write {}", output.display()))?;
                tracing::debug!(output = %output.display(), "Wrote rendered page");
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(page.as_str().as_bytes())?;
                stdout.flush()?;
            }
        }

        Ok(())
    }

    async fn render_page(&self, config: &Config) -> Result<HtmlPage> {
        let path = absolute_document_path(&self.file)?;

        let loader = DocumentLoader::new(
            Arc::new(FsReader),
            config.preview.orchestrator_config().retry,
        );
        let markdown = loader.load(&path).await?;

        let renderer = if self.gfm {
            RendererKind::Gfm
        } else {
            config.preview.renderer
        };
        let base_dir = path.parent().unwrap_or(&path);

        Ok(livemd_core::render_page(&markdown, base_dir, renderer))
    }
}
