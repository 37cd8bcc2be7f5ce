mod app;
mod command;
mod logging;

use app::Args;
use clap::Parser;

#[derive(Parser, Debug)]
pub enum Cmd {
    /// Display the current version.
    #[clap(name = "version")]
    Version,

    /// Preview a markdown file in the browser, re-rendering on every change.
    #[clap(name = "preview")]
    Preview(command::preview::Preview),

    /// Render a markdown file to a standalone HTML page.
    #[clap(name = "render")]
    Render(command::render::Render),
}

#[derive(Parser, Debug)]
#[clap(name = "livemd", disable_version_flag = true)]
pub struct Livemd {
    #[clap(flatten)]
    pub args: Args,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[tokio::main]
async fn main() {
    let livemd = Livemd::parse();

    let res = match livemd.cmd {
        Cmd::Version => {
            println!(
                "version {}, built for {}.",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::ARCH
            );
            Ok(())
        }
        Cmd::Preview(preview) => preview.run(livemd.args).await,
        Cmd::Render(render) => render.run(livemd.args).await,
    };

    if let Err(e) = res {
        eprintln!("error: {e:?}");
        std::process::exit(1);
    }
}
