use dirs::Dirs;
use livemd_core::{OrchestratorConfig, RendererKind, RetryPolicy, WatcherConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<ConfigInner> = OnceLock::new();

#[derive(Debug)]
struct ConfigInner {
    config: Config,
    file_path: Option<PathBuf>,
}

struct LoadedConfig {
    config: Config,
    file_path: Option<PathBuf>,
    maybe_error: Option<toml::de::Error>,
}

/// Default location of the config file.
///
/// Linux: ~/.config/livemd/config.toml
/// macOS: ~/Library/Application\ Support/org.livemd.livemd/config.toml
/// Windows: ~\AppData\Roaming\livemd\livemd\config\config.toml
pub fn default_config_file() -> Option<PathBuf> {
    Dirs::config_dir().map(|dir| dir.join("config.toml"))
}

fn load_config(specified_config_file: Option<PathBuf>) -> LoadedConfig {
    let config_file = specified_config_file.or_else(default_config_file);

    let mut maybe_error = None;
    let config = config_file
        .as_deref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|contents| {
            toml::from_str::<Config>(&contents)
                .map_err(|err| {
                    maybe_error.replace(err);
                })
                .ok()
        })
        .unwrap_or_default();

    LoadedConfig {
        config,
        file_path: config_file,
        maybe_error,
    }
}

/// Initializes the global [`Config`].
///
/// A missing config file yields the defaults. A malformed one also yields the
/// defaults, the parse error is returned for the caller to report.
pub fn load_config_on_startup(
    specified_config_file: Option<PathBuf>,
) -> (&'static Config, Option<toml::de::Error>) {
    let LoadedConfig {
        config,
        file_path,
        maybe_error,
    } = load_config(specified_config_file);

    let inner = CONFIG.get_or_init(|| ConfigInner { config, file_path });

    (&inner.config, maybe_error)
}

/// Path of the config file in use, if any.
pub fn config_file() -> Option<&'static Path> {
    CONFIG.get().and_then(|inner| inner.file_path.as_deref())
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LogConfig {
    /// Specify the log file path.
    ///
    /// This path must be an absolute path.
    pub log_file: Option<String>,

    /// Specify the max log level.
    pub max_level: String,

    /// Specify the log target to enable more detailed logging.
    ///
    /// ```toml
    /// [log]
    /// log-target = "livemd_core::orchestrator=trace"
    /// ```
    pub log_target: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            max_level: "info".into(),
            log_target: "".into(),
        }
    }
}

/// Live reload behaviour.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Quiet period in milliseconds after the last change before re-rendering.
    pub debounce_ms: u64,

    /// Number of extra attempts when reading the document fails.
    pub retry_attempts: usize,

    /// The n-th retry waits `n * retry-step-ms` milliseconds.
    pub retry_step_ms: u64,

    /// Polling interval in milliseconds, used when native file watching is unavailable.
    pub poll_interval_ms: u64,

    /// Markdown backend, `"tree"` or `"gfm"`.
    pub renderer: RendererKind,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            retry_attempts: 3,
            retry_step_ms: 50,
            poll_interval_ms: 1000,
            renderer: RendererKind::Tree,
        }
    }
}

impl PreviewConfig {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            retry: RetryPolicy {
                max_retries: self.retry_attempts,
                step: Duration::from_millis(self.retry_step_ms),
            },
            renderer: self.renderer,
            watcher: WatcherConfig {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
        }
    }
}

/// Browser preview server.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub host: String,

    /// Port to listen on, 0 picks a free port.
    pub port: u16,

    /// Whether to open the preview in the default browser.
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            open_browser: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Log configuration.
    pub log: LogConfig,

    /// Live reload configuration.
    pub preview: PreviewConfig,

    /// Browser preview configuration.
    pub server: ServerConfig,
}
