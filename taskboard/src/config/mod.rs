//! Configuration for the `taskboard` client.
//!
//! Layered, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::PathBuf;
use std::time::Duration;

use taskboard_proto::task::{MAX_TASK_TITLE_LENGTH, UserId};

use crate::cli::Command;
use crate::realtime::socket::SocketConfig;
use crate::search::{DEFAULT_DEBOUNCE, DEFAULT_MIN_QUERY_LEN};
use crate::session::SessionConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting every command needs is missing.
    #[error("missing setting: {0}")]
    Missing(&'static str),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
    board: BoardFileConfig,
    search: SearchFileConfig,
}

/// `[api]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    url: Option<String>,
    token: Option<String>,
    user_id: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

/// `[board]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    project: Option<String>,
    max_task_title_len: Option<usize>,
    notice_buffer: Option<usize>,
    event_buffer: Option<usize>,
}

/// `[search]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SearchFileConfig {
    debounce_ms: Option<u64>,
    min_query_len: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- API --
    /// Base URL of the task service; the socket endpoint is derived from it.
    pub api_url: String,
    /// Bearer token for the API and the socket handshake.
    pub token: Option<String>,
    /// The signed-in user, used by the "my tasks" filter.
    pub user_id: Option<UserId>,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Socket connect and handshake timeout.
    pub connect_timeout: Duration,

    // -- Board --
    /// Project whose board is shown.
    pub project: Option<String>,
    /// Maximum task title length in characters.
    pub max_task_title_len: usize,
    /// Capacity of the session notice channel.
    pub notice_buffer: usize,
    /// Capacity of the socket event buffer.
    pub event_buffer: usize,

    // -- Search --
    /// Settle delay for user search.
    pub search_debounce: Duration,
    /// Shortest query that hits the network.
    pub min_search_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            token: None,
            user_id: None,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(20),
            project: None,
            max_task_title_len: MAX_TASK_TITLE_LENGTH,
            notice_buffer: 64,
            event_buffer: 256,
            search_debounce: DEFAULT_DEBOUNCE,
            min_search_len: DEFAULT_MIN_QUERY_LEN,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.api.url.clone())
                .unwrap_or(defaults.api_url),
            token: cli.token.clone().or_else(|| file.api.token.clone()),
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.api.user_id.clone())
                .map(UserId::new),
            request_timeout: file
                .api
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            connect_timeout: file
                .api
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            project: cli.project.clone().or_else(|| file.board.project.clone()),
            max_task_title_len: file
                .board
                .max_task_title_len
                .unwrap_or(defaults.max_task_title_len),
            notice_buffer: file
                .board
                .notice_buffer
                .unwrap_or(defaults.notice_buffer),
            event_buffer: file.board.event_buffer.unwrap_or(defaults.event_buffer),
            search_debounce: file
                .search
                .debounce_ms
                .map_or(defaults.search_debounce, Duration::from_millis),
            min_search_len: file
                .search
                .min_query_len
                .unwrap_or(defaults.min_search_len),
        }
    }

    /// The project to open.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] when neither `--project` nor the file set one.
    pub fn require_project(&self) -> Result<&str, ConfigError> {
        self.project
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::Missing("project (--project or [board].project)"))
    }

    /// Settings for a [`crate::session::BoardSession`].
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            max_title_len: self.max_task_title_len,
            notice_buffer: self.notice_buffer,
        }
    }

    /// Settings for a [`crate::realtime::socket::SocketIoChannel`].
    #[must_use]
    pub fn to_socket_config(&self) -> SocketConfig {
        SocketConfig {
            connect_timeout: self.connect_timeout,
            event_buffer: self.event_buffer,
            auth_token: self.token.clone(),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board client for a collaborative task tracker")]
pub struct CliArgs {
    /// Base URL of the task service.
    #[arg(long, env = "TASKBOARD_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token.
    #[arg(long, env = "TASKBOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Your user id (for `--mine`).
    #[arg(long, env = "TASKBOARD_USER")]
    pub user_id: Option<String>,

    /// Project id.
    #[arg(short, long, env = "TASKBOARD_PROJECT")]
    pub project: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do; shows the board when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Load and parse a TOML config file.
///
/// An explicit path must exist. Without one the default path is tried and a
/// missing file counts as an empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
