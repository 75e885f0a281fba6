//! `taskboard`: command-line kanban board for a collaborative task service.
//!
//! ```bash
//! # Show a project's board
//! taskboard --api-url http://localhost:5000 --token $TOKEN -p <project> board
//!
//! # Drag a task to Done and follow live changes
//! taskboard -p <project> move <task> --to done
//! taskboard -p <project> watch --mine
//! ```
//!
//! Settings come from flags, `TASKBOARD_*` environment variables, or
//! `~/.config/taskboard/config.toml`.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::api::http::HttpBoardApi;
use taskboard::cli::{self, CliError, Command};
use taskboard::config::{CliArgs, ClientConfig};
use taskboard::realtime::socket::SocketIoChannel;
use taskboard::session::BoardSession;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("taskboard starting");
    let result = run(cli).await;
    tracing::info!("taskboard exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging so stdout stays clean for board output.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to flush
/// buffered entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(cli: CliArgs) -> Result<(), CliError> {
    let config = ClientConfig::load(&cli)?;
    let command = cli.command.unwrap_or_default();
    let api = Arc::new(HttpBoardApi::new(
        &config.api_url,
        config.token.clone(),
        config.request_timeout,
    )?);
    let mut stdout = io::stdout();

    if let Command::Users { query } = &command {
        return cli::search_users(api, &config, query, &mut stdout).await;
    }

    let project = config.require_project()?;
    let (session, mut notices) = BoardSession::new(api, project, &config.to_session_config());
    session.open().await?;

    let result = match &command {
        Command::Watch { filter } => {
            let filter = filter.to_filter(config.user_id.as_ref())?;
            let channel =
                SocketIoChannel::connect(&config.api_url, &config.to_socket_config()).await?;
            let watched = tokio::select! {
                r = cli::watch(&session, &channel, &filter, &mut stdout) => r,
                _ = tokio::signal::ctrl_c() => Ok(()),
            };
            if let Err(e) = session.close(&channel).await {
                tracing::debug!(err = %e, "leaving the project room failed");
            }
            watched
        }
        other => cli::execute(other, &session, &config, &mut stdout).await,
    };

    cli::drain_notices(&mut notices, &mut io::stderr())?;
    stdout.flush()?;
    result
}
