//! Subcommands of the `taskboard` binary.
//!
//! Each command runs against an opened [`BoardSession`] and writes plain
//! text to the given writer. `watch` additionally consumes a
//! [`RealtimeChannel`] and reprints the board whenever an event changes it.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use taskboard_proto::task::{NewTask, Priority, Task, TaskId, TaskPatch, TaskStatus, UserId};
use tokio::sync::mpsc;
use tracing::warn;

use crate::api::{ApiError, BoardApi};
use crate::board::{BoardError, BoardStats, BoardView, MoveOutcome, TaskFilter};
use crate::config::{ClientConfig, ConfigError};
use crate::realtime::{RealtimeChannel, RealtimeError};
use crate::search::{Debounced, UserSearch};
use crate::session::{BoardNotice, BoardSession};

/// Errors surfaced by the command layer.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be loaded or is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A board operation failed.
    #[error(transparent)]
    Board(#[from] BoardError),

    /// An API call outside the board failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The real-time channel failed.
    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    /// Writing output failed.
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),

    /// The arguments don't make sense together.
    #[error("{0}")]
    Usage(String),
}

/// Filter flags shared by `board` and `watch`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct FilterArgs {
    /// Case-insensitive text in title or description.
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Only this priority.
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Only this lane.
    #[arg(long)]
    pub status: Option<TaskStatus>,

    /// Only tasks assigned to you (needs `--user-id`).
    #[arg(long)]
    pub mine: bool,

    /// Only overdue tasks.
    #[arg(long)]
    pub overdue: bool,
}

impl FilterArgs {
    /// Builds the board filter; `me` backs `--mine`.
    ///
    /// # Errors
    ///
    /// [`CliError::Usage`] for `--mine` without a known user.
    pub fn to_filter(&self, me: Option<&UserId>) -> Result<TaskFilter, CliError> {
        let assigned_to = if self.mine {
            Some(
                me.cloned()
                    .ok_or_else(|| CliError::Usage("--mine needs --user-id".to_string()))?,
            )
        } else {
            None
        };
        Ok(TaskFilter {
            keyword: self.keyword.clone(),
            priority: self.priority,
            status: self.status,
            assigned_to,
            overdue_only: self.overdue,
        })
    }
}

/// `taskboard` subcommands.
#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Print the board lanes.
    Board {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print progress figures.
    Stats,

    /// Print the board and keep it current until interrupted.
    Watch {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Create a task in the To Do lane.
    Create {
        /// Task title.
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, default_value_t = Priority::Medium)]
        priority: Priority,
        /// RFC 3339 timestamp or `YYYY-MM-DD`.
        #[arg(long, value_parser = parse_due)]
        due: Option<DateTime<Utc>>,
        /// Assignee user id.
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Move a task to another lane (or reorder within its lane).
    Move {
        /// Task id.
        task: String,
        /// Target lane.
        #[arg(long)]
        to: TaskStatus,
        /// Position in the target lane (default: end).
        #[arg(long)]
        index: Option<usize>,
    },

    /// Edit task fields.
    Update {
        /// Task id.
        task: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        priority: Option<Priority>,
        /// RFC 3339 timestamp or `YYYY-MM-DD`.
        #[arg(long, value_parser = parse_due)]
        due: Option<DateTime<Utc>>,
        /// Assignee user id; an empty string unassigns.
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Delete a task.
    Delete {
        /// Task id.
        task: String,
    },

    /// Search users by username.
    Users {
        /// At least two characters.
        query: String,
    },
}

impl Default for Command {
    fn default() -> Self {
        Self::Board {
            filter: FilterArgs::default(),
        }
    }
}

/// Accepts RFC 3339 or a bare date (midnight UTC).
///
/// # Errors
///
/// Returns a message for clap when neither form parses.
pub fn parse_due(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| format!("expected RFC 3339 or YYYY-MM-DD, got {s:?}"))
}

/// Runs a one-shot command against an opened session. `watch` and `users`
/// are handled by [`watch`] and [`search_users`].
///
/// # Errors
///
/// Whatever the board operation returned, or [`CliError::Usage`].
pub async fn execute<A, W>(
    command: &Command,
    session: &BoardSession<A>,
    config: &ClientConfig,
    out: &mut W,
) -> Result<(), CliError>
where
    A: BoardApi,
    W: Write,
{
    let now = Utc::now();
    match command {
        Command::Board { filter } => {
            let filter = filter.to_filter(config.user_id.as_ref())?;
            print_board(out, &session.view(&filter, now), now)?;
        }
        Command::Stats => print_stats(out, &session.stats(now))?,
        Command::Create {
            title,
            description,
            priority,
            due,
            assignee,
        } => {
            let body = NewTask {
                description: description.clone(),
                priority: *priority,
                due_date: *due,
                assigned_to: assignee.clone().map(UserId::new),
                ..NewTask::new(title.clone())
            };
            let task = session.local_create(body).await?;
            writeln!(out, "created {}", task_line(&task, now))?;
        }
        Command::Move { task, to, index } => {
            let task_id = TaskId::new(task.clone());
            let from = session
                .task(&task_id)
                .map(|t| t.status)
                .ok_or_else(|| BoardError::NotFound(task_id.clone()))?;
            let index = index.unwrap_or_else(|| session.with_board(|b| b.lane(*to).len()));
            let outcome = session.move_across_lanes(&task_id, from, *to, index).await?;
            writeln!(out, "{task_id}: {from} -> {to} ({})", describe_outcome(outcome))?;
        }
        Command::Update {
            task,
            title,
            description,
            status,
            priority,
            due,
            assignee,
        } => {
            let patch = TaskPatch {
                title: title.clone(),
                description: description.clone(),
                status: *status,
                priority: *priority,
                due_date: *due,
                assigned_to: assignee.clone().map(UserId::new),
            };
            let task = session.local_update(&TaskId::new(task.clone()), patch).await?;
            writeln!(out, "updated {}", task_line(&task, now))?;
        }
        Command::Delete { task } => {
            let task_id = TaskId::new(task.clone());
            session.local_delete(&task_id).await?;
            writeln!(out, "deleted {task_id}")?;
        }
        Command::Watch { .. } | Command::Users { .. } => {
            return Err(CliError::Usage(
                "watch and users are not one-shot board commands".to_string(),
            ));
        }
    }
    Ok(())
}

/// Looks up users, honoring the configured minimum query length.
///
/// # Errors
///
/// The API error of the lookup.
pub async fn search_users<A, W>(
    api: Arc<A>,
    config: &ClientConfig,
    query: &str,
    out: &mut W,
) -> Result<(), CliError>
where
    A: BoardApi,
    W: Write,
{
    let search = UserSearch::new(api, config.search_debounce, config.min_search_len);
    let Debounced::Ready(users) = search.search(query).await? else {
        return Ok(());
    };
    if users.is_empty() {
        writeln!(out, "no users match {query:?}")?;
    }
    for user in users {
        if user.name.is_empty() {
            writeln!(out, "{}  {}", user.id, user.username)?;
        } else {
            writeln!(out, "{}  {} ({})", user.id, user.username, user.name)?;
        }
    }
    Ok(())
}

/// Joins the project room, prints the board and reprints it after every
/// event that changed it. Returns when the session closes or the channel
/// ends.
///
/// # Errors
///
/// The channel's error, or a failed write of the first board.
pub async fn watch<A, R, W>(
    session: &BoardSession<A>,
    channel: &R,
    filter: &TaskFilter,
    out: &mut W,
) -> Result<(), CliError>
where
    A: BoardApi,
    R: RealtimeChannel,
    W: Write + Send,
{
    session.join(channel).await?;
    let now = Utc::now();
    print_board(out, &session.view(filter, now), now)?;
    session
        .run_events(channel, |event, applied| {
            if !applied.changed() {
                return;
            }
            let now = Utc::now();
            let written = writeln!(out, "-- {} {}", event.name(), event.task_id())
                .and_then(|()| print_board(out, &session.view(filter, now), now));
            if let Err(e) = written {
                warn!(err = %e, "failed to reprint board");
            }
        })
        .await?;
    Ok(())
}

/// Prints and clears pending notices.
///
/// # Errors
///
/// A failed write.
pub fn drain_notices<W: Write>(
    notices: &mut mpsc::Receiver<BoardNotice>,
    out: &mut W,
) -> std::io::Result<()> {
    while let Ok(notice) = notices.try_recv() {
        writeln!(out, "! {}", describe_notice(&notice))?;
    }
    Ok(())
}

/// Prints the three lanes of `view`.
///
/// # Errors
///
/// A failed write.
pub fn print_board<W: Write>(
    out: &mut W,
    view: &BoardView,
    now: DateTime<Utc>,
) -> std::io::Result<()> {
    for status in TaskStatus::ALL {
        let lane = view.lane(status);
        writeln!(out, "{status} ({})", lane.len())?;
        for task in lane {
            writeln!(out, "  {}", task_line(task, now))?;
        }
    }
    if view.matched() != view.total() {
        writeln!(out, "showing {} of {} tasks", view.matched(), view.total())?;
    }
    Ok(())
}

/// Prints progress figures.
///
/// # Errors
///
/// A failed write.
pub fn print_stats<W: Write>(out: &mut W, stats: &BoardStats) -> std::io::Result<()> {
    writeln!(out, "total        {}", stats.total)?;
    writeln!(out, "to do        {}", stats.todo)?;
    writeln!(out, "in progress  {}", stats.in_progress)?;
    writeln!(out, "done         {}", stats.done)?;
    writeln!(out, "overdue      {}", stats.overdue)?;
    writeln!(out, "completion   {}%", stats.completion_rate)?;
    for row in &stats.by_priority {
        writeln!(
            out,
            "{:<12} {} ({} done)",
            row.priority.label(),
            row.count,
            row.completed
        )?;
    }
    Ok(())
}

/// One-line summary: `[id] title  priority  due  @assignee`.
#[must_use]
pub fn task_line(task: &Task, now: DateTime<Utc>) -> String {
    let mut line = format!("[{}] {}  {}", task.id, task.title, task.priority);
    if let Some(due) = task.due_date {
        line.push_str(&format!("  due {}", due.format("%Y-%m-%d")));
        if task.is_overdue(now) {
            line.push_str(" (overdue)");
        }
    }
    if let Some(assignee) = &task.assigned_to {
        let who = if assignee.username.is_empty() {
            assignee.id.as_str()
        } else {
            assignee.username.as_str()
        };
        line.push_str(&format!("  @{who}"));
    }
    line
}

const fn describe_outcome(outcome: MoveOutcome) -> &'static str {
    match outcome {
        MoveOutcome::Committed => "saved",
        MoveOutcome::Replaced => "saved, server copy differs",
        MoveOutcome::Superseded => "newer change kept",
        MoveOutcome::Reordered => "reordered",
        MoveOutcome::Discarded => "discarded",
    }
}

fn describe_notice(notice: &BoardNotice) -> String {
    match notice {
        BoardNotice::MoveFailed { task_id, error } => {
            format!("moving {task_id} failed and was undone: {error}")
        }
        BoardNotice::TaskUnavailable { task_id } => {
            format!("task {task_id} is no longer on the board")
        }
        BoardNotice::ActionFailed { action, error } => format!("{action} failed: {error}"),
        BoardNotice::SessionExpired => "session expired, sign in again".to_string(),
    }
}
