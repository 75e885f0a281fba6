//! Board Synchronizer: the lane-partitioned task state of one project.
//!
//! [`Board`] owns the ordered task list and reconciles three sources of
//! change: local drags (optimistic, see [`optimistic`]), confirmed local
//! create/edit/delete, and remote room events (see [`merge`]). Lane
//! membership is always derived from each task's `status`; intra-lane order
//! is the relative order of tasks in the list and is purely local.

pub mod filter;
pub mod merge;
pub mod optimistic;
pub mod state;
pub mod stats;

pub use filter::{BoardView, TaskFilter};
pub use merge::RemoteApplied;
pub use optimistic::{MoveOutcome, MoveTicket};
pub use state::Board;
pub use stats::{BoardStats, PriorityBreakdown};

use taskboard_proto::task::{TaskId, TaskStatus};
use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur during board operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoardError {
    /// The task is not on the board (never loaded, or deleted meanwhile).
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// Input rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The external API call failed.
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    /// A completion arrived for an operation that is no longer current.
    #[error("stale response discarded")]
    StaleResponse,
    /// A drag for this task is still waiting for the server.
    #[error("a move for task {0} is already in flight")]
    MoveInFlight(TaskId),
    /// The task is not in the lane the drag started from.
    #[error("task {task_id} is in {actual}, not {expected}")]
    LaneMismatch {
        /// Task being dragged.
        task_id: TaskId,
        /// Lane the caller expected.
        expected: TaskStatus,
        /// Lane the task is actually in.
        actual: TaskStatus,
    },
    /// Cross-lane move requested with identical source and target lanes.
    #[error("source and target lane are both {0}")]
    SameLane(TaskStatus),
    /// A lane index is outside the lane.
    #[error("index {index} out of range for lane {lane} with {len} tasks")]
    IndexOutOfRange {
        /// Lane being indexed.
        lane: TaskStatus,
        /// Offending index.
        index: usize,
        /// Current lane length.
        len: usize,
    },
}

/// Checks a task title before it is sent to the server.
///
/// # Errors
///
/// Returns [`BoardError::Validation`] if the title is blank or longer than
/// `max_len` characters.
pub fn validate_title(title: &str, max_len: usize) -> Result<(), BoardError> {
    if title.trim().is_empty() {
        return Err(BoardError::Validation("task title cannot be empty".to_string()));
    }
    if title.chars().count() > max_len {
        return Err(BoardError::Validation(format!(
            "task title too long (max {max_len} characters)"
        )));
    }
    Ok(())
}
