//! Read-only filtered projection of the board.

use chrono::{DateTime, Utc};
use taskboard_proto::task::{Priority, Task, TaskStatus, UserId};

/// Criteria for narrowing the visible tasks. All set criteria must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Case-insensitive substring of the title or description.
    pub keyword: Option<String>,
    /// Exact priority.
    pub priority: Option<Priority>,
    /// Show only one lane.
    pub status: Option<TaskStatus>,
    /// Show only tasks assigned to this user (the current user).
    pub assigned_to: Option<UserId>,
    /// Show only overdue tasks.
    pub overdue_only: bool,
}

impl TaskFilter {
    /// True when at least one criterion is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.needle().is_some()
            || self.priority.is_some()
            || self.status.is_some()
            || self.assigned_to.is_some()
            || self.overdue_only
    }

    fn needle(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }

    /// Checks a single task against the filter.
    #[must_use]
    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        self.matches_with(self.needle().as_deref(), task, now)
    }

    fn matches_with(&self, needle: Option<&str>, task: &Task, now: DateTime<Utc>) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if self.assigned_to.as_ref().is_some_and(|u| !task.is_assigned_to(u)) {
            return false;
        }
        if self.overdue_only && !task.is_overdue(now) {
            return false;
        }
        needle.is_none_or(|needle| {
            task.title.to_lowercase().contains(needle)
                || task
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(needle))
        })
    }

    /// Projects `tasks` (in board order) into lanes.
    #[must_use]
    pub fn apply(&self, tasks: &[Task], now: DateTime<Utc>) -> BoardView {
        let needle = self.needle();
        let mut lanes: [Vec<Task>; 3] = Default::default();
        for task in tasks {
            if self.matches_with(needle.as_deref(), task, now) {
                lanes[task.status.index()].push(task.clone());
            }
        }
        BoardView {
            lanes,
            total: tasks.len(),
        }
    }
}

/// The three lanes after filtering, in board order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardView {
    lanes: [Vec<Task>; 3],
    total: usize,
}

impl BoardView {
    /// Visible tasks of one lane.
    #[must_use]
    pub fn lane(&self, status: TaskStatus) -> &[Task] {
        &self.lanes[status.index()]
    }

    /// Number of visible tasks.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.lanes.iter().map(Vec::len).sum()
    }

    /// Number of tasks on the board before filtering.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }
}
