//! Progress figures for a board.

use chrono::{DateTime, Utc};
use taskboard_proto::task::{Priority, Task, TaskStatus};

/// Task count and completed count for one priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityBreakdown {
    /// The priority.
    pub priority: Priority,
    /// Tasks with this priority.
    pub count: usize,
    /// Of those, tasks in `Done`.
    pub completed: usize,
}

/// Summary of a board's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardStats {
    /// All tasks.
    pub total: usize,
    /// Tasks in `To Do`.
    pub todo: usize,
    /// Tasks in `In Progress`.
    pub in_progress: usize,
    /// Tasks in `Done`.
    pub done: usize,
    /// Tasks past their due date and not done.
    pub overdue: usize,
    /// Share of done tasks, rounded percent (0 for an empty board).
    pub completion_rate: u32,
    /// One entry per priority, lowest first.
    pub by_priority: Vec<PriorityBreakdown>,
}

impl BoardStats {
    /// Computes the figures for `tasks` at time `now`.
    #[must_use]
    pub fn compute(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        let done = count(TaskStatus::Done);
        let by_priority = Priority::ALL
            .iter()
            .map(|&priority| {
                let (count, completed) = tasks
                    .iter()
                    .filter(|t| t.priority == priority)
                    .fold((0, 0), |(n, c), t| {
                        (n + 1, c + usize::from(t.status == TaskStatus::Done))
                    });
                PriorityBreakdown {
                    priority,
                    count,
                    completed,
                }
            })
            .collect();

        Self {
            total: tasks.len(),
            todo: count(TaskStatus::Todo),
            in_progress: count(TaskStatus::InProgress),
            done,
            overdue: tasks.iter().filter(|t| t.is_overdue(now)).count(),
            completion_rate: rounded_percent(done, tasks.len()),
            by_priority,
        }
    }

    /// Breakdown for one priority.
    #[must_use]
    pub fn priority(&self, priority: Priority) -> Option<&PriorityBreakdown> {
        self.by_priority.iter().find(|b| b.priority == priority)
    }
}

/// `part / whole` as a percentage, rounded half up.
fn rounded_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let percent = (part * 200 + whole) / (whole * 2);
    u32::try_from(percent).unwrap_or(100)
}
