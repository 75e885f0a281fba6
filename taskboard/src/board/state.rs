//! Ordered task list with lane views and local reordering.

use std::collections::{HashMap, HashSet};

use taskboard_proto::task::{Task, TaskId, TaskStatus};
use tracing::{debug, warn};

use super::BoardError;
use super::optimistic::PendingMove;

/// The task state of one open project board.
///
/// Tasks live in a single ordered list. A lane is the subsequence of tasks
/// whose `status` matches it, so every task is in exactly one lane by
/// construction. Every mutation bumps [`Board::revision`].
#[derive(Debug, Clone)]
pub struct Board {
    pub(super) project_id: String,
    pub(super) tasks: Vec<Task>,
    pub(super) revision: u64,
    pub(super) pending: HashMap<TaskId, PendingMove>,
    pub(super) next_ticket: u64,
}

impl Board {
    /// Creates an empty board for `project_id`.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            tasks: Vec::new(),
            revision: 0,
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Creates a board from an initial task list.
    pub fn with_tasks(project_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        let mut board = Self::new(project_id);
        board.replace_all(tasks);
        board
    }

    /// Replaces the whole task list, e.g. after (re)loading from the API.
    ///
    /// Duplicate ids keep their first occurrence and tasks of other
    /// projects are dropped. Drags still in flight are treated as
    /// superseded: the fresh list is server truth.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        let mut seen = HashSet::new();
        self.tasks = tasks
            .into_iter()
            .filter(|task| {
                if task.project != self.project_id {
                    warn!(task_id = %task.id, project = %task.project, "dropping task of another project");
                    return false;
                }
                seen.insert(task.id.clone())
            })
            .collect();
        for pending in self.pending.values_mut() {
            pending.superseded = true;
        }
        self.touch();
        debug!(project = %self.project_id, count = self.tasks.len(), "board loaded");
    }

    /// The project this board shows.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// All tasks in board order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when the board has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Monotonic counter bumped by every mutation.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// True when the task is on the board.
    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.position(id).is_some()
    }

    /// True while a drag of this task awaits the server.
    #[must_use]
    pub fn is_move_pending(&self, id: &TaskId) -> bool {
        self.pending.contains_key(id)
    }

    /// Tasks of one lane in display order.
    #[must_use]
    pub fn lane(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    /// Ids of one lane in display order.
    #[must_use]
    pub fn lane_ids(&self, status: TaskStatus) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Index of a task within its lane.
    #[must_use]
    pub fn lane_index(&self, id: &TaskId) -> Option<(TaskStatus, usize)> {
        let task = self.get(id)?;
        let index = self
            .tasks
            .iter()
            .filter(|t| t.status == task.status)
            .position(|t| &t.id == id)?;
        Some((task.status, index))
    }

    /// Moves a task within a lane. Only the lane's own slots in the list are
    /// permuted; other lanes keep their order. Nothing is sent to the server.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::IndexOutOfRange`] if either index is not a
    /// valid position in the lane and [`BoardError::MoveInFlight`] if the
    /// task at `from` is still waiting on a cross-lane move.
    pub fn reorder_within_lane(
        &mut self,
        lane: TaskStatus,
        from: usize,
        to: usize,
    ) -> Result<(), BoardError> {
        let slots = self.lane_positions(lane);
        let len = slots.len();
        for index in [from, to] {
            if index >= len {
                return Err(BoardError::IndexOutOfRange { lane, index, len });
            }
        }
        let dragged = &self.tasks[slots[from]].id;
        if self.pending.contains_key(dragged) {
            return Err(BoardError::MoveInFlight(dragged.clone()));
        }
        if from == to {
            return Ok(());
        }

        let mut members: Vec<Task> = slots.iter().map(|&i| self.tasks[i].clone()).collect();
        let moved = members.remove(from);
        members.insert(to, moved);
        for (slot, task) in slots.into_iter().zip(members) {
            self.tasks[slot] = task;
        }
        self.touch();
        debug!(lane = %lane, from, to, "reordered within lane");
        Ok(())
    }

    /// Position of a task in the list.
    pub(super) fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }

    /// List positions of a lane's tasks, in order.
    pub(super) fn lane_positions(&self, status: TaskStatus) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == status)
            .map(|(i, _)| i)
            .collect()
    }

    /// Inserts a task into its lane at `lane_index`, or at the end of the
    /// lane when the index is past it.
    pub(super) fn insert_in_lane(&mut self, task: Task, lane_index: usize) {
        let slots = self.lane_positions(task.status);
        match slots.get(lane_index) {
            Some(&slot) => self.tasks.insert(slot, task),
            None => self.tasks.push(task),
        }
    }

    /// Removes a task, returning it with its former lane index.
    pub(super) fn take(&mut self, id: &TaskId) -> Option<(usize, Task)> {
        let (_, lane_index) = self.lane_index(id)?;
        let position = self.position(id)?;
        Some((lane_index, self.tasks.remove(position)))
    }

    /// Stores a server record for a task already on the board. A status
    /// change moves the task to the end of its new lane; otherwise it keeps
    /// its place. Returns false when the task is not on the board.
    pub(super) fn store(&mut self, task: Task) -> bool {
        let Some(position) = self.position(&task.id) else {
            return false;
        };
        if self.tasks[position].status == task.status {
            self.tasks[position] = task;
        } else {
            self.tasks.remove(position);
            self.tasks.push(task);
        }
        true
    }

    /// Records a mutation.
    pub(super) const fn touch(&mut self) {
        self.revision += 1;
    }

    /// Marks an in-flight drag of `id` as overtaken by newer server state.
    pub(super) fn supersede_pending(&mut self, id: &TaskId) {
        if let Some(pending) = self.pending.get_mut(id) {
            pending.superseded = true;
        }
    }

    /// Adds a task the server confirmed as created. A task already present
    /// (e.g. its room event arrived first) is left alone.
    pub fn commit_created(&mut self, task: Task) -> bool {
        if self.contains(&task.id) {
            debug!(task_id = %task.id, "created task already on board");
            return false;
        }
        self.tasks.push(task);
        self.touch();
        true
    }

    /// Stores a task the server confirmed as updated. A task deleted in the
    /// meantime is not resurrected.
    pub fn commit_updated(&mut self, task: Task) -> bool {
        let id = task.id.clone();
        if !self.store(task) {
            debug!(task_id = %id, "updated task no longer on board");
            return false;
        }
        self.supersede_pending(&id);
        self.touch();
        true
    }

    /// Removes a task the server confirmed as deleted, if still present.
    pub fn commit_deleted(&mut self, id: &TaskId) -> bool {
        if self.take(id).is_none() {
            return false;
        }
        self.supersede_pending(id);
        self.touch();
        true
    }
}
