//! In-process implementation of [`BoardApi`].
//!
//! Behaves like the real service closely enough to drive a session without
//! a network: assigns ids and timestamps, answers 404 for unknown tasks and
//! can echo every change as a room event. Tests use the extra knobs to
//! inject failures and to hold update responses until released.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use taskboard_proto::event::BoardEvent;
use taskboard_proto::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus, UserId, UserRef};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{ApiError, BoardApi};

/// Number of calls received per endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `list_tasks` calls.
    pub list: usize,
    /// `create_task` calls.
    pub create: usize,
    /// `update_task` calls.
    pub update: usize,
    /// `delete_task` calls.
    pub delete: usize,
    /// `search_users` calls.
    pub search: usize,
}

impl CallCounts {
    /// Calls across all endpoints.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.list + self.create + self.update + self.delete + self.search
    }
}

struct MemoryState {
    tasks: Vec<Task>,
    users: Vec<UserRef>,
    author: UserRef,
    next_id: u64,
    calls: CallCounts,
    failures: VecDeque<ApiError>,
}

/// Keeps `update_task` calls waiting until [`UpdateGate::release`] is
/// called or the gate is dropped.
#[derive(Debug)]
pub struct UpdateGate(watch::Sender<bool>);

impl UpdateGate {
    /// Lets held and future updates proceed.
    pub fn release(self) {
        let _ = self.0.send(true);
    }
}

/// In-memory task service.
pub struct InMemoryBoardApi {
    state: Mutex<MemoryState>,
    update_gate: Mutex<Option<watch::Receiver<bool>>>,
    echo: Mutex<Option<mpsc::UnboundedSender<BoardEvent>>>,
}

impl Default for InMemoryBoardApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBoardApi {
    /// An empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// A service preloaded with `tasks` (any projects).
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                tasks,
                users: Vec::new(),
                author: UserRef::from_id(UserId::new("local")),
                next_id: 1,
                calls: CallCounts::default(),
                failures: VecDeque::new(),
            }),
            update_gate: Mutex::new(None),
            echo: Mutex::new(None),
        }
    }

    /// Adds users that `search_users` can find.
    #[must_use]
    pub fn with_users(self, users: Vec<UserRef>) -> Self {
        self.state.lock().users.extend(users);
        self
    }

    /// Sets the user recorded as creator of new tasks.
    #[must_use]
    pub fn with_author(self, author: UserRef) -> Self {
        self.state.lock().author = author;
        self
    }

    /// Server-side copy of a project's tasks.
    #[must_use]
    pub fn tasks(&self, project_id: &str) -> Vec<Task> {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|t| t.project == project_id)
            .cloned()
            .collect()
    }

    /// Server-side copy of one task.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| &t.id == task_id).cloned()
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    /// Makes the next call (of any kind) fail with `error`. Queued errors
    /// are consumed in order.
    pub fn fail_next(&self, error: ApiError) {
        self.state.lock().failures.push_back(error);
    }

    /// Holds every `update_task` call until the returned gate is released.
    #[must_use]
    pub fn hold_updates(&self) -> UpdateGate {
        let (tx, rx) = watch::channel(false);
        *self.update_gate.lock() = Some(rx);
        UpdateGate(tx)
    }

    /// Sends a room event for every successful change, like the real
    /// service broadcasting to the project room.
    pub fn echo_events(&self, sink: mpsc::UnboundedSender<BoardEvent>) {
        *self.echo.lock() = Some(sink);
    }

    fn begin_call(&self, count: impl FnOnce(&mut CallCounts)) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        count(&mut state.calls);
        state.failures.pop_front().map_or(Ok(()), Err)
    }

    fn echo(&self, event: BoardEvent) {
        if let Some(sink) = self.echo.lock().as_ref() {
            let _ = sink.send(event);
        }
    }

    fn not_found() -> ApiError {
        ApiError::Server {
            status: 404,
            message: "Task not found".to_string(),
        }
    }
}

/// Strictly later than `previous`, even if the clock has not moved.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + TimeDelta::milliseconds(1))
}

impl BoardApi for InMemoryBoardApi {
    async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError> {
        self.begin_call(|c| c.list += 1)?;
        Ok(self.tasks(project_id))
    }

    async fn create_task(&self, project_id: &str, body: &NewTask) -> Result<Task, ApiError> {
        self.begin_call(|c| c.create += 1)?;
        let task = {
            let mut state = self.state.lock();
            let now = Utc::now();
            let task = Task {
                id: TaskId::new(format!("task-{}", state.next_id)),
                title: body.title.trim().to_string(),
                description: body.description.clone(),
                status: TaskStatus::Todo,
                priority: body.priority,
                due_date: body.due_date,
                assigned_to: body.assigned_to.clone().map(UserRef::from_id),
                created_by: state.author.clone(),
                project: project_id.to_string(),
                created_at: now,
                updated_at: now,
            };
            state.next_id += 1;
            state.tasks.push(task.clone());
            task
        };
        debug!(task_id = %task.id, "in-memory task created");
        self.echo(BoardEvent::Created(task.clone()));
        Ok(task)
    }

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, ApiError> {
        self.state.lock().calls.update += 1;
        let gate = self.update_gate.lock().clone();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
        let failure = self.state.lock().failures.pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let task = {
            let mut state = self.state.lock();
            let task = state
                .tasks
                .iter_mut()
                .find(|t| &t.id == task_id && t.project == project_id)
                .ok_or_else(Self::not_found)?;
            task.apply_patch(patch);
            task.updated_at = next_timestamp(task.updated_at);
            task.clone()
        };
        debug!(task_id = %task.id, status = %task.status, "in-memory task updated");
        self.echo(BoardEvent::Updated(task.clone()));
        Ok(task)
    }

    async fn delete_task(&self, project_id: &str, task_id: &TaskId) -> Result<(), ApiError> {
        self.begin_call(|c| c.delete += 1)?;
        {
            let mut state = self.state.lock();
            let position = state
                .tasks
                .iter()
                .position(|t| &t.id == task_id && t.project == project_id)
                .ok_or_else(Self::not_found)?;
            state.tasks.remove(position);
        }
        self.echo(BoardEvent::Deleted(task_id.clone()));
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserRef>, ApiError> {
        self.begin_call(|c| c.search += 1)?;
        let needle = query.to_lowercase();
        Ok(self
            .state
            .lock()
            .users
            .iter()
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}
