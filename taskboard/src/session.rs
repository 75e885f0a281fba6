//! View-scoped board session.
//!
//! [`BoardSession`] is owned by whatever shows one project's board. It
//! holds the [`Board`] behind a short-lived lock, drives the API calls for
//! drags and edits, consumes the room event stream, and reports failures
//! as [`BoardNotice`]s. After [`BoardSession::close`] every late response
//! or event is dropped.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use taskboard_proto::event::BoardEvent;
use taskboard_proto::task::{MAX_TASK_TITLE_LENGTH, NewTask, Task, TaskId, TaskPatch, TaskStatus};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::{ApiError, BoardApi};
use crate::board::{
    Board, BoardError, BoardStats, BoardView, MoveOutcome, MoveTicket, RemoteApplied,
    TaskFilter, validate_title,
};
use crate::realtime::{RealtimeChannel, RealtimeError};

/// Tunables for a [`BoardSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest accepted task title, in characters.
    pub max_title_len: usize,
    /// Capacity of the notice channel.
    pub notice_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_title_len: MAX_TASK_TITLE_LENGTH,
            notice_buffer: 64,
        }
    }
}

/// Explicit (non-drag) board actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAction {
    /// Creating a task.
    Create,
    /// Editing a task.
    Update,
    /// Deleting a task.
    Delete,
}

impl fmt::Display for BoardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Transient messages for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardNotice {
    /// A drag was rejected by the server and (if still possible) undone.
    MoveFailed {
        /// The dragged task.
        task_id: TaskId,
        /// Why the server call failed.
        error: ApiError,
    },
    /// A drag referred to a task that is no longer on the board.
    TaskUnavailable {
        /// The missing task.
        task_id: TaskId,
    },
    /// Create, edit or delete failed; the board is unchanged.
    ActionFailed {
        /// Which action.
        action: BoardAction,
        /// Why the server call failed.
        error: ApiError,
    },
    /// The API answered 401. Signing out is up to the caller.
    SessionExpired,
}

/// State container for one open project board.
pub struct BoardSession<A> {
    api: Arc<A>,
    project_id: Arc<str>,
    board: Arc<Mutex<Board>>,
    active: Arc<watch::Sender<bool>>,
    notice_tx: mpsc::Sender<BoardNotice>,
    max_title_len: usize,
}

impl<A> Clone for BoardSession<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            project_id: Arc::clone(&self.project_id),
            board: Arc::clone(&self.board),
            active: Arc::clone(&self.active),
            notice_tx: self.notice_tx.clone(),
            max_title_len: self.max_title_len,
        }
    }
}

impl<A: BoardApi> BoardSession<A> {
    /// Creates an empty, active session for `project_id`.
    ///
    /// Returns the session and the receiver for its [`BoardNotice`]s.
    pub fn new(
        api: Arc<A>,
        project_id: impl Into<String>,
        config: &SessionConfig,
    ) -> (Self, mpsc::Receiver<BoardNotice>) {
        let project_id: String = project_id.into();
        let (notice_tx, notice_rx) = mpsc::channel(config.notice_buffer.max(1));
        let (active, _) = watch::channel(true);
        let session = Self {
            api,
            board: Arc::new(Mutex::new(Board::new(project_id.clone()))),
            project_id: project_id.into(),
            active: Arc::new(active),
            notice_tx,
            max_title_len: config.max_title_len,
        };
        (session, notice_rx)
    }

    /// The project this session shows.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The API client the session talks to.
    #[must_use]
    pub const fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// False after [`close`](Self::close) or [`deactivate`](Self::deactivate).
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Loads the full task list, replacing the board. Returns the task count.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Api`] if the list cannot be fetched and
    /// [`BoardError::StaleResponse`] if the session closed meanwhile.
    pub async fn open(&self) -> Result<usize, BoardError> {
        let tasks = match self.api.list_tasks(&self.project_id).await {
            Ok(tasks) => tasks,
            Err(error) => {
                warn!(project = %self.project_id, %error, "failed to load board");
                if error == ApiError::Unauthorized {
                    self.notify(BoardNotice::SessionExpired);
                }
                return Err(error.into());
            }
        };
        if !self.is_active() {
            debug!(project = %self.project_id, "board closed before load finished");
            return Err(BoardError::StaleResponse);
        }
        let count = {
            let mut board = self.board.lock();
            board.replace_all(tasks);
            board.len()
        };
        info!(project = %self.project_id, count, "board opened");
        Ok(count)
    }

    /// Subscribes `channel` to this project's room.
    ///
    /// # Errors
    ///
    /// Propagates the channel's error.
    pub async fn join<R: RealtimeChannel>(&self, channel: &R) -> Result<(), RealtimeError> {
        channel.join_project(&self.project_id).await
    }

    /// Leaves the room and deactivates the session.
    ///
    /// # Errors
    ///
    /// Propagates the channel's error; the session is deactivated anyway.
    pub async fn close<R: RealtimeChannel>(&self, channel: &R) -> Result<(), RealtimeError> {
        self.deactivate();
        channel.leave_project(&self.project_id).await
    }

    /// Marks the session inactive: late responses and events become no-ops
    /// and [`run_events`](Self::run_events) returns.
    pub fn deactivate(&self) {
        if self.active.send_replace(false) {
            info!(project = %self.project_id, "board session closed");
        }
    }

    /// Copy of all tasks in board order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.board.lock().tasks().to_vec()
    }

    /// Copy of one task.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.board.lock().get(task_id).cloned()
    }

    /// Ids of one lane in display order.
    #[must_use]
    pub fn lane_ids(&self, status: TaskStatus) -> Vec<TaskId> {
        self.board.lock().lane_ids(status)
    }

    /// Runs `f` with the board locked. Keep it short.
    pub fn with_board<T>(&self, f: impl FnOnce(&Board) -> T) -> T {
        f(&self.board.lock())
    }

    /// Filtered lanes for display.
    #[must_use]
    pub fn view(&self, filter: &TaskFilter, now: DateTime<Utc>) -> BoardView {
        filter.apply(self.board.lock().tasks(), now)
    }

    /// Progress figures for the board.
    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> BoardStats {
        BoardStats::compute(self.board.lock().tasks(), now)
    }

    /// Reorders within a lane. Local only.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::IndexOutOfRange`] for indices outside the lane.
    pub fn reorder_within_lane(
        &self,
        lane: TaskStatus,
        from: usize,
        to: usize,
    ) -> Result<(), BoardError> {
        self.board.lock().reorder_within_lane(lane, from, to)
    }

    /// A drag that ends in the same lane: find the task and reorder.
    fn reorder_task(
        &self,
        task_id: &TaskId,
        lane: TaskStatus,
        to_index: usize,
    ) -> Result<(), BoardError> {
        let mut board = self.board.lock();
        let Some((actual, from)) = board.lane_index(task_id) else {
            drop(board);
            self.notify(BoardNotice::TaskUnavailable {
                task_id: task_id.clone(),
            });
            return Err(BoardError::NotFound(task_id.clone()));
        };
        if actual != lane {
            return Err(BoardError::LaneMismatch {
                task_id: task_id.clone(),
                expected: lane,
                actual,
            });
        }
        let last = board.lane(lane).len().saturating_sub(1);
        board.reorder_within_lane(lane, from, to_index.min(last))
    }

    /// Moves a task to another lane: applied at once, confirmed or rolled
    /// back when the server answers. A drop in the same lane is a local
    /// reorder.
    ///
    /// # Errors
    ///
    /// - [`BoardError::NotFound`], [`BoardError::LaneMismatch`],
    ///   [`BoardError::MoveInFlight`] before anything changes
    /// - [`BoardError::Api`] when the server rejected the move (a
    ///   [`BoardNotice::MoveFailed`] is sent as well)
    pub async fn move_across_lanes(
        &self,
        task_id: &TaskId,
        from: TaskStatus,
        to: TaskStatus,
        to_index: usize,
    ) -> Result<MoveOutcome, BoardError> {
        if from == to {
            self.reorder_task(task_id, from, to_index)?;
            return Ok(MoveOutcome::Reordered);
        }

        let begun = self.board.lock().begin_move(task_id, from, to, to_index);
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(BoardError::NotFound(id)) => {
                self.notify(BoardNotice::TaskUnavailable {
                    task_id: id.clone(),
                });
                return Err(BoardError::NotFound(id));
            }
            Err(e) => return Err(e),
        };

        let guard = MoveGuard {
            board: &self.board,
            ticket: &ticket,
            armed: true,
        };
        let result = self
            .api
            .update_task(&self.project_id, task_id, ticket.patch())
            .await;
        guard.disarm();
        if !self.is_active() {
            debug!(task_id = %task_id, "board closed, move response discarded");
            return Ok(MoveOutcome::Discarded);
        }

        let completed = self.board.lock().complete_move(ticket, result);
        match completed {
            Ok(outcome) => {
                info!(task_id = %task_id, from = %from, to = %to, ?outcome, "move finished");
                Ok(outcome)
            }
            Err(BoardError::Api(error)) => {
                warn!(task_id = %task_id, %error, "move rejected");
                self.notify_failure(
                    BoardNotice::MoveFailed {
                        task_id: task_id.clone(),
                        error: error.clone(),
                    },
                    &error,
                );
                Err(BoardError::Api(error))
            }
            Err(BoardError::StaleResponse) => {
                debug!(task_id = %task_id, "stale move response discarded");
                Ok(MoveOutcome::Discarded)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a task. The board changes only after the server confirms.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for a bad title, [`BoardError::Api`] when
    /// the server call fails.
    pub async fn local_create(&self, body: NewTask) -> Result<Task, BoardError> {
        validate_title(&body.title, self.max_title_len)?;
        match self.api.create_task(&self.project_id, &body).await {
            Ok(task) => {
                if self.is_active() {
                    self.board.lock().commit_created(task.clone());
                }
                info!(task_id = %task.id, "task created");
                Ok(task)
            }
            Err(error) => Err(self.action_failed(BoardAction::Create, error)),
        }
    }

    /// Edits a task. The board changes only after the server confirms.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for an empty patch or bad title,
    /// [`BoardError::NotFound`] if the task is not on the board,
    /// [`BoardError::Api`] when the server call fails.
    pub async fn local_update(
        &self,
        task_id: &TaskId,
        patch: TaskPatch,
    ) -> Result<Task, BoardError> {
        if patch.is_empty() {
            return Err(BoardError::Validation("nothing to update".to_string()));
        }
        if let Some(title) = &patch.title {
            validate_title(title, self.max_title_len)?;
        }
        if !self.board.lock().contains(task_id) {
            return Err(BoardError::NotFound(task_id.clone()));
        }
        match self.api.update_task(&self.project_id, task_id, &patch).await {
            Ok(task) => {
                if self.is_active() {
                    self.board.lock().commit_updated(task.clone());
                }
                info!(task_id = %task.id, "task updated");
                Ok(task)
            }
            Err(error) => Err(self.action_failed(BoardAction::Update, error)),
        }
    }

    /// Deletes a task. The board changes only after the server confirms.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotFound`] if the task is not on the board,
    /// [`BoardError::Api`] when the server call fails.
    pub async fn local_delete(&self, task_id: &TaskId) -> Result<(), BoardError> {
        if !self.board.lock().contains(task_id) {
            return Err(BoardError::NotFound(task_id.clone()));
        }
        match self.api.delete_task(&self.project_id, task_id).await {
            Ok(()) => {
                if self.is_active() {
                    self.board.lock().commit_deleted(task_id);
                }
                info!(task_id = %task_id, "task deleted");
                Ok(())
            }
            Err(error) => Err(self.action_failed(BoardAction::Delete, error)),
        }
    }

    /// Applies one room event. Ignored once the session is closed.
    pub fn apply_remote_event(&self, event: &BoardEvent) -> RemoteApplied {
        if !self.is_active() {
            debug!(task_id = %event.task_id(), "session closed, event dropped");
            return RemoteApplied::Ignored;
        }
        self.board.lock().apply_remote_event(event)
    }

    /// Consumes `channel` until the session closes, applying each event and
    /// then calling `on_applied`.
    ///
    /// # Errors
    ///
    /// Returns the channel's error when it fails or ends while the session
    /// is still active.
    pub async fn run_events<R, F>(
        &self,
        channel: &R,
        mut on_applied: F,
    ) -> Result<(), RealtimeError>
    where
        R: RealtimeChannel,
        F: FnMut(&BoardEvent, RemoteApplied) + Send,
    {
        let closed = wait_closed(self.active.subscribe());
        tokio::pin!(closed);
        loop {
            tokio::select! {
                () = &mut closed => {
                    debug!(project = %self.project_id, "event loop stopped");
                    return Ok(());
                }
                event = channel.next_event() => {
                    let event = event?;
                    let applied = self.apply_remote_event(&event);
                    on_applied(&event, applied);
                }
            }
        }
    }

    fn action_failed(&self, action: BoardAction, error: ApiError) -> BoardError {
        warn!(project = %self.project_id, %action, %error, "board action failed");
        self.notify_failure(
            BoardNotice::ActionFailed {
                action,
                error: error.clone(),
            },
            &error,
        );
        BoardError::Api(error)
    }

    fn notify_failure(&self, notice: BoardNotice, error: &ApiError) {
        self.notify(notice);
        if *error == ApiError::Unauthorized {
            self.notify(BoardNotice::SessionExpired);
        }
    }

    fn notify(&self, notice: BoardNotice) {
        if self.notice_tx.try_send(notice).is_err() {
            debug!("notice dropped, receiver full or gone");
        }
    }
}

/// Undoes a pending move when the drag future is dropped before the server
/// answers.
struct MoveGuard<'a> {
    board: &'a Mutex<Board>,
    ticket: &'a MoveTicket,
    armed: bool,
}

impl MoveGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for MoveGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.board.lock().abandon_move(self.ticket) {
            debug!(task_id = %self.ticket.task_id(), "drag dropped before the server answered");
        }
    }
}

/// Resolves once the active flag turns false.
async fn wait_closed(mut active: watch::Receiver<bool>) {
    loop {
        let still_active = *active.borrow_and_update();
        if !still_active {
            return;
        }
        if active.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
