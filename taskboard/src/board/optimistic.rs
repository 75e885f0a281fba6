//! Optimistic cross-lane moves.
//!
//! A drag is applied to the board immediately ([`Board::begin_move`]) and
//! reconciled once the server answers ([`Board::complete_move`]). Each
//! pending move keeps a snapshot of the list taken just before it was
//! applied. On failure the snapshot is restored verbatim when nothing else
//! changed the board since; otherwise only the moved task goes back to its
//! original lane and index, so unrelated remote changes survive.

use taskboard_proto::task::{Task, TaskId, TaskPatch, TaskStatus};
use tracing::{debug, info, warn};

use super::{Board, BoardError};
use crate::api::ApiError;

/// Handle for one in-flight move, returned by [`Board::begin_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTicket {
    seq: u64,
    task_id: TaskId,
    from: TaskStatus,
    to: TaskStatus,
    patch: TaskPatch,
}

impl MoveTicket {
    /// The task being moved.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Lane the task was dragged out of.
    #[must_use]
    pub const fn from(&self) -> TaskStatus {
        self.from
    }

    /// Lane the task was dropped into.
    #[must_use]
    pub const fn to(&self) -> TaskStatus {
        self.to
    }

    /// The update to send to the server (status only).
    #[must_use]
    pub const fn patch(&self) -> &TaskPatch {
        &self.patch
    }
}

#[derive(Debug, Clone)]
pub(super) struct PendingMove {
    seq: u64,
    /// Task list just before the optimistic change.
    snapshot: Vec<Task>,
    /// Board revision right after the optimistic change.
    revision: u64,
    original: Task,
    original_lane_index: usize,
    /// Set when newer server state for the task reached the board.
    pub(super) superseded: bool,
}

/// How a move (or same-lane drag) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The server agreed with the optimistic state.
    Committed,
    /// The server returned different content, which replaced the local record.
    Replaced,
    /// Newer server state arrived meanwhile and was kept.
    Superseded,
    /// A same-lane drag; reordered locally without a server call.
    Reordered,
    /// The board was closed before the server answered.
    Discarded,
}

impl Board {
    /// Applies a cross-lane drag optimistically and records how to undo it.
    ///
    /// The task leaves `from`, takes status `to` and is inserted at
    /// `to_index` in the target lane (end of lane when past it).
    ///
    /// # Errors
    ///
    /// - [`BoardError::SameLane`] if `from == to`
    /// - [`BoardError::MoveInFlight`] if the task already has a pending move
    /// - [`BoardError::NotFound`] if the task is not on the board
    /// - [`BoardError::LaneMismatch`] if the task is not in `from`
    pub fn begin_move(
        &mut self,
        task_id: &TaskId,
        from: TaskStatus,
        to: TaskStatus,
        to_index: usize,
    ) -> Result<MoveTicket, BoardError> {
        if from == to {
            return Err(BoardError::SameLane(from));
        }
        if self.pending.contains_key(task_id) {
            return Err(BoardError::MoveInFlight(task_id.clone()));
        }
        let actual = self
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| BoardError::NotFound(task_id.clone()))?;
        if actual != from {
            return Err(BoardError::LaneMismatch {
                task_id: task_id.clone(),
                expected: from,
                actual,
            });
        }

        let snapshot = self.tasks.clone();
        let (original_lane_index, original) = self
            .take(task_id)
            .ok_or_else(|| BoardError::NotFound(task_id.clone()))?;
        let mut moved = original.clone();
        moved.status = to;
        self.insert_in_lane(moved, to_index);
        self.touch();

        let seq = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(
            task_id.clone(),
            PendingMove {
                seq,
                snapshot,
                revision: self.revision,
                original,
                original_lane_index,
                superseded: false,
            },
        );
        debug!(task_id = %task_id, from = %from, to = %to, to_index, "move applied optimistically");

        Ok(MoveTicket {
            seq,
            task_id: task_id.clone(),
            from,
            to,
            patch: TaskPatch::status(to),
        })
    }

    /// Reconciles a pending move with the server's answer.
    ///
    /// On success the server record replaces the local one unless newer
    /// server state already reached the board or the task is gone. On
    /// failure the move is rolled back unless it was superseded.
    ///
    /// # Errors
    ///
    /// - [`BoardError::StaleResponse`] if the ticket is not the pending move
    /// - [`BoardError::Api`] carrying the server error after rollback
    pub fn complete_move(
        &mut self,
        ticket: MoveTicket,
        result: Result<Task, ApiError>,
    ) -> Result<MoveOutcome, BoardError> {
        let pending = match self.pending.remove(&ticket.task_id) {
            Some(pending) if pending.seq == ticket.seq => pending,
            Some(other) => {
                self.pending.insert(ticket.task_id.clone(), other);
                return Err(BoardError::StaleResponse);
            }
            None => return Err(BoardError::StaleResponse),
        };

        match result {
            Ok(server) => Ok(self.confirm_move(&ticket, &pending, server)),
            Err(error) => {
                if pending.superseded || !self.contains(&ticket.task_id) {
                    warn!(task_id = %ticket.task_id, %error, "move failed after newer state arrived, keeping it");
                } else {
                    self.roll_back(&ticket, pending);
                }
                Err(BoardError::Api(error))
            }
        }
    }

    /// Clears a pending move whose server answer will never be read.
    ///
    /// The outcome on the server is unknown, so the optimistic change is
    /// undone the same way a failure is; if the update did land, its room
    /// event moves the task again. Returns false when `ticket` is not the
    /// pending move.
    pub fn abandon_move(&mut self, ticket: &MoveTicket) -> bool {
        let current = self
            .pending
            .get(&ticket.task_id)
            .is_some_and(|pending| pending.seq == ticket.seq);
        if !current {
            return false;
        }
        let Some(pending) = self.pending.remove(&ticket.task_id) else {
            return false;
        };
        if pending.superseded || !self.contains(&ticket.task_id) {
            debug!(task_id = %ticket.task_id, "abandoned move already overtaken");
        } else {
            self.roll_back(ticket, pending);
        }
        true
    }

    fn confirm_move(
        &mut self,
        ticket: &MoveTicket,
        pending: &PendingMove,
        server: Task,
    ) -> MoveOutcome {
        let Some(local) = self.get(&ticket.task_id) else {
            debug!(task_id = %ticket.task_id, "moved task was deleted before confirmation");
            return MoveOutcome::Superseded;
        };
        if pending.superseded && local.updated_at >= server.updated_at {
            debug!(task_id = %ticket.task_id, "newer remote state kept over move response");
            return MoveOutcome::Superseded;
        }
        if local.same_content(&server) {
            if *local != server {
                self.store(server);
                self.touch();
            }
            debug!(task_id = %ticket.task_id, "move committed");
            MoveOutcome::Committed
        } else {
            info!(task_id = %ticket.task_id, status = %server.status, "server record differs from optimistic move");
            self.store(server);
            self.touch();
            MoveOutcome::Replaced
        }
    }

    fn roll_back(&mut self, ticket: &MoveTicket, pending: PendingMove) {
        if self.revision == pending.revision {
            self.tasks = pending.snapshot;
            debug!(task_id = %ticket.task_id, "move rolled back from snapshot");
        } else {
            self.take(&ticket.task_id);
            self.insert_in_lane(pending.original, pending.original_lane_index);
            debug!(task_id = %ticket.task_id, "moved task restored to original position");
        }
        self.touch();
    }
}
