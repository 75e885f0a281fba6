//! Applying remote room events to the board.
//!
//! Events are authoritative: they are server state, so they always apply,
//! even over a task with a drag in flight. Such a drag is marked
//! superseded and its later completion compares timestamps instead of
//! blindly overwriting (see [`super::optimistic`]).

use taskboard_proto::event::BoardEvent;
use tracing::debug;

use super::Board;

/// What a remote event did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApplied {
    /// A new task was appended to its lane.
    Inserted,
    /// A task was replaced in place.
    Updated,
    /// A task changed lane and went to the end of the new one.
    Moved,
    /// A task was removed.
    Removed,
    /// The event had no effect (duplicate, unknown task, other project).
    Ignored,
}

impl RemoteApplied {
    /// True when the board changed.
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

impl Board {
    /// Applies one event received from the project room.
    ///
    /// - `Created`: appended to the end of its lane unless already present
    ///   (e.g. our own create's response arrived first)
    /// - `Updated`: replaces the record, keeping its place unless the status
    ///   changed; unknown ids are ignored
    /// - `Deleted`: removes the task if present
    pub fn apply_remote_event(&mut self, event: &BoardEvent) -> RemoteApplied {
        if let Some(project) = event.project() {
            if project != self.project_id {
                debug!(task_id = %event.task_id(), project, "ignoring event for another project");
                return RemoteApplied::Ignored;
            }
        }

        let applied = match event {
            BoardEvent::Created(task) => {
                if self.contains(&task.id) {
                    RemoteApplied::Ignored
                } else {
                    self.tasks.push(task.clone());
                    RemoteApplied::Inserted
                }
            }
            BoardEvent::Updated(task) => match self.get(&task.id).map(|t| t.status) {
                None => RemoteApplied::Ignored,
                Some(status) => {
                    self.store(task.clone());
                    self.supersede_pending(&task.id);
                    if status == task.status {
                        RemoteApplied::Updated
                    } else {
                        RemoteApplied::Moved
                    }
                }
            },
            BoardEvent::Deleted(id) => {
                if self.take(id).is_some() {
                    self.supersede_pending(id);
                    RemoteApplied::Removed
                } else {
                    RemoteApplied::Ignored
                }
            }
        };

        if applied.changed() {
            self.touch();
        }
        debug!(event = event.name(), task_id = %event.task_id(), ?applied, "remote event applied");
        applied
    }
}
