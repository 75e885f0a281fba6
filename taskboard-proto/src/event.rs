//! Real-time board events pushed to a project room.
//!
//! The server emits `taskCreated` and `taskUpdated` with a full task payload
//! and `taskDeleted` with `{ "taskId": ".." }` to every member of the room,
//! including the client that caused the change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{CodecError, Frame};
use crate::task::{Task, TaskId};

/// Event name for task creation.
pub const TASK_CREATED: &str = "taskCreated";
/// Event name for task updates.
pub const TASK_UPDATED: &str = "taskUpdated";
/// Event name for task deletion.
pub const TASK_DELETED: &str = "taskDeleted";
/// Client event that subscribes the socket to a project room.
pub const JOIN_PROJECT: &str = "joinProject";
/// Client event that leaves a project room.
pub const LEAVE_PROJECT: &str = "leaveProject";

/// A change pushed by the server for a task in the joined project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// A task was created.
    Created(Task),
    /// A task was changed; carries the full new record.
    Updated(Task),
    /// A task was removed.
    Deleted(TaskId),
}

#[derive(Serialize, Deserialize)]
struct DeletedPayload {
    #[serde(rename = "taskId")]
    task_id: TaskId,
}

impl BoardEvent {
    /// The task this event refers to.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Created(task) | Self::Updated(task) => &task.id,
            Self::Deleted(id) => id,
        }
    }

    /// Project id carried by the payload. Deletions carry none.
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        match self {
            Self::Created(task) | Self::Updated(task) => Some(&task.project),
            Self::Deleted(_) => None,
        }
    }

    /// Socket.IO event name for this variant.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => TASK_CREATED,
            Self::Updated(_) => TASK_UPDATED,
            Self::Deleted(_) => TASK_DELETED,
        }
    }

    /// Interprets a Socket.IO event. Returns `Ok(None)` for event names
    /// that are not board events.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEvent`] when a board event has a
    /// missing or malformed payload.
    pub fn from_socket_event(name: &str, args: &[Value]) -> Result<Option<Self>, CodecError> {
        let payload = || {
            args.first()
                .cloned()
                .ok_or_else(|| CodecError::InvalidEvent(format!("{name} without payload")))
        };
        let invalid = |e: serde_json::Error| CodecError::InvalidEvent(format!("{name}: {e}"));
        let event = match name {
            TASK_CREATED => Self::Created(serde_json::from_value(payload()?).map_err(invalid)?),
            TASK_UPDATED => Self::Updated(serde_json::from_value(payload()?).map_err(invalid)?),
            TASK_DELETED => {
                let deleted: DeletedPayload =
                    serde_json::from_value(payload()?).map_err(invalid)?;
                Self::Deleted(deleted.task_id)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Builds the Socket.IO event frame the server would send for this event.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the task cannot be serialized.
    pub fn to_frame(&self) -> Result<Frame, CodecError> {
        let payload = match self {
            Self::Created(task) | Self::Updated(task) => serde_json::to_value(task)?,
            Self::Deleted(id) => serde_json::to_value(DeletedPayload {
                task_id: id.clone(),
            })?,
        };
        Ok(Frame::event(self.name(), vec![payload]))
    }
}

/// Room membership command sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCommand {
    /// Start receiving events for a project.
    Join(String),
    /// Stop receiving events for a project.
    Leave(String),
}

impl RoomCommand {
    /// Builds the Socket.IO event frame for this command.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Join(project) => Frame::event(JOIN_PROJECT, vec![Value::String(project.clone())]),
            Self::Leave(project) => {
                Frame::event(LEAVE_PROJECT, vec![Value::String(project.clone())])
            }
        }
    }

    /// Interprets a client event frame as a room command, if it is one.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let Frame::Event { name, args, .. } = frame else {
            return None;
        };
        let project = args.first()?.as_str()?.to_string();
        match name.as_str() {
            JOIN_PROJECT => Some(Self::Join(project)),
            LEAVE_PROJECT => Some(Self::Leave(project)),
            _ => None,
        }
    }
}
