//! Loopback channel for testing.
//!
//! Events pushed through a [`LoopbackHandle`] are delivered by
//! [`LoopbackChannel::next_event`], and room commands issued on the
//! channel are recorded on the handle for inspection.

use std::sync::Arc;

use taskboard_proto::event::{BoardEvent, RoomCommand};
use tokio::sync::{Mutex, mpsc};

use super::{RealtimeChannel, RealtimeError};

/// In-process [`RealtimeChannel`] fed by a [`LoopbackHandle`].
pub struct LoopbackChannel {
    rx: Mutex<mpsc::UnboundedReceiver<BoardEvent>>,
    commands: Arc<parking_lot::Mutex<Vec<RoomCommand>>>,
}

/// Test-side end of a [`LoopbackChannel`].
#[derive(Clone)]
pub struct LoopbackHandle {
    tx: mpsc::UnboundedSender<BoardEvent>,
    commands: Arc<parking_lot::Mutex<Vec<RoomCommand>>>,
}

impl LoopbackChannel {
    /// Creates a channel and the handle that feeds it.
    #[must_use]
    pub fn new() -> (Self, LoopbackHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let commands = Arc::new(parking_lot::Mutex::new(Vec::new()));
        (
            Self {
                rx: Mutex::new(rx),
                commands: Arc::clone(&commands),
            },
            LoopbackHandle { tx, commands },
        )
    }
}

impl LoopbackHandle {
    /// Delivers an event to the channel. Returns false once the channel is
    /// dropped.
    pub fn push(&self, event: BoardEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// A sender that feeds the same channel, e.g. for
    /// [`crate::api::memory::InMemoryBoardApi::echo_events`].
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<BoardEvent> {
        self.tx.clone()
    }

    /// Room commands issued so far, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<RoomCommand> {
        self.commands.lock().clone()
    }
}

impl RealtimeChannel for LoopbackChannel {
    async fn join_project(&self, project_id: &str) -> Result<(), RealtimeError> {
        self.commands
            .lock()
            .push(RoomCommand::Join(project_id.to_string()));
        Ok(())
    }

    async fn leave_project(&self, project_id: &str) -> Result<(), RealtimeError> {
        self.commands
            .lock()
            .push(RoomCommand::Leave(project_id.to_string()));
        Ok(())
    }

    async fn next_event(&self) -> Result<BoardEvent, RealtimeError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(RealtimeError::ConnectionClosed)
    }
}
