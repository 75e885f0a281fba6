//! Shared wire definitions for `Taskboard`.
//!
//! Task records and request bodies exchanged with the HTTP API, the
//! real-time board events pushed to a project room, and the Engine.IO /
//! Socket.IO text frame codec that carries them.

pub mod codec;
pub mod event;
pub mod task;
