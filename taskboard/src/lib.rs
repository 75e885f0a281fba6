//! `Taskboard` client library: a kanban board kept in sync with a
//! collaborative task service.
//!
//! [`session::BoardSession`] is the entry point. It loads a project's tasks
//! over the HTTP [`api`], applies drags optimistically on the [`board`], and
//! merges the room events delivered by a [`realtime`] channel.

pub mod api;
pub mod board;
pub mod cli;
pub mod config;
pub mod realtime;
pub mod search;
pub mod session;
