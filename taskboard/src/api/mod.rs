//! Client side of the external task HTTP API.
//!
//! Defines the [`BoardApi`] trait the session talks to. Implementations:
//! - [`http::HttpBoardApi`]: `reqwest` client for the real service
//! - [`memory::InMemoryBoardApi`]: in-process server for tests

pub mod http;
pub mod memory;

use taskboard_proto::task::{NewTask, Task, TaskId, TaskPatch, UserRef};

/// Errors returned by API calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server rejected the credentials (HTTP 401).
    #[error("not authorized, session expired")]
    Unauthorized,

    /// Any other non-success status.
    #[error("server returned {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, or the status reason.
        message: String,
    },

    /// The request never got a response (connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status associated with the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }
}

/// Task endpoints of the external service.
///
/// Every method maps to one HTTP request. Implementations must not touch
/// board state; reconciling responses is the session's job.
pub trait BoardApi: Send + Sync {
    /// `GET /projects/{project_id}/tasks`.
    fn list_tasks(
        &self,
        project_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// `POST /projects/{project_id}/tasks`. Returns the created task.
    fn create_task(
        &self,
        project_id: &str,
        body: &NewTask,
    ) -> impl std::future::Future<Output = Result<Task, ApiError>> + Send;

    /// `PUT /projects/{project_id}/tasks/{task_id}`. Returns the stored task.
    fn update_task(
        &self,
        project_id: &str,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, ApiError>> + Send;

    /// `DELETE /projects/{project_id}/tasks/{task_id}`.
    fn delete_task(
        &self,
        project_id: &str,
        task_id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// `GET /users/search?username={query}`.
    fn search_users(
        &self,
        query: &str,
    ) -> impl std::future::Future<Output = Result<Vec<UserRef>, ApiError>> + Send;
}
