//! `reqwest` implementation of [`BoardApi`].

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use taskboard_proto::task::{NewTask, Task, TaskId, TaskPatch, UserRef};
use tracing::{debug, warn};

use super::{ApiError, BoardApi};

/// HTTP client for `{base}/api/...` with optional bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpBoardApi {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

/// Error body shape: `{ "message": "..." }`.
#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Create and update answer `{ "message": "...", "task": {...} }`; accept
/// a bare task as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskBody {
    Envelope { task: Task },
    Bare(Task),
}

impl TaskBody {
    fn into_task(self) -> Task {
        match self {
            Self::Envelope { task } | Self::Bare(task) => task,
        }
    }
}

fn network(e: &reqwest::Error) -> ApiError {
    if e.is_decode() {
        ApiError::Decode(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

impl HttpBoardApi {
    /// Creates a client for the service at `api_url` (e.g.
    /// `http://localhost:5000`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the URL cannot be used as a base or
    /// the HTTP client cannot be built.
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(api_url)
            .map_err(|e| ApiError::Network(format!("invalid api url {api_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Network(format!("invalid api url {api_url}")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| network(&e))?;
        Ok(Self {
            client,
            base,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Builds `{base}/api/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Network(format!("invalid api url {}", self.base)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "api request");
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and maps non-success statuses to [`ApiError`].
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, "api request failed");
            network(&e)
        })?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("api rejected credentials");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            warn!(status = status.as_u16(), %message, "api returned error status");
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ApiError::Decode(e.to_string())
            } else {
                ApiError::Network(e.to_string())
            }
        })
    }
}

impl BoardApi for HttpBoardApi {
    async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError> {
        let url = self.endpoint(&["projects", project_id, "tasks"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Self::json(response).await
    }

    async fn create_task(&self, project_id: &str, body: &NewTask) -> Result<Task, ApiError> {
        let url = self.endpoint(&["projects", project_id, "tasks"])?;
        let response = self
            .send(self.request(Method::POST, url).json(body))
            .await?;
        Self::json::<TaskBody>(response).await.map(TaskBody::into_task)
    }

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, ApiError> {
        let url = self.endpoint(&["projects", project_id, "tasks", task_id.as_str()])?;
        let response = self
            .send(self.request(Method::PUT, url).json(patch))
            .await?;
        Self::json::<TaskBody>(response).await.map(TaskBody::into_task)
    }

    async fn delete_task(&self, project_id: &str, task_id: &TaskId) -> Result<(), ApiError> {
        let url = self.endpoint(&["projects", project_id, "tasks", task_id.as_str()])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserRef>, ApiError> {
        let url = self.endpoint(&["users", "search"])?;
        let response = self
            .send(self.request(Method::GET, url).query(&[("username", query)]))
            .await?;
        Self::json(response).await
    }
}
