//! Integration tests for the HTTP task API client.
//!
//! An in-process axum server plays the task service: it checks the bearer
//! token, records what the client sent and answers with the service's JSON
//! shapes (including the `{ message, task }` envelope and error bodies).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};

use taskboard::api::http::HttpBoardApi;
use taskboard::api::{ApiError, BoardApi};
use taskboard::board::MoveOutcome;
use taskboard::session::{BoardSession, SessionConfig};
use taskboard_proto::task::{NewTask, Priority, TaskId, TaskPatch, TaskStatus, UserId};

const TOKEN: &str = "tok";

// ---------------------------------------------------------------------------
// Mock service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Recorded {
    route: String,
    body: Option<Value>,
    query: HashMap<String, String>,
}

#[derive(Default)]
struct Recorder {
    requests: parking_lot::Mutex<Vec<Recorded>>,
}

impl Recorder {
    fn last(&self) -> Recorded {
        self.requests.lock().last().cloned().unwrap()
    }

    fn record(&self, route: String, body: Option<Value>, query: HashMap<String, String>) {
        self.requests.lock().push(Recorded { route, body, query });
    }
}

type Shared = State<Arc<Recorder>>;

fn task_json(id: &str, status: &str) -> Value {
    json!({
        "_id": id,
        "title": format!("Task {id}"),
        "status": status,
        "priority": "High",
        "createdBy": { "_id": "u1", "username": "alice", "name": "Alice" },
        "project": "p1",
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z"
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Not authorized" })),
    )
        .into_response()
}

async fn list_tasks(
    State(rec): Shared,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    rec.record(format!("GET {project}"), None, HashMap::new());
    if project == "garbage" {
        return (
            StatusCode::OK,
            [("content-type", "application/json")],
            "[{not json",
        )
            .into_response();
    }
    Json(json!([task_json("t1", "To Do"), task_json("t2", "In Progress")])).into_response()
}

async fn create_task(
    State(rec): Shared,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    rec.record(format!("POST {project}"), Some(body.clone()), HashMap::new());
    let mut task = task_json("t9", "To Do");
    task["title"] = body["title"].clone();
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Task created", "task": task })),
    )
        .into_response()
}

async fn update_task(
    State(rec): Shared,
    Path((project, task_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    rec.record(format!("PUT {project}/{task_id}"), Some(body.clone()), HashMap::new());
    if task_id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Task not found" })),
        )
            .into_response();
    }
    let mut task = task_json(&task_id, "To Do");
    if let Some(status) = body.get("status") {
        task["status"] = status.clone();
    }
    Json(json!({ "message": "Task updated", "task": task })).into_response()
}

async fn delete_task(
    State(rec): Shared,
    Path((project, task_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    rec.record(format!("DELETE {project}/{task_id}"), None, HashMap::new());
    if task_id == "locked" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    Json(json!({ "message": "Task deleted" })).into_response()
}

async fn search_users(
    State(rec): Shared,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    rec.record("GET users".to_string(), None, query);
    Json(json!([
        { "_id": "u1", "username": "alice", "name": "Alice" },
        { "_id": "u2", "username": "alina", "avatar": "https://example.com/a.png" }
    ]))
    .into_response()
}

async fn start_server() -> (String, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let app = Router::new()
        .route(
            "/api/projects/{project}/tasks",
            get(list_tasks).post(create_task),
        )
        .route(
            "/api/projects/{project}/tasks/{task}",
            axum::routing::put(update_task).delete(delete_task),
        )
        .route("/api/users/search", get(search_users))
        .with_state(Arc::clone(&recorder));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), recorder)
}

fn client(base: &str) -> HttpBoardApi {
    HttpBoardApi::new(base, Some(TOKEN.to_string()), Duration::from_secs(5)).unwrap()
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_tasks_decodes_records() {
    let (base, recorder) = start_server().await;
    let tasks = client(&base).list_tasks("p1").await.unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, TaskId::new("t1"));
    assert_eq!(tasks[0].status, TaskStatus::Todo);
    assert_eq!(tasks[0].priority, Priority::High);
    assert_eq!(tasks[0].created_by.username, "alice");
    assert_eq!(tasks[1].status, TaskStatus::InProgress);
    assert_eq!(recorder.last().route, "GET p1");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (base, _recorder) = start_server().await;
    let api = HttpBoardApi::new(&base, None, Duration::from_secs(5)).unwrap();
    assert_eq!(api.list_tasks("p1").await, Err(ApiError::Unauthorized));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (base, _recorder) = start_server().await;
    let result = client(&base).list_tasks("garbage").await;
    assert!(matches!(result, Err(ApiError::Decode(_))), "{result:?}");
}

#[tokio::test]
async fn create_sends_camel_case_and_unwraps_envelope() {
    let (base, recorder) = start_server().await;
    let body = NewTask {
        priority: Priority::Urgent,
        due_date: Some("2026-03-01T00:00:00Z".parse().unwrap()),
        assigned_to: Some(UserId::new("u2")),
        ..NewTask::new("Write docs")
    };
    let task = client(&base).create_task("p1", &body).await.unwrap();

    assert_eq!(task.id, TaskId::new("t9"));
    assert_eq!(task.title, "Write docs");
    let sent = recorder.last().body.unwrap();
    assert_eq!(sent["title"], "Write docs");
    assert_eq!(sent["priority"], "Urgent");
    assert_eq!(sent["assignedTo"], "u2");
    assert!(sent.get("dueDate").is_some());
    assert!(sent.get("description").is_none());
}

#[tokio::test]
async fn update_sends_only_set_fields() {
    let (base, recorder) = start_server().await;
    let task = client(&base)
        .update_task("p1", &TaskId::new("t1"), &TaskPatch::status(TaskStatus::Done))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Done);
    let last = recorder.last();
    assert_eq!(last.route, "PUT p1/t1");
    assert_eq!(last.body.unwrap(), json!({ "status": "Done" }));
}

#[tokio::test]
async fn server_message_is_kept() {
    let (base, _recorder) = start_server().await;
    let result = client(&base)
        .update_task("p1", &TaskId::new("missing"), &TaskPatch::status(TaskStatus::Done))
        .await;
    assert_eq!(
        result,
        Err(ApiError::Server {
            status: 404,
            message: "Task not found".to_string()
        })
    );
}

#[tokio::test]
async fn non_json_error_falls_back_to_reason() {
    let (base, _recorder) = start_server().await;
    let result = client(&base).delete_task("p1", &TaskId::new("locked")).await;
    assert_eq!(
        result,
        Err(ApiError::Server {
            status: 500,
            message: "Internal Server Error".to_string()
        })
    );
}

#[tokio::test]
async fn delete_succeeds() {
    let (base, recorder) = start_server().await;
    client(&base).delete_task("p1", &TaskId::new("t2")).await.unwrap();
    assert_eq!(recorder.last().route, "DELETE p1/t2");
}

#[tokio::test]
async fn search_passes_username_query() {
    let (base, recorder) = start_server().await;
    let users = client(&base).search_users("ali").await.unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[1].username, "alina");
    assert_eq!(users[1].name, "");
    assert_eq!(users[1].avatar.as_deref(), Some("https://example.com/a.png"));
    assert_eq!(
        recorder.last().query.get("username").map(String::as_str),
        Some("ali")
    );
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let result = client(&format!("http://{addr}")).list_tasks("p1").await;
    assert!(matches!(result, Err(ApiError::Network(_))), "{result:?}");
}

// ---------------------------------------------------------------------------
// Session over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_drag_over_http_commits() {
    let (base, recorder) = start_server().await;
    let (session, _notices) =
        BoardSession::new(Arc::new(client(&base)), "p1", &SessionConfig::default());
    assert_eq!(session.open().await.unwrap(), 2);

    let outcome = session
        .move_across_lanes(&TaskId::new("t1"), TaskStatus::Todo, TaskStatus::Done, 0)
        .await
        .unwrap();

    assert_eq!(outcome, MoveOutcome::Committed);
    assert_eq!(session.lane_ids(TaskStatus::Done), vec![TaskId::new("t1")]);
    assert_eq!(recorder.last().body.unwrap(), json!({ "status": "Done" }));
}

#[tokio::test]
async fn session_drag_rejected_over_http_rolls_back() {
    let (base, _recorder) = start_server().await;
    let api = Arc::new(client(&base));
    let (session, mut notices) = BoardSession::new(api, "p1", &SessionConfig::default());
    session.open().await.unwrap();
    // Unknown to the server, so the PUT answers 404.
    session.apply_remote_event(&taskboard_proto::event::BoardEvent::Created(
        serde_json::from_value(task_json("missing", "To Do")).unwrap(),
    ));

    let result = session
        .move_across_lanes(
            &TaskId::new("missing"),
            TaskStatus::Todo,
            TaskStatus::InProgress,
            0,
        )
        .await;

    assert!(result.is_err());
    assert_eq!(
        session.lane_ids(TaskStatus::Todo),
        vec![TaskId::new("t1"), TaskId::new("missing")]
    );
    assert!(matches!(
        notices.try_recv(),
        Ok(taskboard::session::BoardNotice::MoveFailed { .. })
    ));
}
