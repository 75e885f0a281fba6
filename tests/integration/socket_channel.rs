//! Integration tests for the Socket.IO real-time channel.
//!
//! An in-process axum WebSocket endpoint speaks just enough Engine.IO v4 /
//! Socket.IO to stand in for the task service: it sends the open packet,
//! acks (or rejects) the connect request, forwards every client frame to the
//! test and writes whatever frames the test pushes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};

use taskboard::api::memory::InMemoryBoardApi;
use taskboard::board::RemoteApplied;
use taskboard::realtime::socket::{SocketConfig, SocketIoChannel};
use taskboard::realtime::{RealtimeChannel, RealtimeError};
use taskboard::session::{BoardSession, SessionConfig};
use taskboard_proto::codec::{decode_frame, encode_frame};
use taskboard_proto::event::{BoardEvent, RoomCommand};
use taskboard_proto::task::{Priority, Task, TaskId, TaskStatus, UserId, UserRef};

const OPEN: &str =
    r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// Frame the test pushes to make the server close the socket.
const CLOSE: &str = "<close>";

#[derive(Clone)]
struct ServerState {
    from_client: mpsc::UnboundedSender<String>,
    to_client: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    reject: Option<&'static str>,
}

struct MockService {
    url: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl MockService {
    async fn start(reject: Option<&'static str>) -> Self {
        let (from_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, to_rx) = mpsc::unbounded_channel();
        let state = ServerState {
            from_client: from_tx,
            to_client: Arc::new(Mutex::new(Some(to_rx))),
            reject,
        };
        let app = Router::new()
            .route("/socket.io/", axum::routing::get(ws_handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{addr}"),
            from_client,
            to_client,
        }
    }

    fn push(&self, frame: impl Into<String>) {
        self.to_client.send(frame.into()).unwrap();
    }

    fn push_event(&self, event: &BoardEvent) {
        self.push(encode_frame(&event.to_frame().unwrap()).unwrap());
    }

    async fn next_from_client(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("client frame timed out")
            .expect("server gone")
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: ServerState) {
    let (mut tx, mut rx) = socket.split();
    if tx.send(Message::Text(OPEN.into())).await.is_err() {
        return;
    }
    let Some(mut outgoing) = state.to_client.lock().await.take() else {
        return;
    };
    loop {
        tokio::select! {
            incoming = rx.next() => {
                let Some(Ok(Message::Text(text))) = incoming else { break };
                let text = text.as_str().to_string();
                if text.starts_with("40") {
                    let reply = match state.reject {
                        Some(message) => format!(r#"44{{"message":"{message}"}}"#),
                        None => r#"40{"sid":"sio-1"}"#.to_string(),
                    };
                    if tx.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
                let _ = state.from_client.send(text);
            }
            frame = outgoing.recv() => {
                match frame {
                    Some(frame) if frame == CLOSE => {
                        let _ = tx.send(Message::Close(None)).await;
                        break;
                    }
                    Some(frame) => {
                        if tx.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

fn config(token: Option<&str>) -> SocketConfig {
    SocketConfig {
        connect_timeout: Duration::from_secs(5),
        event_buffer: 16,
        auth_token: token.map(str::to_string),
    }
}

fn task(id: &str, status: TaskStatus) -> Task {
    let at = "2026-01-01T00:00:00Z".parse().unwrap();
    Task {
        id: TaskId::new(id),
        title: format!("Task {id}"),
        description: None,
        status,
        priority: Priority::Medium,
        due_date: None,
        assigned_to: None,
        created_by: UserRef::from_id(UserId::new("u1")),
        project: "p1".to_string(),
        created_at: at,
        updated_at: at,
    }
}

async fn next_event(channel: &SocketIoChannel) -> Result<BoardEvent, RealtimeError> {
    tokio::time::timeout(Duration::from_secs(5), channel.next_event())
        .await
        .expect("event timed out")
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_sends_auth_token() {
    let mut service = MockService::start(None).await;
    let channel = SocketIoChannel::connect(&service.url, &config(Some("tok")))
        .await
        .unwrap();

    assert_eq!(service.next_from_client().await, r#"40{"token":"tok"}"#);
    assert!(channel.is_connected());
    assert_eq!(channel.url().scheme(), "ws");
    assert_eq!(channel.url().path(), "/socket.io/");
}

#[tokio::test]
async fn connect_without_token_sends_bare_connect() {
    let mut service = MockService::start(None).await;
    let _channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();
    assert_eq!(service.next_from_client().await, "40");
}

#[tokio::test]
async fn rejected_connect_is_a_handshake_error() {
    let service = MockService::start(Some("invalid token")).await;
    let result = SocketIoChannel::connect(&service.url, &config(Some("bad"))).await;
    match result {
        Err(RealtimeError::Handshake(message)) => assert_eq!(message, "invalid token"),
        other => panic!("expected handshake error, got {:?}", other.err()),
    }
}

// ---------------------------------------------------------------------------
// Rooms and events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn room_commands_are_emitted() {
    let mut service = MockService::start(None).await;
    let channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();
    let _connect = service.next_from_client().await;

    channel.join_project("p1").await.unwrap();
    channel.leave_project("p1").await.unwrap();

    let join = decode_frame(&service.next_from_client().await).unwrap();
    let leave = decode_frame(&service.next_from_client().await).unwrap();
    assert_eq!(
        RoomCommand::from_frame(&join),
        Some(RoomCommand::Join("p1".to_string()))
    );
    assert_eq!(
        RoomCommand::from_frame(&leave),
        Some(RoomCommand::Leave("p1".to_string()))
    );
}

#[tokio::test]
async fn board_events_are_delivered_in_order() {
    let service = MockService::start(None).await;
    let channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();

    let created = BoardEvent::Created(task("a", TaskStatus::Todo));
    let updated = BoardEvent::Updated(task("a", TaskStatus::Done));
    let deleted = BoardEvent::Deleted(TaskId::new("a"));
    service.push_event(&created);
    service.push_event(&updated);
    service.push_event(&deleted);

    assert_eq!(next_event(&channel).await.unwrap(), created);
    assert_eq!(next_event(&channel).await.unwrap(), updated);
    assert_eq!(next_event(&channel).await.unwrap(), deleted);
}

#[tokio::test]
async fn malformed_and_unrelated_frames_are_skipped() {
    let service = MockService::start(None).await;
    let channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();

    service.push("42[not json");
    service.push(r#"42["chatMessage",{"text":"hi"}]"#);
    service.push(r#"42["taskCreated",{"title":"no id"}]"#);
    service.push("9");
    let deleted = BoardEvent::Deleted(TaskId::new("b"));
    service.push_event(&deleted);

    assert_eq!(next_event(&channel).await.unwrap(), deleted);
    assert!(channel.is_connected());
}

#[tokio::test]
async fn server_ping_is_answered() {
    let mut service = MockService::start(None).await;
    let _channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();
    let _connect = service.next_from_client().await;

    service.push("2");
    assert_eq!(service.next_from_client().await, "3");
}

#[tokio::test]
async fn server_close_ends_the_stream() {
    let service = MockService::start(None).await;
    let channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();

    service.push(CLOSE);
    assert!(matches!(
        next_event(&channel).await,
        Err(RealtimeError::ConnectionClosed)
    ));
    assert!(!channel.is_connected());
    assert!(matches!(
        channel.join_project("p1").await,
        Err(RealtimeError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn socket_io_disconnect_ends_the_stream() {
    let service = MockService::start(None).await;
    let channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();

    service.push("41");
    assert!(matches!(
        next_event(&channel).await,
        Err(RealtimeError::ConnectionClosed)
    ));
}

// ---------------------------------------------------------------------------
// Session fed by the socket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_applies_socket_events() {
    let mut service = MockService::start(None).await;
    let api = Arc::new(InMemoryBoardApi::with_tasks(vec![task("a", TaskStatus::Todo)]));
    let (session, _notices) = BoardSession::new(api, "p1", &SessionConfig::default());
    session.open().await.unwrap();

    let channel = SocketIoChannel::connect(&service.url, &config(None))
        .await
        .unwrap();
    let _connect = service.next_from_client().await;
    session.join(&channel).await.unwrap();
    let join = decode_frame(&service.next_from_client().await).unwrap();
    assert_eq!(
        RoomCommand::from_frame(&join),
        Some(RoomCommand::Join("p1".to_string()))
    );

    let mut moved = task("a", TaskStatus::InProgress);
    moved.updated_at = "2026-01-02T00:00:00Z".parse().unwrap();
    service.push_event(&BoardEvent::Updated(moved));
    let mut other_project = task("z", TaskStatus::Todo);
    other_project.project = "p2".to_string();
    service.push_event(&BoardEvent::Created(other_project));
    service.push(CLOSE);

    let mut applied = Vec::new();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        session.run_events(&channel, |_, outcome| applied.push(outcome)),
    )
    .await
    .unwrap();

    assert!(matches!(result, Err(RealtimeError::ConnectionClosed)));
    assert_eq!(applied, vec![RemoteApplied::Moved, RemoteApplied::Ignored]);
    assert_eq!(session.lane_ids(TaskStatus::InProgress), vec![TaskId::new("a")]);
    assert_eq!(session.snapshot().len(), 1);
}
