//! Socket.IO client over `tokio-tungstenite`.
//!
//! Only the pieces of the protocol the task service needs: the WebSocket
//! transport (no long-polling), the default namespace, text frames, server
//! heartbeats and plain events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use taskboard_proto::codec::{Frame, decode_frame, encode_connect, encode_frame};
use taskboard_proto::event::{BoardEvent, RoomCommand};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use super::{RealtimeChannel, RealtimeError, socket_url};

type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Connection settings for [`SocketIoChannel::connect`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Limit for the WebSocket connect and for each handshake step.
    pub connect_timeout: Duration,
    /// Decoded events buffered before the reader waits for the consumer.
    pub event_buffer: usize,
    /// Sent as `{ "token": .. }` in the Socket.IO connect packet.
    pub auth_token: Option<String>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            event_buffer: 256,
            auth_token: None,
        }
    }
}

/// A connected Socket.IO session delivering [`BoardEvent`]s.
///
/// A background task reads the socket, answers heartbeats and forwards
/// decoded board events; it stops when the server closes the session or
/// the channel is dropped.
pub struct SocketIoChannel {
    url: Url,
    ws_sender: Arc<Mutex<WsSender>>,
    incoming: Mutex<mpsc::Receiver<BoardEvent>>,
    connected: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl SocketIoChannel {
    /// Connects to the real-time service next to the HTTP API at `api_url`.
    ///
    /// 1. Opens `ws(s)://host/socket.io/?EIO=4&transport=websocket`
    /// 2. Waits for the Engine.IO `open` packet
    /// 3. Sends the Socket.IO `CONNECT` packet and waits for its ack
    /// 4. Spawns the reader task
    ///
    /// # Errors
    ///
    /// - [`RealtimeError::InvalidUrl`] if `api_url` is not http(s)/ws(s)
    /// - [`RealtimeError::Timeout`] if any step exceeds `connect_timeout`
    /// - [`RealtimeError::Handshake`] if the server rejects the session
    /// - [`RealtimeError::WebSocket`] / [`RealtimeError::ConnectionClosed`]
    ///   for transport failures
    pub async fn connect(api_url: &str, config: &SocketConfig) -> Result<Self, RealtimeError> {
        let url = socket_url(api_url)?;
        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    warn!(%url, "socket connect timed out");
                    RealtimeError::Timeout
                })?
                .map_err(|e| {
                    warn!(%url, err = %e, "socket connect failed");
                    RealtimeError::WebSocket(e.to_string())
                })?;
        let (mut writer, mut reader) = ws_stream.split();

        let opened = tokio::time::timeout(config.connect_timeout, next_frame(&mut reader))
            .await
            .map_err(|_| RealtimeError::Timeout)??;
        let handshake = match opened {
            Frame::Open(handshake) => handshake,
            other => {
                return Err(RealtimeError::Handshake(format!(
                    "expected open packet, got {other:?}"
                )));
            }
        };
        debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine.io session opened");

        let auth = config.auth_token.as_ref().map(|token| json!({ "token": token }));
        send_text(&mut writer, encode_connect(auth.as_ref())?).await?;

        let sid = tokio::time::timeout(
            config.connect_timeout,
            await_connect_ack(&mut reader, &mut writer),
        )
        .await
        .map_err(|_| {
            warn!(%url, "socket.io connect ack timed out");
            RealtimeError::Timeout
        })??;
        info!(%url, sid = sid.as_deref().unwrap_or("-"), "socket.io connected");

        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let connected = Arc::new(AtomicBool::new(true));
        let ws_sender = Arc::new(Mutex::new(writer));
        let reader_handle = tokio::spawn(reader_loop(
            reader,
            Arc::clone(&ws_sender),
            tx,
            Arc::clone(&connected),
        ));

        Ok(Self {
            url,
            ws_sender,
            incoming: Mutex::new(rx),
            connected,
            reader_handle,
        })
    }

    /// The WebSocket URL in use.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// False once the server closed the session or a send failed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn emit(&self, command: &RoomCommand) -> Result<(), RealtimeError> {
        if !self.is_connected() {
            return Err(RealtimeError::ConnectionClosed);
        }
        let text = encode_frame(&command.to_frame())?;
        let mut sender = self.ws_sender.lock().await;
        send_text(&mut sender, text).await.inspect_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
        })
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

impl RealtimeChannel for SocketIoChannel {
    async fn join_project(&self, project_id: &str) -> Result<(), RealtimeError> {
        self.emit(&RoomCommand::Join(project_id.to_string())).await?;
        info!(project = project_id, "joined project room");
        Ok(())
    }

    async fn leave_project(&self, project_id: &str) -> Result<(), RealtimeError> {
        self.emit(&RoomCommand::Leave(project_id.to_string())).await?;
        info!(project = project_id, "left project room");
        Ok(())
    }

    async fn next_event(&self) -> Result<BoardEvent, RealtimeError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(RealtimeError::ConnectionClosed)
    }
}

async fn send_text(writer: &mut WsSender, text: String) -> Result<(), RealtimeError> {
    writer.send(Message::text(text)).await.map_err(|e| {
        warn!(err = %e, "socket send failed");
        RealtimeError::ConnectionClosed
    })
}

/// Reads the next text frame during the handshake.
async fn next_frame(reader: &mut WsReader) -> Result<Frame, RealtimeError> {
    loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => return Ok(decode_frame(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => return Err(RealtimeError::ConnectionClosed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(RealtimeError::WebSocket(e.to_string())),
        }
    }
}

/// Waits for the Socket.IO connect ack, answering heartbeats meanwhile.
async fn await_connect_ack(
    reader: &mut WsReader,
    writer: &mut WsSender,
) -> Result<Option<String>, RealtimeError> {
    loop {
        match next_frame(reader).await? {
            Frame::Connect { sid } => return Ok(sid),
            Frame::ConnectError(message) => {
                warn!(%message, "socket.io connect rejected");
                return Err(RealtimeError::Handshake(message));
            }
            Frame::Ping => send_text(writer, "3".to_string()).await?,
            Frame::Close | Frame::Disconnect => return Err(RealtimeError::ConnectionClosed),
            other => debug!(?other, "frame before connect ack ignored"),
        }
    }
}

/// Background task: heartbeats, event decoding, disconnect detection.
/// Malformed frames are logged and skipped.
async fn reader_loop(
    mut reader: WsReader,
    writer: Arc<Mutex<WsSender>>,
    tx: mpsc::Sender<BoardEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(message) = reader.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("socket closed by server");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(err = %e, "socket read error");
                break;
            }
        };
        match decode_frame(text.as_str()) {
            Ok(Frame::Ping) => {
                let mut sender = writer.lock().await;
                if send_text(&mut sender, "3".to_string()).await.is_err() {
                    break;
                }
            }
            Ok(Frame::Event { name, args, .. }) => match BoardEvent::from_socket_event(&name, &args) {
                Ok(Some(event)) => {
                    debug!(event = %name, task_id = %event.task_id(), "board event received");
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => debug!(event = %name, "ignoring unrelated event"),
                Err(e) => warn!(err = %e, "malformed board event, skipping"),
            },
            Ok(Frame::Close | Frame::Disconnect) => {
                info!("socket.io session closed by server");
                break;
            }
            Ok(Frame::ConnectError(message)) => warn!(%message, "socket.io error from server"),
            Ok(other) => debug!(?other, "frame ignored"),
            Err(e) => warn!(err = %e, "malformed frame, skipping"),
        }
    }
    connected.store(false, Ordering::Relaxed);
    debug!("socket reader task exiting");
}
