//! Real-time project room subscription.
//!
//! The service pushes task changes to every client in a project's room.
//! [`RealtimeChannel`] is the seam the session consumes; implementations:
//! - [`socket::SocketIoChannel`]: Socket.IO over WebSocket
//! - [`loopback::LoopbackChannel`]: in-process channel for tests

pub mod loopback;
pub mod socket;

use taskboard_proto::codec::CodecError;
use taskboard_proto::event::BoardEvent;
use url::Url;

/// Errors that can occur on the real-time channel.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The connection is gone; no more events will arrive.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connecting or the handshake took too long.
    #[error("real-time operation timed out")]
    Timeout,

    /// The server refused or broke the Socket.IO handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The service URL cannot be turned into a socket URL.
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),

    /// A frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The WebSocket layer failed.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// A subscription to project room events.
pub trait RealtimeChannel: Send + Sync {
    /// Joins the room of `project_id`; events for it start arriving.
    fn join_project(
        &self,
        project_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RealtimeError>> + Send;

    /// Leaves the room of `project_id`.
    fn leave_project(
        &self,
        project_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RealtimeError>> + Send;

    /// Waits for the next board event.
    ///
    /// Returns [`RealtimeError::ConnectionClosed`] once the channel is done.
    fn next_event(
        &self,
    ) -> impl std::future::Future<Output = Result<BoardEvent, RealtimeError>> + Send;
}

/// Derives the Socket.IO WebSocket endpoint from the HTTP service URL:
/// `http://host:5000` becomes `ws://host:5000/socket.io/?EIO=4&transport=websocket`.
///
/// # Errors
///
/// Returns [`RealtimeError::InvalidUrl`] for unparsable URLs or schemes
/// other than http(s)/ws(s).
pub fn socket_url(api_url: &str) -> Result<Url, RealtimeError> {
    let mut url =
        Url::parse(api_url).map_err(|e| RealtimeError::InvalidUrl(format!("{api_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(RealtimeError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| RealtimeError::InvalidUrl(api_url.to_string()))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    url.set_fragment(None);
    Ok(url)
}
