//! Live job updates over Socket.IO. Only the websocket transport of
//! Engine.IO v4 is spoken, on the default namespace.

use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;
use vidspire_core::AnalysisResult;

pub const SOCKET_IO_PATH: &str = "/socket.io/";

// Engine.IO packet types, then Socket.IO ones carried in a message packet.
const EIO_OPEN: char = '0';
const EIO_CLOSE: &str = "1";
const EIO_PING: &str = "2";
const EIO_PONG: &str = "3";
const EIO_NOOP: &str = "6";
const SIO_CONNECT: &str = "40";
const SIO_DISCONNECT: &str = "41";
const SIO_EVENT: &str = "42";
const SIO_CONNECT_ERROR: &str = "44";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    Socket(String),
    #[error("socket.io handshake failed: {0}")]
    Handshake(String),
}

/// One server event on a job's push channel. Decodes from the Socket.IO
/// event array, `["progress", {...}]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum PushEvent {
    Progress {
        #[serde(default, rename = "jobId")]
        job_id: Option<String>,
        percentage: f64,
        #[serde(default)]
        message: String,
        #[serde(default)]
        stage: Option<String>,
    },
    Error {
        #[serde(default, rename = "jobId")]
        job_id: Option<String>,
        error: String,
    },
    Completed {
        #[serde(default, rename = "jobId")]
        job_id: Option<String>,
        result: AnalysisResult,
    },
}

impl PushEvent {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            PushEvent::Progress { job_id, .. }
            | PushEvent::Error { job_id, .. }
            | PushEvent::Completed { job_id, .. } => job_id.as_deref(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PushEvent::Progress { .. })
    }
}

pub type PushStream = Pin<Box<dyn Stream<Item = Result<PushEvent, PushError>> + Send>>;

/// Opens the push channel for one job. The returned stream ends when the
/// server closes the connection; dropping it closes the socket.
#[async_trait::async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, job_id: &str) -> Result<PushStream, PushError>;
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    socket_url: Url,
}

impl WsConnector {
    /// Accepts `ws`/`wss` URLs, and `http`/`https` ones which are mapped onto them.
    pub fn new(socket_url: Url) -> Result<Self, PushError> {
        let mut socket_url = socket_url;
        let scheme = match socket_url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(PushError::InvalidUrl(format!("unsupported scheme `{other}`"))),
        };
        socket_url
            .set_scheme(scheme)
            .map_err(|_| PushError::InvalidUrl(socket_url.to_string()))?;
        Ok(Self { socket_url })
    }

    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }

    /// The websocket endpoint of the Socket.IO server for one job.
    pub fn endpoint(&self, job_id: &str) -> Url {
        let mut url = self.socket_url.clone();
        url.set_path(SOCKET_IO_PATH);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket")
            .append_pair("jobId", job_id);
        url
    }
}

#[async_trait::async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, job_id: &str) -> Result<PushStream, PushError> {
        let url = self.endpoint(job_id);
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| PushError::Socket(err.to_string()))?;

        let session = Session::open(socket).await?;
        engine_logging::engine_debug!("Push channel open for job {job_id}");

        let events = futures_util::stream::unfold(Some(session), |session| async move {
            let mut session = session?;
            match session.next_event().await {
                Some(Ok(event)) => Some((Ok(event), Some(session))),
                Some(Err(err)) => Some((Err(err), None)),
                None => None,
            }
        });
        Ok(Box::pin(events))
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPacket {
    sid: String,
    ping_interval: u64,
    ping_timeout: u64,
}

/// What one Engine.IO text packet means to the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open,
    Ping,
    Connected,
    ConnectError(String),
    Event(PushEvent),
    Closed,
    Ignored,
}

/// Classifies one text frame. Event payloads that do not decode as a
/// [`PushEvent`] are ignored.
pub fn decode_packet(text: &str) -> Packet {
    if text.starts_with(EIO_OPEN) && text.len() > 1 {
        return Packet::Open;
    }
    match text {
        EIO_PING => return Packet::Ping,
        EIO_CLOSE | SIO_DISCONNECT => return Packet::Closed,
        EIO_PONG | EIO_NOOP => return Packet::Ignored,
        _ => {}
    }
    if let Some(rest) = text.strip_prefix(SIO_CONNECT_ERROR) {
        let message = serde_json::from_str::<serde_json::Value>(rest)
            .ok()
            .and_then(|value| value.get("message")?.as_str().map(str::to_string))
            .unwrap_or_else(|| rest.to_string());
        return Packet::ConnectError(message);
    }
    if text.starts_with(SIO_CONNECT) {
        return Packet::Connected;
    }
    if let Some(rest) = text.strip_prefix(SIO_EVENT) {
        // An ack id may sit between the type and the payload.
        let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        return match serde_json::from_str::<PushEvent>(payload) {
            Ok(event) => Packet::Event(event),
            Err(err) => {
                engine_logging::engine_debug!("Ignoring push event: {err}");
                Packet::Ignored
            }
        };
    }
    engine_logging::engine_debug!("Ignoring push packet `{text}`");
    Packet::Ignored
}

struct Session {
    socket: Socket,
    /// Silence longer than this means the server is gone.
    idle_limit: Duration,
}

impl Session {
    /// Reads the Engine.IO open packet, then joins the default namespace.
    async fn open(mut socket: Socket) -> Result<Self, PushError> {
        let open = loop {
            let text = next_text(&mut socket)
                .await?
                .ok_or_else(|| PushError::Handshake("closed before open".to_string()))?;
            if decode_packet(&text) == Packet::Open {
                break serde_json::from_str::<OpenPacket>(&text[1..])
                    .map_err(|err| PushError::Handshake(err.to_string()))?;
            }
        };
        engine_logging::engine_debug!(
            "Engine.IO session {} (ping every {}ms)",
            open.sid,
            open.ping_interval
        );

        let mut session = Self {
            socket,
            idle_limit: Duration::from_millis(open.ping_interval + open.ping_timeout),
        };
        session.send(SIO_CONNECT).await?;
        loop {
            let text = session
                .next_text()
                .await?
                .ok_or_else(|| PushError::Handshake("closed before connect".to_string()))?;
            match decode_packet(&text) {
                Packet::Connected => return Ok(session),
                Packet::ConnectError(message) => return Err(PushError::Handshake(message)),
                Packet::Ping => session.send(EIO_PONG).await?,
                Packet::Closed => {
                    return Err(PushError::Handshake("closed before connect".to_string()))
                }
                Packet::Open | Packet::Event(_) | Packet::Ignored => {}
            }
        }
    }

    /// Next event for the caller, answering pings on the way. `None` once the
    /// server closes the session.
    async fn next_event(&mut self) -> Option<Result<PushEvent, PushError>> {
        loop {
            let text = match self.next_text().await {
                Ok(Some(text)) => text,
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            };
            match decode_packet(&text) {
                Packet::Event(event) => return Some(Ok(event)),
                Packet::Ping => {
                    if let Err(err) = self.send(EIO_PONG).await {
                        return Some(Err(err));
                    }
                }
                Packet::Closed => return None,
                Packet::ConnectError(message) => return Some(Err(PushError::Socket(message))),
                Packet::Open | Packet::Connected | Packet::Ignored => {}
            }
        }
    }

    async fn next_text(&mut self) -> Result<Option<String>, PushError> {
        match tokio::time::timeout(self.idle_limit, next_text(&mut self.socket)).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Socket("ping timeout".to_string())),
        }
    }

    async fn send(&mut self, packet: &str) -> Result<(), PushError> {
        self.socket
            .send(Message::text(packet.to_string()))
            .await
            .map_err(|err| PushError::Socket(err.to_string()))
    }
}

/// Next text frame, skipping control and binary frames. `None` on close.
async fn next_text(socket: &mut Socket) -> Result<Option<String>, PushError> {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_string())),
            Ok(Message::Close(_)) => return Ok(None),
            Ok(_) => {}
            Err(err) => return Err(PushError::Socket(err.to_string())),
        }
    }
    Ok(None)
}
