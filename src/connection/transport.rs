//! Transport seam between the connection state machine and the socket.
//!
//! Production uses tokio-tungstenite; tests inject a scripted transport
//! through the same traits.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::AgentIdentity;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// One inbound transport event, as seen by the connection state machine.
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete text frame.
    Text(String),
    /// A transport-level fault. Recovery is driven by the close that
    /// follows, never by the error itself.
    Error(String),
    /// The connection ended. `clean` is true for an orderly close
    /// handshake, false for an abnormal drop.
    Closed { clean: bool },
}

/// An established connection. Implementations must be cancel-safe in
/// `recv`: the state machine polls it inside a `select!` loop.
#[allow(async_fn_in_trait)] // callers spawn with concrete transports only
pub trait Transport: Send + 'static {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    async fn send_ping(&mut self) -> Result<(), TransportError>;
    async fn recv(&mut self) -> TransportEvent;
    async fn close(&mut self);
}

/// Dials new connections. Injected so tests can script connect outcomes.
#[allow(async_fn_in_trait)]
pub trait TransportFactory: Send + 'static {
    type Transport: Transport;
    async fn connect(&mut self, url: &str) -> Result<Self::Transport, TransportError>;
}

/// Builds the socket URL from the HTTP base, converting the scheme and
/// embedding the agent identity as query parameters.
pub fn build_ws_url(base_url: &str, identity: &AgentIdentity) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(TransportError::Connect(format!(
            "unsupported URL scheme: {base}"
        )));
    };

    let mut url = reqwest::Url::parse(&format!("{ws_base}/api/chat/ws"))
        .map_err(|e| TransportError::Connect(format!("invalid server URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("agentId", &identity.agent_id)
        .append_pair("name", &identity.display_name);
    Ok(url.to_string())
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// tokio-tungstenite transport.
pub struct WsTransport {
    inner: WsStream,
}

impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.inner
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return TransportEvent::Text(text.as_str().to_owned())
                }
                Some(Ok(Message::Close(_))) => return TransportEvent::Closed { clean: true },
                Some(Ok(_)) => {} // binary / ping / pong
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                None => return TransportEvent::Closed { clean: false },
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

/// Production factory dialing real sockets.
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    type Transport = WsTransport;

    async fn connect(&mut self, url: &str) -> Result<WsTransport, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(WsTransport { inner: stream })
    }
}
