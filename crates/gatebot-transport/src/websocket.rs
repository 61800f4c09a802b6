//! WebSocket transport to the gateway.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use gatebot_core::{Connector, Identity, Transport, TransportError};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which pushes the gateway should deliver on the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushChannel {
    Message,
    Event,
    #[default]
    All,
}

impl PushChannel {
    const fn path(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Event => "event",
            Self::All => "all",
        }
    }
}

/// Build the gateway websocket URL.
///
/// # Errors
/// Returns error if `host` does not form a valid URL.
pub fn gateway_url(
    host: &str,
    channel: PushChannel,
    verify_key: &str,
    identity: Identity,
    secure: bool,
) -> Result<Url, url::ParseError> {
    let scheme = if secure { "wss" } else { "ws" };
    let mut url = Url::parse(&format!("{scheme}://{host}/{}", channel.path()))?;
    url.query_pairs_mut()
        .append_pair("verifyKey", verify_key)
        .append_pair("qq", &identity.to_string());
    Ok(url)
}

/// Connector opening a websocket to a fixed URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    /// Create a connector for the given URL.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self { url }
    }

    /// URL this connector dials.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> Result<WsTransport, TransportError> {
        tracing::debug!("Connect to websocket adapter at {}", self.url.host_str().unwrap_or("?"));
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(WsTransport::new(ws))
    }
}

/// WebSocket transport.
///
/// The sink and stream halves are locked independently so sends never wait
/// behind the dispatcher's pending receive.
pub struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WsTransport {
    fn new(ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

fn map_ws_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Io(io) => TransportError::Io(io),
        other => TransportError::Receive(other.to_string()),
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        let text = String::from_utf8(frame.to_vec())
            .map_err(|e| TransportError::Send(format!("frame is not UTF-8: {e}")))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| match map_ws_error(e) {
                TransportError::Receive(msg) => TransportError::Send(msg),
                other => other,
            })
    }

    async fn recv(&self) -> Option<Result<Bytes, TransportError>> {
        let mut stream = self.stream.lock().await;
        loop {
            let msg = match stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(map_ws_error(e))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(Bytes::copy_from_slice(text.as_bytes()))),
                Message::Binary(data) => return Some(Ok(Bytes::copy_from_slice(&data))),
                Message::Close(frame) => {
                    tracing::debug!("Websocket closed by peer: {frame:?}");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self.sink.lock().await.close().await {
            Ok(()) => Ok(()),
            Err(e) => match map_ws_error(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_url_encodes_query() {
        let url = gateway_url("127.0.0.1:8080", PushChannel::All, "a b&c", Identity(123), false)
            .unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/all");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("verifyKey".to_string(), "a b&c".to_string()),
                ("qq".to_string(), "123".to_string()),
            ]
        );
    }

    #[test]
    fn test_secure_message_channel() {
        let url = gateway_url("example.org", PushChannel::Message, "k", Identity(1), true).unwrap();
        assert_eq!(url.as_str(), "wss://example.org/message?verifyKey=k&qq=1");
    }

    #[test]
    fn test_push_channel_deserializes_lowercase() {
        let ch: PushChannel = serde_json::from_str("\"event\"").unwrap();
        assert_eq!(ch, PushChannel::Event);
        assert_eq!(PushChannel::default(), PushChannel::All);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/all")).unwrap();
        let result = WsConnector::new(url).connect().await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
