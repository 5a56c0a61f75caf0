//! Transport seam between the connection task and the socket.
//!
//! The connection task only sees a [`Connector`] producing a
//! [`Transport`]: a frame sink plus a frame stream. The default
//! [`WebSocketConnector`] is backed by `tokio-tungstenite`; tests plug in
//! an in-memory implementation.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{
    SinkExt, Stream, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{Message, protocol::WebSocketConfig},
};
use tracing::debug;

use super::protocol::WsMessage;
use crate::error::{GatewayError, GatewayResult};

/// Inbound frames. The stream ends (or yields an error) when the
/// connection is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = GatewayResult<WsMessage>> + Send>>;

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn send_frame(&mut self, frame: WsMessage) -> GatewayResult<()>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> GatewayResult<()>;
}

/// An established connection.
pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: impl FrameSink + 'static, stream: FrameStream) -> Self {
        Self {
            sink: Box::new(sink),
            stream,
        }
    }
}

/// Opens connections to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> GatewayResult<Transport>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector over `tokio-tungstenite`.
#[derive(Clone, Debug, Default)]
pub struct WebSocketConnector {
    max_message_size: Option<usize>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit inbound message size at the protocol level (0 = unlimited).
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = (size > 0).then_some(size);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> GatewayResult<Transport> {
        let config = self.max_message_size.map(|size| {
            WebSocketConfig::default()
                .max_message_size(Some(size))
                .max_frame_size(Some(size))
        });
        let (ws, response) = connect_async_with_config(url, config, false).await?;
        debug!(status = %response.status(), url, "WebSocket handshake complete");

        let (sink, stream) = ws.split();
        Ok(Transport::new(WsSink { inner: sink }, Box::pin(inbound(stream))))
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: WsMessage) -> GatewayResult<()> {
        let message = match frame {
            WsMessage::Text(text) => Message::text(text),
            WsMessage::Binary(data) => Message::binary(data),
        };
        self.inner.send(message).await?;
        Ok(())
    }

    async fn close(&mut self) -> GatewayResult<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// Map tungstenite messages to frames. Control frames are answered by
/// tungstenite itself and skipped here; a close frame ends the stream with
/// an error carrying the peer's reason.
fn inbound(stream: SplitStream<WsStream>) -> impl Stream<Item = GatewayResult<WsMessage>> + Send {
    stream.filter_map(|item| async move {
        match item {
            Ok(Message::Text(text)) => Some(Ok(WsMessage::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(data)) => Some(Ok(WsMessage::Binary(data.to_vec()))),
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
            Ok(Message::Close(frame)) => {
                let reason = match frame {
                    Some(f) => format!(
                        "connection closed by peer ({}: {})",
                        u16::from(f.code),
                        f.reason.as_str()
                    ),
                    None => "connection closed by peer".to_string(),
                };
                Some(Err(GatewayError::transport(reason)))
            }
            Err(err) => Some(Err(err.into())),
        }
    })
}
