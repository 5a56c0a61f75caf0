//! # Reef Gateway
//!
//! Client-side gateway that keeps an application connected to a Reef
//! server over a WebSocket and exposes a request/response API on top of
//! the server's asynchronous message stream.
//!
//! ## Features
//!
//! - **Automatic Reconnection**: Countdown-driven retry after every disconnect
//! - **Request Correlation**: Per-request ids, settled by acknowledgement or connection loss
//! - **Event Fan-out**: Ordered, panic-isolated observers plus an async event stream
//! - **Protocol Abstraction**: Server framing behind the [`ProtocolHandler`] trait
//! - **Pluggable Transport**: [`Connector`] trait with a `tokio-tungstenite` default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reef_gateway::{Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::connect_default(GatewayConfig::new("ws://localhost:7651/ws"))?;
//!     gateway.add_event_listener(|event| println!("gateway: {event}"));
//!     gateway.start()?;
//!
//!     // Use the gateway...
//!     gateway.stop().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gateway;
mod reconnect;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult};
pub use gateway::{
    ConnectionEpoch, ConnectionState, Connector, DEFAULT_URL, EventStream, FrameSink, FrameStream,
    Gateway, GatewayConfig, GatewayEvent, InboundMessage, ListenerId, MessageKind,
    OutboundMessage, ProtocolHandler, Reply, RequestId, Transport, WeakGateway,
    WebSocketConnector, WsMessage,
    handlers::{ReefProtocol, ReefProtocolConfig},
};
