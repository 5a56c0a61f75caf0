//! Reconnecting request/response gateway.
//!
//! This module keeps one WebSocket connection to a Reef server alive and
//! layers three things on top of it:
//!
//! - **Connection lifecycle**: `Connecting → Open → Closed{countdown}`, with
//!   an automatic retry when the countdown reaches zero
//! - **Request correlation**: [`Gateway::send_message`] returns a [`Reply`]
//!   that settles on the matching `ACTION_EXECUTED` acknowledgement or on
//!   connection loss
//! - **Event fan-out**: lifecycle and inbound messages are delivered to
//!   every observer, in registration order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  OutboundFrame  ┌──────────────────┐     ┌──────────────┐
//! │   Gateway   │────────────────▶│ ConnectionDriver │────▶│  Reef Server │
//! │   (Clone)   │  ControlCommand │   (Background)   │◀────│  /ws         │
//! └──────┬──────┘                 └────────┬─────────┘     └──────────────┘
//!        │                                 │
//!        ▼                                 ▼
//! ┌──────────────────────────────┐  ┌────────────────┐
//! │ Mutex<ConnectionCore>        │  │    EventBus    │
//! │  state · epoch · pending     │  │ listeners + tx │
//! └──────────────────────────────┘  └────────────────┘
//! ```
//!
//! The handle and the driver share the connection core. A request is only
//! registered while the core says `Open`, and the driver rejects every
//! pending request in the same critical section that leaves `Open`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use reef_gateway::{Gateway, GatewayConfig, GatewayEvent};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::connect_default(GatewayConfig::default())?;
//!     let mut events = gateway.events();
//!     gateway.start()?;
//!
//!     while let Some(event) = events.next().await {
//!         if matches!(event, GatewayEvent::Opened { .. }) {
//!             break;
//!         }
//!     }
//!
//!     let tag = gateway
//!         .request("TAG_NEW", &json!({"name": "x", "color": "#ffffff"}))
//!         .await?;
//!     println!("created {tag}");
//!
//!     gateway.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `url` | `ws://localhost:7651/ws` | Server endpoint |
//! | `reconnect_interval` | 5s | Countdown length after a disconnect |
//! | `reconnect_backoff_factor` | 1.0 | Growth per failed attempt |
//! | `reconnect_max_interval` | 60s | Countdown cap |
//! | `tick_interval` | 1s | Countdown tick period |
//! | `connect_timeout` | 10s | Limit for one connection attempt |
//! | `max_pending_requests` | 1000 | Maximum unacknowledged requests |
//!
//! # Module Structure
//!
//! - `config`: Gateway configuration
//! - `types`: Core type definitions (RequestId, ConnectionEpoch, MessageKind)
//! - `protocol`: Wire messages and the protocol handler trait
//! - [`handlers`]: The Reef protocol handler
//! - `state`: Connection state machine
//! - `pending`: Pending request management
//! - `events`: Event bus and async event stream
//! - `transport`: Connector trait and the WebSocket connector
//! - `driver`: Background connection task
//! - `client`: The [`Gateway`] handle

mod client;
mod config;
mod driver;
mod events;
pub mod handlers;
mod pending;
mod protocol;
mod state;
mod transport;
mod types;

pub use client::{Gateway, Reply, WeakGateway};
pub use config::{DEFAULT_URL, GatewayConfig};
pub use events::{EventBus, EventStream, GatewayEvent, ListenerId};
pub use protocol::{InboundMessage, OutboundMessage, ProtocolHandler, WsMessage};
pub use state::ConnectionState;
pub use transport::{Connector, FrameSink, FrameStream, Transport, WebSocketConnector};
pub use types::{ConnectionEpoch, MessageKind, RequestId};
