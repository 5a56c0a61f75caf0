//! In-memory transport for driving the gateway from tests.

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use reef_gateway::{
    Connector, EventStream, FrameSink, Gateway, GatewayConfig, GatewayError, GatewayEvent,
    GatewayResult, Transport, WsMessage,
};
use serde_json::Value;
use tokio::sync::mpsc;

struct Control {
    accepting: AtomicBool,
    attempts: AtomicUsize,
}

/// Connector handing each accepted connection to a [`MockServer`].
#[derive(Clone)]
pub struct MockConnector {
    control: Arc<Control>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
}

/// Test-side view of the connector.
pub struct MockServer {
    control: Arc<Control>,
    accepted_rx: mpsc::UnboundedReceiver<ServerEnd>,
}

pub fn mock_connector() -> (MockConnector, MockServer) {
    let control = Arc::new(Control {
        accepting: AtomicBool::new(true),
        attempts: AtomicUsize::new(0),
    });
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    (
        MockConnector {
            control: Arc::clone(&control),
            accepted_tx,
        },
        MockServer {
            control,
            accepted_rx,
        },
    )
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> GatewayResult<Transport> {
        self.control.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.control.accepting.load(Ordering::SeqCst) {
            return Err(GatewayError::transport("connection refused"));
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel::<GatewayResult<WsMessage>>();
        let stream = futures_util::stream::unfold(server_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        self.accepted_tx
            .send(ServerEnd {
                incoming: client_rx,
                outgoing: server_tx,
            })
            .map_err(|_| GatewayError::transport("mock server gone"))?;

        Ok(Transport::new(MockSink { tx: client_tx }, Box::pin(stream)))
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<WsMessage>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_frame(&mut self, frame: WsMessage) -> GatewayResult<()> {
        self.tx
            .send(frame)
            .map_err(|_| GatewayError::transport("peer hung up"))
    }

    async fn close(&mut self) -> GatewayResult<()> {
        Ok(())
    }
}

impl MockServer {
    /// Wait for the gateway's next connection.
    pub async fn accept(&mut self) -> ServerEnd {
        self.accepted_rx
            .recv()
            .await
            .expect("connector dropped")
    }

    /// Refuse (or accept again) future connection attempts.
    pub fn set_accepting(&self, accepting: bool) {
        self.control.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of connection attempts so far.
    pub fn attempts(&self) -> usize {
        self.control.attempts.load(Ordering::SeqCst)
    }
}

/// Server side of one in-memory connection. Dropping it closes the
/// connection from the gateway's point of view.
pub struct ServerEnd {
    pub incoming: mpsc::UnboundedReceiver<WsMessage>,
    outgoing: mpsc::UnboundedSender<GatewayResult<WsMessage>>,
}

impl ServerEnd {
    pub fn push_text(&self, text: &str) {
        self.outgoing
            .send(Ok(WsMessage::text(text)))
            .expect("gateway hung up");
    }

    pub fn push_json(&self, value: Value) {
        self.push_text(&value.to_string());
    }

    /// Surface a transport error to the gateway.
    pub fn fail(&self, reason: &str) {
        let _ = self.outgoing.send(Err(GatewayError::transport(reason)));
    }

    /// Next request frame sent by the gateway, parsed as JSON.
    pub async fn recv_json(&mut self) -> Value {
        let frame = self.incoming.recv().await.expect("gateway hung up");
        serde_json::from_str(frame.as_text().expect("text frame")).expect("json frame")
    }

    /// Acknowledge `request` with `payload`.
    pub fn ack(&self, request: &Value, payload: Value) {
        self.push_json(serde_json::json!({
            "id": request["id"],
            "type": "ACTION_EXECUTED",
            "status": "OK",
            "payload": payload,
        }));
    }
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig::new("ws://reef.test/ws")
}

/// Build and start a gateway, returning once it is open.
pub async fn open_gateway(
    config: GatewayConfig,
) -> (Gateway, MockServer, ServerEnd, EventStream) {
    let (connector, mut server) = mock_connector();
    let gateway = Gateway::new(config, connector).expect("valid config");
    let mut events = gateway.events();
    gateway.start().expect("start");

    let conn = server.accept().await;
    wait_for(&mut events, |e| matches!(e, GatewayEvent::Opened { .. })).await;
    (gateway, server, conn, events)
}

/// Next event matching `pred`, skipping others.
pub async fn wait_for(
    events: &mut EventStream,
    pred: impl Fn(&GatewayEvent) -> bool,
) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.next().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Every event up to and including the first matching `pred`.
pub async fn collect_until(
    events: &mut EventStream,
    pred: impl Fn(&GatewayEvent) -> bool,
) -> Vec<GatewayEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.next().await.expect("event stream closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                return;
            }
        }
    })
    .await
    .expect("timed out collecting events");
    seen
}
