//! Background connection task.
//!
//! The driver owns the transport for its whole life and runs one loop:
//! connect, serve the open connection, count down, repeat. It is the only
//! writer to the socket; [`Gateway`](super::Gateway) handles feed it
//! through channels and read the shared [`ConnectionCore`].

use std::{cell::RefCell, collections::VecDeque, sync::Arc, time::Duration};

use futures_util::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval_at, timeout},
};
use tracing::{debug, info, trace, warn};

use super::{
    config::GatewayConfig,
    events::{EventBus, GatewayEvent},
    protocol::{ProtocolHandler, WsMessage},
    state::{ConnectionCore, ConnectionState, Tick},
    transport::{Connector, Transport},
    types::{ConnectionEpoch, MessageKind, RequestId},
};
use crate::error::{GatewayError, GatewayResult};

/// Commands from the handles to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ControlCommand {
    /// The handle moved `Closed → Connecting`; stop counting and connect.
    Connect,
    /// Close the transport and exit.
    Shutdown,
}

/// An encoded request queued for the socket.
pub(crate) struct OutboundFrame {
    /// Connection the request was registered against.
    pub(crate) epoch: ConnectionEpoch,
    pub(crate) request_id: RequestId,
    pub(crate) message: WsMessage,
}

/// Events waiting for the dispatch in progress to finish.
#[derive(Default)]
struct Outbox {
    queued: VecDeque<GatewayEvent>,
    draining: bool,
}

/// State shared between the handles and the driver.
///
/// Lock order is `order` then `core`. Listeners run with `order` held and
/// `core` released.
pub(crate) struct Shared<H> {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) handler: H,
    pub(crate) core: Mutex<ConnectionCore>,
    pub(crate) bus: EventBus,
    pub(crate) out_tx: mpsc::Sender<OutboundFrame>,
    order: ReentrantMutex<RefCell<Outbox>>,
}

impl<H: ProtocolHandler> Shared<H> {
    pub(crate) fn new(
        config: Arc<GatewayConfig>,
        handler: H,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (out_tx, out_rx) = mpsc::channel(config.max_pending_requests);
        let shared = Self {
            core: Mutex::new(ConnectionCore::new(&config)),
            bus: EventBus::new(config.event_channel_capacity),
            config,
            handler,
            out_tx,
            order: ReentrantMutex::new(RefCell::new(Outbox::default())),
        };
        (shared, out_rx)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.core.lock().state()
    }

    /// Apply `apply` to the core and publish the events it pushes.
    ///
    /// No other transition can interleave between the state change and the
    /// delivery of its events. A transition started by a listener on the
    /// dispatching thread has its events queued behind the current one.
    pub(crate) fn transition<T>(
        &self,
        apply: impl FnOnce(&mut ConnectionCore, &mut Vec<GatewayEvent>) -> T,
    ) -> T {
        let order = self.order.lock();
        let mut events = Vec::new();
        let output = apply(&mut self.core.lock(), &mut events);
        order.borrow_mut().queued.extend(events);

        if !std::mem::replace(&mut order.borrow_mut().draining, true) {
            loop {
                let next = order.borrow_mut().queued.pop_front();
                let Some(event) = next else {
                    break;
                };
                self.bus.dispatch(event);
            }
            order.borrow_mut().draining = false;
        }
        output
    }

    /// Publish an event that carries no state change.
    pub(crate) fn publish(&self, event: GatewayEvent) {
        self.transition(|_, events| events.push(event));
    }

    /// Enter the terminal state, emitting `CLOSED` if the connection was
    /// not already down.
    pub(crate) fn shut_down(&self) {
        self.transition(|core, events| {
            if core.shutdown() {
                events.push(GatewayEvent::Closed {
                    reason: "gateway stopped".to_string(),
                    countdown: 0,
                });
            }
        });
    }
}

/// How an open connection ended.
enum Exit {
    Shutdown,
    Failed(String),
}

pub(crate) struct ConnectionDriver<H> {
    shared: Arc<Shared<H>>,
    connector: Arc<dyn Connector>,
    ctrl_rx: mpsc::Receiver<ControlCommand>,
    out_rx: mpsc::Receiver<OutboundFrame>,
}

impl<H: ProtocolHandler> ConnectionDriver<H> {
    pub(crate) fn new(
        shared: Arc<Shared<H>>,
        connector: Arc<dyn Connector>,
        ctrl_rx: mpsc::Receiver<ControlCommand>,
        out_rx: mpsc::Receiver<OutboundFrame>,
    ) -> Self {
        Self {
            shared,
            connector,
            ctrl_rx,
            out_rx,
        }
    }

    /// Main entry point; runs until shutdown or until every handle is gone.
    pub(crate) async fn run(mut self) {
        info!(url = %self.shared.config.url, "Starting gateway connection task");
        self.shared.publish(GatewayEvent::Connecting);

        loop {
            let reason = match self.try_connect().await {
                None => break,
                Some(Ok(transport)) => {
                    let epoch = self.shared.transition(|core, events| {
                        let epoch = core.open();
                        info!(epoch = %epoch, "Gateway connected");
                        events.push(GatewayEvent::Opened { epoch });
                        epoch
                    });

                    match self.run_open(transport, epoch).await {
                        Exit::Shutdown => break,
                        Exit::Failed(reason) => reason,
                    }
                }
                Some(Err(e)) => e.to_string(),
            };

            let tick = self.shared.config.tick_interval;
            self.shared.transition(|core, events| {
                let (countdown, rejected) = core.close(&reason, tick);
                warn!(reason = %reason, countdown, rejected, "Gateway connection closed");
                events.push(GatewayEvent::Closed { reason, countdown });
            });

            if !self.wait_closed().await {
                break;
            }
        }

        self.shared.shut_down();
        info!("Gateway connection task stopped");
    }

    /// Attempt one connection. `None` means shutdown was requested meanwhile.
    async fn try_connect(&mut self) -> Option<GatewayResult<Transport>> {
        let config = Arc::clone(&self.shared.config);
        debug!(url = %config.url, "Connecting to backend");

        let connect = timeout(config.connect_timeout, self.connector.connect(&config.url));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                biased;

                cmd = self.ctrl_rx.recv() => match cmd {
                    Some(ControlCommand::Connect) => {}
                    Some(ControlCommand::Shutdown) | None => return None,
                },
                result = &mut connect => {
                    return Some(match result {
                        Ok(result) => result,
                        Err(_) => Err(GatewayError::timeout(config.connect_timeout)),
                    });
                }
            }
        }
    }

    /// Serve an open connection until it fails or shutdown is requested.
    async fn run_open(&mut self, transport: Transport, epoch: ConnectionEpoch) -> Exit {
        let Transport {
            mut sink,
            mut stream,
        } = transport;

        loop {
            tokio::select! {
                biased;

                cmd = self.ctrl_rx.recv() => match cmd {
                    Some(ControlCommand::Connect) => {}
                    Some(ControlCommand::Shutdown) | None => {
                        debug!("Closing gateway connection");
                        if let Err(e) = sink.close().await {
                            debug!(error = %e, "Error while closing transport");
                        }
                        return Exit::Shutdown;
                    }
                },
                Some(frame) = self.out_rx.recv() => {
                    if frame.epoch != epoch {
                        debug!(
                            request_id = %frame.request_id,
                            frame_epoch = %frame.epoch,
                            epoch = %epoch,
                            "Dropping frame queued for a previous connection"
                        );
                        continue;
                    }
                    trace!(request_id = %frame.request_id, len = frame.message.len(), "Sending frame");
                    if let Err(e) = sink.send_frame(frame.message).await {
                        return Exit::Failed(format!("write failed: {e}"));
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => self.handle_frame(frame),
                    Some(Err(e)) => return Exit::Failed(e.to_string()),
                    None => return Exit::Failed("connection closed".to_string()),
                },
            }
        }
    }

    /// Count down while closed. Returns `false` on shutdown.
    async fn wait_closed(&mut self) -> bool {
        let period = self.shared.config.tick_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                cmd = self.ctrl_rx.recv() => match cmd {
                    Some(ControlCommand::Connect) => {
                        if self.shared.state() == ConnectionState::Connecting {
                            debug!("Reconnect requested");
                            return true;
                        }
                    }
                    Some(ControlCommand::Shutdown) | None => return false,
                },
                _ = ticker.tick() => {
                    let tick = self.shared.transition(|core, events| {
                        let tick = core.tick();
                        match tick {
                            Tick::Counted(remaining) => {
                                events.push(GatewayEvent::Countdown(remaining));
                            }
                            Tick::Expired => {
                                events.push(GatewayEvent::Countdown(0));
                                events.push(GatewayEvent::Connecting);
                            }
                            Tick::Skipped => {}
                        }
                        tick
                    });
                    match tick {
                        Tick::Counted(_) => {}
                        Tick::Expired => return true,
                        Tick::Skipped => {
                            // A handle already moved us to Connecting.
                            if self.shared.state() == ConnectionState::Connecting {
                                return true;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Route one inbound frame.
    fn handle_frame(&self, frame: WsMessage) {
        let max = self.shared.config.max_message_size;
        if max > 0 && frame.len() > max {
            warn!(len = frame.len(), max, "Dropping oversized frame");
            return;
        }

        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Binary(data) => match self.shared.handler.decode_binary(&data) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable binary frame");
                    return;
                }
            },
        };

        let message = match self.shared.handler.decode_message(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        match self.shared.handler.classify_message(&message) {
            MessageKind::Acknowledgement => {
                let id = message.id.clone();
                let settled = self.shared.transition(|core, events| {
                    let settled = core.pending.acknowledge(&message);
                    events.push(GatewayEvent::MessageReceived(message));
                    settled
                });
                match settled {
                    Some(settled) => debug!(
                        request_id = %settled.id,
                        action = %settled.action,
                        failed = settled.failed,
                        elapsed_ms = duration_ms(settled.elapsed),
                        "Request acknowledged"
                    ),
                    None => warn!(id = ?id, "Acknowledgement without a matching pending request"),
                }
            }
            MessageKind::Push => {
                debug!(message_type = %message.message_type, "Push message received");
                self.shared.publish(GatewayEvent::MessageReceived(message));
            }
            _ => {
                let e = GatewayError::unknown_message_type(&message.message_type);
                warn!(error = %e, "Forwarding unrecognized message");
                self.shared.publish(GatewayEvent::MessageReceived(message));
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
