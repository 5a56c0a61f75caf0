//! Event fan-out to observers.
//!
//! [`EventBus`] keeps an ordered list of callbacks and invokes each of them
//! synchronously, in registration order, for every dispatched event. A
//! panicking callback is caught and logged; delivery continues with the
//! next one. The same events are also forwarded to a `broadcast` channel
//! for consumers on other tasks ([`EventStream`]).

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{error, warn};

use super::{protocol::InboundMessage, types::ConnectionEpoch};

/// Lifecycle and message events raised by the gateway.
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayEvent {
    /// A connection attempt has started.
    Connecting,
    /// The transport is established and requests may be sent.
    Opened {
        /// Generation of the new connection.
        epoch: ConnectionEpoch,
    },
    /// The connection is down; a reconnect countdown has started.
    Closed {
        /// Why the connection closed.
        reason: String,
        /// Ticks until the automatic reconnect attempt.
        countdown: u32,
    },
    /// One countdown tick elapsed; carries the remaining ticks.
    Countdown(u32),
    /// A well-formed inbound message, acknowledgement or push.
    MessageReceived(InboundMessage),
}

impl GatewayEvent {
    pub const CONNECTING: &'static str = "CONNECTING";
    pub const OPENED: &'static str = "OPENED";
    pub const CLOSED: &'static str = "CLOSED";
    pub const COUNTDOWN: &'static str = "COUNTDOWN";
    pub const MSG_RECEIVED: &'static str = "MSG_RECEIVED";

    /// Event name as used by the rest of the application.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => Self::CONNECTING,
            Self::Opened { .. } => Self::OPENED,
            Self::Closed { .. } => Self::CLOSED,
            Self::Countdown(_) => Self::COUNTDOWN,
            Self::MessageReceived(_) => Self::MSG_RECEIVED,
        }
    }

    /// The inbound message carried by a `MSG_RECEIVED` event.
    pub fn message(&self) -> Option<&InboundMessage> {
        match self {
            Self::MessageReceived(message) => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle returned by [`EventBus::add_listener`], used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

/// Ordered multicast registry of event callbacks.
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    /// Create a bus whose broadcast side buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            broadcast_tx,
        }
    }

    /// Append a callback; it receives every event dispatched from now on.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Attach an async consumer.
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.broadcast_tx.subscribe(),
        }
    }

    /// Deliver `event` to every callback in registration order.
    ///
    /// Returns how many callbacks completed without panicking.
    pub fn dispatch(&self, event: GatewayEvent) -> usize {
        // Callbacks may register or remove listeners, so run them on a snapshot.
        let snapshot: Vec<(ListenerId, Listener)> = self.listeners.read().clone();
        let mut delivered = 0;

        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    error!(listener = id.0, event = event.name(), "Event listener panicked");
                }
            }
        }

        // No receivers is fine.
        let _ = self.broadcast_tx.send(event);
        delivered
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Async view of the gateway's events.
pub struct EventStream {
    rx: broadcast::Receiver<GatewayEvent>,
}

impl EventStream {
    /// Receive the next event. Returns `None` once the gateway is gone.
    ///
    /// A consumer that falls behind skips the events it missed.
    pub async fn next(&mut self) -> Option<GatewayEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive an event without waiting.
    pub fn try_next(&mut self) -> Option<GatewayEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                }
                Err(_) => return None,
            }
        }
    }
}
