//! User-facing gateway API.
//!
//! The [`Gateway`] is the handle the application holds: it issues
//! requests, reads the connection state and registers observers. The
//! connection itself is driven by a background task spawned by
//! [`Gateway::start`].

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
};

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{
    config::GatewayConfig,
    driver::{ConnectionDriver, ControlCommand, OutboundFrame, Shared},
    events::{EventStream, GatewayEvent, ListenerId},
    handlers::ReefProtocol,
    pending::Settlement,
    protocol::{OutboundMessage, ProtocolHandler},
    state::ConnectionState,
    transport::{Connector, WebSocketConnector},
    types::RequestId,
};
use crate::error::{GatewayError, GatewayResult};

/// Lifecycle of the background task.
enum TaskSlot {
    /// Not started; holds what the driver needs.
    Idle {
        connector: Arc<dyn Connector>,
        ctrl_rx: mpsc::Receiver<ControlCommand>,
        out_rx: mpsc::Receiver<OutboundFrame>,
    },
    Running(JoinHandle<()>),
    Stopped,
}

struct HandleInner {
    ctrl_tx: mpsc::Sender<ControlCommand>,
    task: Mutex<TaskSlot>,
}

/// Reconnecting request/response gateway to a Reef server.
///
/// The gateway is cheap to clone; every clone drives the same connection.
/// Dropping the last clone shuts the connection task down. A listener that
/// owns a clone keeps the task alive for as long as it stays registered;
/// listeners that need the gateway should capture a [`WeakGateway`] from
/// [`downgrade`](Self::downgrade) instead.
///
/// # Example
///
/// ```rust,ignore
/// let gateway = Gateway::connect_default(GatewayConfig::default())?;
/// gateway.add_event_listener(|event| println!("{event}"));
/// gateway.start()?;
///
/// // Once OPENED has been observed:
/// let tag = gateway
///     .request("TAG_NEW", &json!({"name": "x", "color": "#ffffff"}))
///     .await?;
/// ```
pub struct Gateway<H: ProtocolHandler = ReefProtocol> {
    shared: Arc<Shared<H>>,
    handle: Arc<HandleInner>,
}

impl<H: ProtocolHandler> Clone for Gateway<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            handle: Arc::clone(&self.handle),
        }
    }
}

impl Gateway<ReefProtocol> {
    /// Create a gateway speaking the Reef protocol over `connector`.
    pub fn new(config: GatewayConfig, connector: impl Connector) -> GatewayResult<Self> {
        Self::with_handler(config, ReefProtocol::new(), connector)
    }

    /// Create a gateway over a real WebSocket connection.
    pub fn connect_default(config: GatewayConfig) -> GatewayResult<Self> {
        let connector = WebSocketConnector::new().max_message_size(config.max_message_size);
        Self::new(config, connector)
    }
}

impl<H: ProtocolHandler> Gateway<H> {
    /// Create a gateway with a custom protocol handler.
    ///
    /// Nothing is spawned until [`start`](Self::start); the initial state is
    /// [`ConnectionState::Connecting`].
    pub fn with_handler(
        config: GatewayConfig,
        handler: H,
        connector: impl Connector,
    ) -> GatewayResult<Self> {
        config.validate().map_err(GatewayError::config)?;

        let config = Arc::new(config);
        let (ctrl_tx, ctrl_rx) = mpsc::channel(config.command_channel_capacity);
        let (shared, out_rx) = Shared::new(Arc::clone(&config), handler);
        let connector: Arc<dyn Connector> = Arc::new(connector);

        Ok(Self {
            shared: Arc::new(shared),
            handle: Arc::new(HandleInner {
                ctrl_tx,
                task: Mutex::new(TaskSlot::Idle {
                    connector,
                    ctrl_rx,
                    out_rx,
                }),
            }),
        })
    }

    /// Spawn the connection task and make the first connection attempt.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) -> GatewayResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| GatewayError::internal("gateway must be started inside a Tokio runtime"))?;

        let mut slot = self.handle.task.lock();
        match std::mem::replace(&mut *slot, TaskSlot::Stopped) {
            TaskSlot::Idle {
                connector,
                ctrl_rx,
                out_rx,
            } => {
                let driver =
                    ConnectionDriver::new(Arc::clone(&self.shared), connector, ctrl_rx, out_rx);
                *slot = TaskSlot::Running(runtime.spawn(driver.run()));
                info!(url = %self.shared.config.url, "Gateway started");
                Ok(())
            }
            TaskSlot::Running(task) => {
                *slot = TaskSlot::Running(task);
                Err(GatewayError::internal("gateway already started"))
            }
            TaskSlot::Stopped => Err(GatewayError::internal("gateway has been stopped")),
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Every pending request is rejected with
    /// [`GatewayError::ConnectionLost`]. `CLOSED` is emitted unless the
    /// connection was already closed.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.handle.task.lock(), TaskSlot::Stopped);
        match previous {
            TaskSlot::Running(task) => {
                // An exited task has dropped its receiver; the join still completes.
                let _ = self.handle.ctrl_tx.send(ControlCommand::Shutdown).await;
                if let Err(e) = task.await {
                    warn!(error = %e, "Gateway connection task ended abnormally");
                    self.shared.shut_down();
                }
            }
            TaskSlot::Idle { .. } => self.shared.shut_down(),
            TaskSlot::Stopped => {}
        }
        info!("Gateway stopped");
    }

    /// Retry immediately.
    ///
    /// No-op unless the connection is `Closed`; otherwise cancels the
    /// countdown and starts a new attempt.
    pub fn connect(&self) {
        if !matches!(*self.handle.task.lock(), TaskSlot::Running(_)) {
            debug!("connect() ignored: gateway not running");
            return;
        }
        let began = self.shared.transition(|core, events| {
            let began = core.begin_connecting();
            if began {
                events.push(GatewayEvent::Connecting);
            }
            began
        });
        if !began {
            return;
        }
        if self.handle.ctrl_tx.try_send(ControlCommand::Connect).is_err() {
            // The driver notices the state change on its next tick.
            debug!("Control channel full; reconnect picked up on next tick");
        }
    }

    /// Send `action` with `params` and return the pending acknowledgement.
    ///
    /// Fails immediately, before any I/O, with [`GatewayError::NotConnected`]
    /// unless the connection is open, whatever the arguments. While open,
    /// an empty `action` is a [`GatewayError::Config`] error and too many
    /// pending requests is [`GatewayError::CapacityExceeded`].
    pub fn send_message<P>(&self, action: &str, params: &P) -> GatewayResult<Reply>
    where
        P: Serialize + ?Sized,
    {
        let mut core = self.shared.core.lock();
        if !core.state().is_open() {
            return Err(GatewayError::NotConnected);
        }
        if action.is_empty() {
            return Err(GatewayError::config("action cannot be empty"));
        }

        let params = serde_json::to_value(params)?;
        let id = self.shared.handler.generate_request_id();
        let message = OutboundMessage::new(id.clone(), action, params);
        let frame = self.shared.handler.encode_request(&message)?;
        let rx = core.pending.register(id.clone(), action)?;
        let outbound = OutboundFrame {
            epoch: core.epoch(),
            request_id: id.clone(),
            message: frame,
        };

        match self.shared.out_tx.try_send(outbound) {
            Ok(()) => {
                debug!(request_id = %id, action, "Request queued");
                Ok(Reply {
                    request_id: id,
                    action: action.to_string(),
                    rx,
                })
            }
            Err(e) => {
                core.pending.remove(&id);
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => {
                        GatewayError::capacity_exceeded(self.shared.config.max_pending_requests)
                    }
                    mpsc::error::TrySendError::Closed(_) => GatewayError::NotConnected,
                })
            }
        }
    }

    /// Send a request and wait for its acknowledgement payload.
    pub async fn request<P>(&self, action: &str, params: &P) -> GatewayResult<Value>
    where
        P: Serialize + ?Sized,
    {
        self.send_message(action, params)?.await
    }

    /// Send a request and deserialize the acknowledgement payload.
    pub async fn request_as<P, T>(&self, action: &str, params: &P) -> GatewayResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = self.request(action, params).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Register an observer for every lifecycle and message event.
    ///
    /// Observers run synchronously, in registration order, on the thread
    /// that raised the event. Events are delivered one at a time, in the
    /// order their state changes happened. Keep observers short: the next
    /// transition waits for them.
    pub fn add_event_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.shared.bus.add_listener(listener)
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.shared.bus.remove_listener(id)
    }

    /// Async stream of the same events, for consumers on other tasks.
    pub fn events(&self) -> EventStream {
        self.shared.bus.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Ticks left before the next reconnect attempt, while closed.
    pub fn countdown(&self) -> Option<u32> {
        self.state().countdown()
    }

    /// Number of requests awaiting acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.shared.core.lock().pending.len()
    }

    /// Active configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.shared.config
    }

    /// A handle that does not keep the gateway alive.
    pub fn downgrade(&self) -> WeakGateway<H> {
        WeakGateway {
            shared: Arc::downgrade(&self.shared),
            handle: Arc::downgrade(&self.handle),
        }
    }
}

/// Non-owning [`Gateway`] handle, for listeners and other back-references.
pub struct WeakGateway<H: ProtocolHandler = ReefProtocol> {
    shared: Weak<Shared<H>>,
    handle: Weak<HandleInner>,
}

impl<H: ProtocolHandler> WeakGateway<H> {
    /// The gateway, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<Gateway<H>> {
        Some(Gateway {
            shared: self.shared.upgrade()?,
            handle: self.handle.upgrade()?,
        })
    }
}

impl<H: ProtocolHandler> Clone for WeakGateway<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
            handle: Weak::clone(&self.handle),
        }
    }
}

impl<H: ProtocolHandler> fmt::Debug for WeakGateway<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakGateway").finish_non_exhaustive()
    }
}

impl<H: ProtocolHandler> fmt::Debug for Gateway<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// An outstanding request.
///
/// Resolves to the acknowledgement payload, to [`GatewayError::Remote`]
/// when the server reports a failure, or to
/// [`GatewayError::ConnectionLost`] when the connection drops first.
/// Dropping a `Reply` does not cancel the request.
#[must_use = "a Reply does nothing unless awaited"]
pub struct Reply {
    request_id: RequestId,
    action: String,
    rx: oneshot::Receiver<Settlement>,
}

impl Reply {
    /// Correlation id sent with the request.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Action this reply belongs to.
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl Future for Reply {
    type Output = GatewayResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| match result {
            Ok(settlement) => settlement,
            Err(_) => Err(GatewayError::connection_lost("request abandoned")),
        })
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("request_id", &self.request_id)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}
