//! Pending request management.
//!
//! Tracks outgoing requests awaiting an acknowledgement, in send order.
//! The store lives inside the connection core lock, so registering a
//! request and invalidating everything on close can never interleave.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio::sync::oneshot;

use super::{protocol::InboundMessage, types::RequestId};
use crate::error::{GatewayError, GatewayResult};

/// Outcome delivered to a waiting request.
pub(crate) type Settlement = GatewayResult<Value>;

/// A pending request awaiting an acknowledgement.
struct PendingRequest {
    id: RequestId,
    action: String,
    created_at: Instant,
    reply_tx: oneshot::Sender<Settlement>,
}

impl PendingRequest {
    fn settle(self, outcome: Settlement) {
        // Receiver may have been dropped by an uninterested caller.
        let _ = self.reply_tx.send(outcome);
    }
}

/// Summary of an acknowledged request.
#[derive(Debug)]
pub(crate) struct Settled {
    pub(crate) id: RequestId,
    pub(crate) action: String,
    pub(crate) elapsed: Duration,
    pub(crate) failed: bool,
}

/// Ordered store of outstanding requests.
pub(crate) struct PendingRequestStore {
    requests: VecDeque<PendingRequest>,
    max_pending: usize,
}

impl PendingRequestStore {
    pub(crate) fn new(max_pending: usize) -> Self {
        Self {
            requests: VecDeque::new(),
            max_pending,
        }
    }

    /// Add a new pending request.
    ///
    /// Returns a receiver that settles exactly once: on acknowledgement or
    /// on invalidation.
    pub(crate) fn register(
        &mut self,
        id: RequestId,
        action: impl Into<String>,
    ) -> GatewayResult<oneshot::Receiver<Settlement>> {
        if self.requests.len() >= self.max_pending {
            return Err(GatewayError::capacity_exceeded(self.max_pending));
        }
        if self.requests.iter().any(|pending| pending.id == id) {
            return Err(GatewayError::internal(format!("duplicate request id {id}")));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests.push_back(PendingRequest {
            id,
            action: action.into(),
            created_at: Instant::now(),
            reply_tx,
        });
        Ok(reply_rx)
    }

    /// Remove a pending request without settling it.
    pub(crate) fn remove(&mut self, id: &RequestId) -> bool {
        match self.requests.iter().position(|pending| &pending.id == id) {
            Some(index) => {
                self.requests.remove(index);
                true
            }
            None => false,
        }
    }

    /// Settle the request an acknowledgement refers to.
    ///
    /// The echoed id selects the request; without one the oldest request is
    /// taken. Returns what was settled, or `None` if nothing matched.
    pub(crate) fn acknowledge(&mut self, ack: &InboundMessage) -> Option<Settled> {
        let index = match ack.request_id() {
            Some(id) => self.requests.iter().position(|pending| pending.id == id)?,
            None if self.requests.is_empty() => return None,
            None => 0,
        };
        let pending = self.requests.remove(index)?;

        let outcome = if ack.is_error() {
            Err(GatewayError::remote(&pending.action, ack.error_message()))
        } else {
            Ok(ack.payload.clone())
        };

        let settled = Settled {
            id: pending.id.clone(),
            action: pending.action.clone(),
            elapsed: pending.created_at.elapsed(),
            failed: ack.is_error(),
        };
        pending.settle(outcome);
        Some(settled)
    }

    /// Reject every outstanding request with [`GatewayError::ConnectionLost`].
    ///
    /// Returns how many requests were rejected.
    pub(crate) fn invalidate_all(&mut self, reason: &str) -> usize {
        let count = self.requests.len();
        for pending in self.requests.drain(..) {
            pending.settle(Err(GatewayError::connection_lost(reason)));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
