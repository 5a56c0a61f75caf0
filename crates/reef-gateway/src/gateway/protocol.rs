//! Wire message types and the protocol handler trait.
//!
//! The [`ProtocolHandler`] trait isolates everything the connection task
//! needs to know about the server's framing: how a request is encoded and
//! how an inbound frame is parsed and classified.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{MessageKind, RequestId};
use crate::error::{GatewayError, GatewayResult};

/// Raw frame exchanged with the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Create a text message.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a binary message.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Get as text if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A request to the remote service. Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    id: RequestId,
    action: String,
    params: Value,
}

impl OutboundMessage {
    /// Build a request for `action` carrying `params`.
    pub fn new(id: RequestId, action: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            action: action.into(),
            params,
        }
    }

    /// Correlation id of this request.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Action name, e.g. `TAG_NEW`.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Action parameters.
    pub fn params(&self) -> &Value {
        &self.params
    }
}

/// A parsed inbound frame: `{ "type": ..., "payload": ... }`.
///
/// Acknowledgements additionally carry the request `id` and a `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message type, e.g. `ACTION_EXECUTED` or `TAG_LIST`.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
    /// Echoed request id (acknowledgements only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `OK` or `ERROR` (acknowledgements only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl InboundMessage {
    /// Create a message with the given type and payload.
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            id: None,
            status: None,
        }
    }

    /// The correlation id, if the server echoed a non-empty one.
    pub fn request_id(&self) -> Option<RequestId> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(RequestId::from)
    }

    /// Whether the acknowledgement reports a failed action.
    pub fn is_error(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("ERROR"))
    }

    /// Human-readable failure text carried by an error acknowledgement.
    pub fn error_message(&self) -> String {
        match &self.payload {
            Value::String(message) => message.clone(),
            Value::Null => "unspecified error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Trait for server-specific framing.
///
/// Implement this trait to talk to a server whose frames differ from the
/// Reef layout handled by [`ReefProtocol`](super::handlers::ReefProtocol).
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Encode a request into a frame.
    fn encode_request(&self, message: &OutboundMessage) -> GatewayResult<WsMessage>;

    /// Parse an inbound text frame.
    ///
    /// Errors are reported as [`GatewayError::MalformedFrame`] and the frame
    /// is dropped by the caller.
    fn decode_message(&self, text: &str) -> GatewayResult<InboundMessage>;

    /// Classify a parsed message.
    fn classify_message(&self, message: &InboundMessage) -> MessageKind;

    /// Decode binary message to string.
    fn decode_binary(&self, data: &[u8]) -> GatewayResult<String> {
        String::from_utf8(data.to_vec()).map_err(Into::into)
    }

    /// Generate a new request ID for outgoing requests.
    ///
    /// Default implementation uses ULID.
    fn generate_request_id(&self) -> RequestId {
        RequestId::new()
    }
}

pub(crate) fn parse_inbound(text: &str) -> GatewayResult<InboundMessage> {
    serde_json::from_str(text).map_err(|e| GatewayError::malformed(e.to_string()))
}
