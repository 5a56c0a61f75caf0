//! Protocol handler for the Reef server.
//!
//! Requests are folded into a single object whose parameter field is named
//! after the action (`TAG_NEW` carries `tagNewParams`):
//!
//! ```text
//! {"id": "01J..", "action": "TAG_NEW", "tagNewParams": {"name": "x", "color": "#ffffff"}}
//! ```
//!
//! Inbound frames are `{"type": .., "payload": ..}`; the reserved type
//! [`ACTION_EXECUTED`] acknowledges a request and also carries `id` and
//! `status`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::{
    error::GatewayResult,
    gateway::{
        protocol::{InboundMessage, OutboundMessage, ProtocolHandler, WsMessage, parse_inbound},
        types::MessageKind,
    },
};

/// Inbound type acknowledging a previously sent action.
pub const ACTION_EXECUTED: &str = "ACTION_EXECUTED";

const DEFAULT_PUSH_TYPES: &[&str] = &[
    "TAG_NEW",
    "TAG_LIST",
    "TAG_UPDATE",
    "TAG_DELETE",
    "TAG_EDIT",
    "SUMMARY_NEW",
    "SUMMARY_LIST",
    "SUMMARY_UPDATE",
    "PROJECT_NEW",
    "PROJECT_UPDATE",
    "PROJECT_DELETE",
];

/// Name of the parameter field for `action`.
///
/// `TAG_NEW` becomes `tagNewParams`, `PROJECT_EDIT` becomes
/// `projectEditParams`.
pub fn params_field(action: &str) -> String {
    let mut field = String::with_capacity(action.len() + 6);
    for (index, word) in action.split('_').filter(|w| !w.is_empty()).enumerate() {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if index == 0 {
                field.extend(first.to_lowercase());
            } else {
                field.extend(first.to_uppercase());
            }
            field.extend(chars.flat_map(char::to_lowercase));
        }
    }
    field.push_str("Params");
    field
}

/// Configuration for [`ReefProtocol`].
#[derive(Clone, Debug)]
pub struct ReefProtocolConfig {
    /// Inbound type that acknowledges a request.
    pub ack_type: String,
    /// Recognized push notification types.
    pub push_types: HashSet<String>,
}

impl Default for ReefProtocolConfig {
    fn default() -> Self {
        Self {
            ack_type: ACTION_EXECUTED.to_string(),
            push_types: DEFAULT_PUSH_TYPES.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

impl ReefProtocolConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognize an additional push type.
    pub fn push_type(mut self, message_type: impl Into<String>) -> Self {
        self.push_types.insert(message_type.into());
        self
    }
}

/// The Reef wire protocol.
#[derive(Clone, Debug, Default)]
pub struct ReefProtocol {
    config: ReefProtocolConfig,
}

impl ReefProtocol {
    /// Create a handler with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handler with custom configuration.
    pub fn with_config(mut self, f: impl FnOnce(ReefProtocolConfig) -> ReefProtocolConfig) -> Self {
        self.config = f(self.config);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &ReefProtocolConfig {
        &self.config
    }
}

impl ProtocolHandler for ReefProtocol {
    fn encode_request(&self, message: &OutboundMessage) -> GatewayResult<WsMessage> {
        let mut frame = Map::new();
        frame.insert("id".to_string(), Value::String(message.id().to_string()));
        frame.insert(
            "action".to_string(),
            Value::String(message.action().to_string()),
        );
        if !message.params().is_null() {
            frame.insert(params_field(message.action()), message.params().clone());
        }
        Ok(WsMessage::text(serde_json::to_string(&frame)?))
    }

    fn decode_message(&self, text: &str) -> GatewayResult<InboundMessage> {
        parse_inbound(text)
    }

    fn classify_message(&self, message: &InboundMessage) -> MessageKind {
        if message.message_type == self.config.ack_type {
            MessageKind::Acknowledgement
        } else if self.config.push_types.contains(&message.message_type) {
            MessageKind::Push
        } else {
            MessageKind::Unknown
        }
    }
}
