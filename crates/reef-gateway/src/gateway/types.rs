//! Identifiers and message classification shared across the gateway.

use std::fmt;

/// Correlation id carried in a request's `id` field and echoed back in its
/// `ACTION_EXECUTED` acknowledgement.
///
/// Fresh ids are ULIDs, so they sort by creation time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Generation counter of successfully opened connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionEpoch(pub u64);

impl ConnectionEpoch {
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ConnectionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of inbound messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageKind {
    /// Acknowledges exactly one outstanding request.
    Acknowledgement,
    /// Recognized unsolicited state change.
    Push,
    /// Type outside the recognized set.
    Unknown,
}

impl MessageKind {
    /// Returns true if this message settles a pending request.
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, Self::Acknowledgement)
    }

    /// Returns true if this is a recognized push notification.
    pub fn is_push(&self) -> bool {
        matches!(self, Self::Push)
    }
}
