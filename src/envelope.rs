//! Queue addresses and the transport envelope.
//!
//! A [`TransportMessage`] is what the transport actually moves: an
//! ordered sequence of payload messages plus the return address that
//! replies should be sent to. Envelopes are immutable once received.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::message::Message;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a process-unique envelope id.
pub(crate) fn next_message_id() -> String {
    let id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
    format!("msg-{}", id)
}

/// The name of a queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Address {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// An envelope of one or more payload messages plus a return address.
///
/// `correlation_id` links a reply back to the envelope it answers:
/// replies carry the id of the envelope they were dispatched from.
/// `headers` carry transport metadata the core does not interpret.
pub struct TransportMessage {
    pub id: String,
    pub correlation_id: Option<String>,
    pub return_address: Address,
    pub headers: Vec<(String, String)>,
    pub payloads: Vec<Box<dyn Message>>,
}

impl TransportMessage {
    /// Build an envelope with a fresh id and the given payloads.
    pub fn new(return_address: Address, payloads: Vec<Box<dyn Message>>) -> Self {
        Self {
            id: next_message_id(),
            correlation_id: None,
            return_address,
            headers: Vec::new(),
            payloads,
        }
    }

    /// Build an envelope carrying a single payload.
    pub fn single(return_address: Address, payload: Box<dyn Message>) -> Self {
        Self::new(return_address, vec![payload])
    }

    /// Stamp the id of the envelope this one answers.
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

impl Clone for TransportMessage {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            correlation_id: self.correlation_id.clone(),
            return_address: self.return_address.clone(),
            headers: self.headers.clone(),
            payloads: self.payloads.iter().map(|p| p.clone_message()).collect(),
        }
    }
}

impl fmt::Debug for TransportMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload_types: Vec<&str> = self
            .payloads
            .iter()
            .map(|p| p.message_type().name())
            .collect();
        f.debug_struct("TransportMessage")
            .field("id", &self.id)
            .field("correlation_id", &self.correlation_id)
            .field("return_address", &self.return_address)
            .field("payloads", &payload_types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_message;

    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        text: String,
    }

    impl_message!(Note, "test.Note");

    #[test]
    fn fresh_envelopes_get_distinct_ids() {
        let a = TransportMessage::new(Address::from("q"), vec![]);
        let b = TransportMessage::new(Address::from("q"), vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn correlation_and_headers() {
        let envelope = TransportMessage::single(
            Address::from("replies"),
            Box::new(Note {
                text: "hi".to_string(),
            }),
        )
        .with_correlation("msg-1")
        .with_header("sent-by", "tests");

        assert_eq!(envelope.correlation_id.as_deref(), Some("msg-1"));
        assert_eq!(
            envelope.headers,
            vec![("sent-by".to_string(), "tests".to_string())]
        );
    }

    #[test]
    fn clone_deep_copies_payloads() {
        let envelope = TransportMessage::single(
            Address::from("q"),
            Box::new(Note {
                text: "original".to_string(),
            }),
        );
        let copy = envelope.clone();

        assert_eq!(copy.id, envelope.id);
        assert_eq!(copy.payloads.len(), 1);
        let note = copy.payloads[0].downcast_ref::<Note>().unwrap();
        assert_eq!(note.text, "original");
    }
}
