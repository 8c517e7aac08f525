//! Wire codec and the message type registry.
//!
//! The bus core moves payloads in memory, but a disk- or
//! network-backed transport needs a byte representation and a way to
//! turn it back into a payload. [`encode`] produces an
//! [`EncodedMessage`] (bitcode bytes tagged with the declared wire
//! name); [`MessageTypeRegistry`] maps wire names back to routing keys
//! and, for types registered as decodable, to a decoder producing a
//! boxed payload.
//!
//! The registry is also the resolver the built-in subscription handler
//! uses to validate incoming type identifiers.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageType, NamedMessage};

/// A payload in wire form: declared type name plus bitcode bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodedMessage {
    pub message_type: String,
    pub bytes: Vec<u8>,
}

/// Error type for codec operations.
#[derive(Debug)]
pub enum CodecError {
    /// Serialization of the payload failed.
    EncodeFailed(String),
    /// Deserialization of the payload failed.
    DecodeFailed(String),
    /// The wire name is not registered.
    UnknownMessageType(String),
    /// The type is registered but carries no decoder.
    NotDecodable(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::EncodeFailed(msg) => write!(f, "encode failed: {}", msg),
            CodecError::DecodeFailed(msg) => write!(f, "decode failed: {}", msg),
            CodecError::UnknownMessageType(name) => {
                write!(f, "unknown message type: {}", name)
            }
            CodecError::NotDecodable(name) => {
                write!(f, "message type {} has no registered decoder", name)
            }
        }
    }
}

impl Error for CodecError {}

impl From<bitcode::Error> for CodecError {
    fn from(err: bitcode::Error) -> Self {
        CodecError::DecodeFailed(err.to_string())
    }
}

/// Encode a payload into wire form.
pub fn encode<M: NamedMessage + Serialize>(message: &M) -> Result<EncodedMessage, CodecError> {
    let bytes =
        bitcode::serialize(message).map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
    Ok(EncodedMessage {
        message_type: M::WIRE_NAME.to_string(),
        bytes,
    })
}

type Decoder = Box<dyn Fn(&[u8]) -> Result<Box<dyn Message>, CodecError> + Send + Sync>;

struct TypeEntry {
    key: MessageType,
    decoder: Option<Decoder>,
}

/// Maps declared wire names to routing keys and decoders.
///
/// Shared by the bus facade (identifier resolution for subscription
/// requests) and by wire transports (payload reconstruction).
#[derive(Default)]
pub struct MessageTypeRegistry {
    entries: RwLock<HashMap<String, TypeEntry>>,
}

impl MessageTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type by its declared wire name.
    pub fn register<M: NamedMessage>(&self) {
        self.entries.write().unwrap().insert(
            M::WIRE_NAME.to_string(),
            TypeEntry {
                key: M::key(),
                decoder: None,
            },
        );
    }

    /// Register a message type together with a bitcode decoder, so
    /// wire transports can rebuild payloads from [`EncodedMessage`]s.
    pub fn register_decodable<M: NamedMessage + DeserializeOwned>(&self) {
        let decoder: Decoder = Box::new(|bytes| {
            let message: M = bitcode::deserialize(bytes)?;
            Ok(Box::new(message) as Box<dyn Message>)
        });
        self.entries.write().unwrap().insert(
            M::WIRE_NAME.to_string(),
            TypeEntry {
                key: M::key(),
                decoder: Some(decoder),
            },
        );
    }

    /// Resolve a wire name to its routing key.
    pub fn resolve(&self, name: &str) -> Result<MessageType, CodecError> {
        self.entries
            .read()
            .unwrap()
            .get(name)
            .map(|entry| entry.key)
            .ok_or_else(|| CodecError::UnknownMessageType(name.to_string()))
    }

    /// Rebuild a payload from its wire form.
    pub fn decode(&self, encoded: &EncodedMessage) -> Result<Box<dyn Message>, CodecError> {
        let entries = self.entries.read().unwrap();
        let entry = entries
            .get(&encoded.message_type)
            .ok_or_else(|| CodecError::UnknownMessageType(encoded.message_type.clone()))?;
        let decoder = entry
            .decoder
            .as_ref()
            .ok_or_else(|| CodecError::NotDecodable(encoded.message_type.clone()))?;
        decoder(&encoded.bytes)
    }

    /// Registered wire names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}
