//! Route-key resolution.
//!
//! A message declares the keys it is delivered under; this module
//! turns that declaration into the deterministic, duplicate-free set
//! the dispatcher iterates. The set, not just the concrete type, is
//! the unit of handler lookup.

use crate::message::{Message, MessageType};

/// The distinct routing keys for one message, in dispatch order:
/// concrete key first, declared marker keys in declaration order,
/// root key last. Duplicates keep their first occurrence.
pub fn route_keys(message: &dyn Message) -> Vec<MessageType> {
    let declared = message.route_keys();
    let mut keys: Vec<MessageType> = Vec::with_capacity(declared.len());
    for key in declared {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
