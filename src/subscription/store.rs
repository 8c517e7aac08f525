//! Subscription store capability and the in-memory implementation.

use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::envelope::Address;

/// Error type for subscription store operations.
#[derive(Debug)]
pub enum SubscriptionError {
    /// A store lock was poisoned during the named operation.
    LockPoisoned(&'static str),
    /// The backing storage failed.
    Storage(String),
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::LockPoisoned(operation) => {
                write!(f, "subscription store lock poisoned during {}", operation)
            }
            SubscriptionError::Storage(msg) => write!(f, "subscription storage error: {}", msg),
        }
    }
}

impl Error for SubscriptionError {}

/// Persistent association between message type identifiers and
/// subscriber addresses.
///
/// Keys are declared wire names, not runtime type identities, so a
/// store can outlive the process that wrote it. Mutated only by the
/// built-in subscription-request handler; read by `Publish`.
/// Implementations must be safe for concurrent use by all workers.
pub trait SubscriptionStore: Send + Sync {
    /// Record that `subscriber` wants messages of type `message_type`.
    fn save(&self, message_type: &str, subscriber: &Address) -> Result<(), SubscriptionError>;

    /// Remove a subscriber for a type. Removing an absent entry is a
    /// no-op.
    fn remove(&self, message_type: &str, subscriber: &Address) -> Result<(), SubscriptionError>;

    /// All subscribers registered for a type, in deterministic order.
    fn subscribers_for(&self, message_type: &str) -> Result<Vec<Address>, SubscriptionError>;
}

/// In-memory subscription store.
///
/// Cloning creates another handle to the same storage, so a test can
/// hold a handle to the store a bus is using.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStore {
    entries: Arc<RwLock<HashMap<String, BTreeSet<Address>>>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of (type, subscriber) associations.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().map(|s| s.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn save(&self, message_type: &str, subscriber: &Address) -> Result<(), SubscriptionError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SubscriptionError::LockPoisoned("save"))?;
        entries
            .entry(message_type.to_string())
            .or_default()
            .insert(subscriber.clone());
        Ok(())
    }

    fn remove(&self, message_type: &str, subscriber: &Address) -> Result<(), SubscriptionError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SubscriptionError::LockPoisoned("remove"))?;
        if let Some(subscribers) = entries.get_mut(message_type) {
            subscribers.remove(subscriber);
            if subscribers.is_empty() {
                entries.remove(message_type);
            }
        }
        Ok(())
    }

    fn subscribers_for(&self, message_type: &str) -> Result<Vec<Address>, SubscriptionError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SubscriptionError::LockPoisoned("subscribers_for"))?;
        Ok(entries
            .get(message_type)
            .map(|subscribers| subscribers.iter().cloned().collect())
            .unwrap_or_default())
    }
}
