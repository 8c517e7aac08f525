//! JSON-file-backed subscription store.
//!
//! Keeps the full map in memory and rewrites the file on every
//! mutation. Read-after-write is guaranteed within the process that
//! wrote; cross-process consistency is whatever the filesystem gives.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::envelope::Address;

use super::store::{SubscriptionError, SubscriptionStore};

impl From<std::io::Error> for SubscriptionError {
    fn from(err: std::io::Error) -> Self {
        SubscriptionError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(err: serde_json::Error) -> Self {
        SubscriptionError::Storage(err.to_string())
    }
}

type Entries = BTreeMap<String, BTreeSet<Address>>;

/// Subscription store persisted as a JSON file.
///
/// Cloning creates another handle to the same storage and file.
#[derive(Clone)]
pub struct JsonFileSubscriptionStore {
    path: PathBuf,
    entries: Arc<RwLock<Entries>>,
}

impl JsonFileSubscriptionStore {
    /// Open a store at `path`, loading any existing contents. A
    /// missing file starts the store empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SubscriptionError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Entries::new()
        };
        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    fn persist(&self, entries: &Entries) -> Result<(), SubscriptionError> {
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl SubscriptionStore for JsonFileSubscriptionStore {
    fn save(&self, message_type: &str, subscriber: &Address) -> Result<(), SubscriptionError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SubscriptionError::LockPoisoned("save"))?;
        entries
            .entry(message_type.to_string())
            .or_default()
            .insert(subscriber.clone());
        self.persist(&entries)
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
        self.persist(&entries)
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
