//! A registry wrapper that counts fetched and released instances.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use unibus::{DynMessageHandler, HandlerRegistry, HandlerTable, MessageType};

pub struct CountingRegistry {
    inner: HandlerTable,
    fetched: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl CountingRegistry {
    pub fn new(inner: HandlerTable) -> Self {
        Self {
            inner,
            fetched: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetched(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetched)
    }

    pub fn released(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.released)
    }
}

impl HandlerRegistry for CountingRegistry {
    fn handlers_for(&self, key: MessageType) -> Vec<Box<dyn DynMessageHandler>> {
        let handlers = self.inner.handlers_for(key);
        self.fetched.fetch_add(handlers.len(), Ordering::SeqCst);
        handlers
    }

    fn release(&self, handlers: Vec<Box<dyn DynMessageHandler>>) {
        self.released.fetch_add(handlers.len(), Ordering::SeqCst);
        self.inner.release(handlers);
    }
}
