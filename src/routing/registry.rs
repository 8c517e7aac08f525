//! Handler registry capability and the factory-table implementation.

use std::collections::HashMap;

use crate::message::{Message, MessageType, NamedMessage};

use super::handler::{erase, DynMessageHandler, MessageHandler};

/// Source of live handler instances for a routing key.
///
/// The dispatcher fetches instances per dispatch and releases them
/// after use; the registry may recycle, pool, or drop them. Shared by
/// all workers; implementations must be safe for concurrent use.
pub trait HandlerRegistry: Send + Sync {
    /// Handler instances for a key, in invocation order. An unknown
    /// key yields an empty collection.
    fn handlers_for(&self, key: MessageType) -> Vec<Box<dyn DynMessageHandler>>;

    /// Return instances fetched by [`handlers_for`](Self::handlers_for).
    /// Called exactly once per fetch, whether or not dispatch
    /// succeeded.
    fn release(&self, handlers: Vec<Box<dyn DynMessageHandler>>);
}

type HandlerFactory = Box<dyn Fn() -> Box<dyn DynMessageHandler> + Send + Sync>;

/// Factory-table registry: one factory per registration, a fresh
/// handler instance per fetch.
///
/// Registration is builder-chained:
///
/// ```ignore
/// let table = HandlerTable::new()
///     .on::<OrderPlaced, _, _>(|| BillingHandler::new())
///     .on_key(MessageType::of::<Auditable>(), || audit_handler());
/// ```
#[derive(Default)]
pub struct HandlerTable {
    factories: HashMap<MessageType, Vec<HandlerFactory>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler factory under `M`'s concrete key.
    pub fn on<M, H, F>(mut self, factory: F) -> Self
    where
        M: NamedMessage,
        H: MessageHandler<M> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.factories
            .entry(M::key())
            .or_default()
            .push(Box::new(move || erase::<M, H>(factory())));
        self
    }

    /// Register an erased handler factory under any key: marker
    /// types, the root key, or a concrete key when the handler wants
    /// the erased message.
    pub fn on_key<H, F>(mut self, key: MessageType, factory: F) -> Self
    where
        H: DynMessageHandler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.factories
            .entry(key)
            .or_default()
            .push(Box::new(move || {
                Box::new(factory()) as Box<dyn DynMessageHandler>
            }));
        self
    }

    /// Keys with at least one registered handler.
    pub fn registered_keys(&self) -> Vec<MessageType> {
        self.factories.keys().copied().collect()
    }

    /// Number of registrations for a key.
    pub fn registration_count(&self, key: MessageType) -> usize {
        self.factories.get(&key).map(Vec::len).unwrap_or(0)
    }
}

impl HandlerRegistry for HandlerTable {
    fn handlers_for(&self, key: MessageType) -> Vec<Box<dyn DynMessageHandler>> {
        self.factories
            .get(&key)
            .map(|factories| factories.iter().map(|factory| factory()).collect())
            .unwrap_or_default()
    }

    fn release(&self, handlers: Vec<Box<dyn DynMessageHandler>>) {
        drop(handlers);
    }
}
