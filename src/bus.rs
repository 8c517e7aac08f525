//! The bus facade: workers, send, publish, subscribe.
//!
//! A [`ServiceBus`] ties the collaborators together: the transport it
//! receives on, the handler registry its dispatcher consults, the
//! subscription store backing publish, and the message type registry
//! resolving wire names. Built with [`BusBuilder`].
//!
//! ## Example
//!
//! ```ignore
//! use unibus::{Address, BusConfig, HandlerTable, InMemoryNetwork, ServiceBus};
//!
//! let network = InMemoryNetwork::new();
//!
//! let bus = ServiceBus::builder()
//!     .transport(network.transport("orders"))
//!     .handlers(HandlerTable::new().on::<PlaceOrder, _, _>(|| PlaceOrderHandler::new()))
//!     .message_type::<OrderPlaced>()
//!     .config(BusConfig::default())
//!     .build()?;
//!
//! bus.start();
//! bus.send(&Address::from("billing"), SettleInvoice { order_id })?;
//! bus.publish(OrderPlaced { order_id })?;
//! ```

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::codec::MessageTypeRegistry;
use crate::config::BusConfig;
use crate::envelope::{Address, TransportMessage};
use crate::message::{Message, NamedMessage};
use crate::routing::{erase, Dispatcher, HandlerRegistry, HandlerTable};
use crate::subscription::{
    InMemorySubscriptionStore, SubscriptionError, SubscriptionRequest,
    SubscriptionRequestHandler, SubscriptionStore,
};
use crate::transport::{Transport, TransportError};
use crate::worker::{DisposeOutcome, Worker, WorkerConfig, WorkerState};

/// Error type for bus facade operations.
#[derive(Debug)]
pub enum BusError {
    /// The builder was not given a transport.
    MissingTransport,
    /// A send failed.
    Transport(TransportError),
    /// The subscription store failed.
    Subscription(SubscriptionError),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::MissingTransport => write!(f, "bus requires a transport"),
            BusError::Transport(e) => write!(f, "transport error: {}", e),
            BusError::Subscription(e) => write!(f, "subscription error: {}", e),
        }
    }
}

impl Error for BusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BusError::Transport(e) => Some(e),
            BusError::Subscription(e) => Some(e),
            BusError::MissingTransport => None,
        }
    }
}

impl From<TransportError> for BusError {
    fn from(err: TransportError) -> Self {
        BusError::Transport(err)
    }
}

impl From<SubscriptionError> for BusError {
    fn from(err: SubscriptionError) -> Self {
        BusError::Subscription(err)
    }
}

/// Builder for a [`ServiceBus`].
pub struct BusBuilder {
    transport: Option<Arc<dyn Transport>>,
    registry: Option<Arc<dyn HandlerRegistry>>,
    store: Option<Arc<dyn SubscriptionStore>>,
    types: Arc<MessageTypeRegistry>,
    config: BusConfig,
}

impl BusBuilder {
    fn new() -> Self {
        Self {
            transport: None,
            registry: None,
            store: None,
            types: Arc::new(MessageTypeRegistry::new()),
            config: BusConfig::default(),
        }
    }

    /// The transport this bus receives on. Required.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Handler registrations as a [`HandlerTable`].
    pub fn handlers(mut self, table: HandlerTable) -> Self {
        self.registry = Some(Arc::new(table));
        self
    }

    /// A custom handler registry (e.g. one backed by a container).
    pub fn registry(mut self, registry: Arc<dyn HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The subscription store. Defaults to an in-memory store.
    pub fn subscription_store(mut self, store: impl SubscriptionStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Register a message type so its wire name resolves on this bus
    /// (required on the publisher side for subscription requests).
    pub fn message_type<M: NamedMessage>(self) -> Self {
        self.types.register::<M>();
        self
    }

    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ServiceBus, BusError> {
        let transport = self.transport.ok_or(BusError::MissingTransport)?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(HandlerTable::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemorySubscriptionStore::new()));
        let types = self.types;

        // The control message is always resolvable and decodable.
        types.register_decodable::<SubscriptionRequest>();

        let builtin_store = Arc::clone(&store);
        let builtin_types = Arc::clone(&types);
        let dispatcher = Dispatcher::new(registry).with_builtin(
            SubscriptionRequest::key(),
            move || {
                erase::<SubscriptionRequest, _>(SubscriptionRequestHandler::new(
                    Arc::clone(&builtin_store),
                    Arc::clone(&builtin_types),
                ))
            },
        );

        Ok(ServiceBus {
            transport,
            dispatcher: Arc::new(dispatcher),
            subscriptions: store,
            types,
            config: self.config,
            workers: Mutex::new(Vec::new()),
        })
    }
}

/// The public surface of the bus.
pub struct ServiceBus {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    subscriptions: Arc<dyn SubscriptionStore>,
    types: Arc<MessageTypeRegistry>,
    config: BusConfig,
    workers: Mutex<Vec<Worker>>,
}

impl ServiceBus {
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    /// This bus's own input queue.
    pub fn input_queue(&self) -> &Address {
        self.transport.input_queue()
    }

    /// The message type registry this bus resolves wire names with.
    pub fn message_types(&self) -> &Arc<MessageTypeRegistry> {
        &self.types
    }

    /// Spawn the configured number of workers and set them working.
    /// Calling `start` on a started bus is a no-op.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap();
        if !workers.is_empty() {
            return;
        }
        let worker_config = WorkerConfig {
            idle_poll_interval: self.config.idle_poll_interval(),
            receive_timeout: self.config.receive_timeout(),
        };
        let count = self.config.worker_count.max(1);
        for i in 0..count {
            let worker = Worker::spawn(
                format!("worker-{}", i + 1),
                Arc::clone(&self.transport),
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.subscriptions),
                worker_config.clone(),
            );
            worker.start();
            workers.push(worker);
        }
        tracing::info!(
            input_queue = %self.transport.input_queue(),
            workers = count,
            "bus started"
        );
    }

    /// Send one message point-to-point. The envelope's return address
    /// is always this bus's own input queue.
    pub fn send<M: Message>(&self, destination: &Address, message: M) -> Result<(), BusError> {
        self.send_many(destination, vec![Box::new(message)])
    }

    /// Send several payloads in one envelope; they will be dispatched
    /// in order by the receiving bus.
    pub fn send_many(
        &self,
        destination: &Address,
        payloads: Vec<Box<dyn Message>>,
    ) -> Result<(), BusError> {
        let envelope = TransportMessage::new(self.transport.input_queue().clone(), payloads);
        self.transport
            .send(destination, envelope)
            .map_err(BusError::from)
    }

    /// Publish a message to every subscriber registered for its
    /// concrete type. Subscribers are attempted independently; the
    /// first error is returned after all attempts.
    pub fn publish<M: Message>(&self, message: M) -> Result<(), BusError> {
        let type_name = message.message_type().name();
        let subscribers = self.subscriptions.subscribers_for(type_name)?;
        tracing::debug!(
            message_type = type_name,
            subscribers = subscribers.len(),
            "publishing"
        );
        let mut first_error = None;
        for subscriber in &subscribers {
            let envelope = TransportMessage::single(
                self.transport.input_queue().clone(),
                message.clone_message(),
            );
            if let Err(e) = self.transport.send(subscriber, envelope) {
                if first_error.is_none() {
                    first_error = Some(BusError::from(e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Ask `publisher` to start sending published `M`s to this bus.
    /// An ordinary send; no acknowledgment is awaited.
    pub fn subscribe<M: NamedMessage>(&self, publisher: &Address) -> Result<(), BusError> {
        self.send(publisher, SubscriptionRequest::subscribe(M::WIRE_NAME))
    }

    /// Ask `publisher` to stop sending published `M`s to this bus.
    pub fn unsubscribe<M: NamedMessage>(&self, publisher: &Address) -> Result<(), BusError> {
        self.send(publisher, SubscriptionRequest::unsubscribe(M::WIRE_NAME))
    }

    /// Halt polling on every worker; threads stay alive.
    pub fn pause_workers(&self) {
        for worker in self.workers.lock().unwrap().iter() {
            worker.pause();
        }
    }

    /// Resume polling on every worker.
    pub fn resume_workers(&self) {
        for worker in self.workers.lock().unwrap().iter() {
            worker.start();
        }
    }

    /// Request exit on every worker without waiting.
    pub fn stop(&self) {
        for worker in self.workers.lock().unwrap().iter() {
            worker.stop();
        }
    }

    /// Current state of each worker.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .map(Worker::state)
            .collect()
    }

    /// Stop all workers and wait up to the configured grace period for
    /// each. Workers that do not exit in time are flagged
    /// [`DisposeOutcome::TimedOut`] and leaked.
    pub fn shutdown(&self) -> Vec<DisposeOutcome> {
        let workers: Vec<Worker> = self.workers.lock().unwrap().drain(..).collect();
        let grace = self.config.dispose_grace();
        workers
            .into_iter()
            .map(|worker| worker.dispose(grace))
            .collect()
    }
}
