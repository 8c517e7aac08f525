mod bus;
mod codec;
mod config;
mod context;
mod envelope;
mod message;
mod routing;
mod subscription;
mod transport;
mod worker;

pub use bus::{BusBuilder, BusError, ServiceBus};
pub use codec::{encode, CodecError, EncodedMessage, MessageTypeRegistry};
pub use config::BusConfig;
pub use context::{DispatchContext, MessageContext};
pub use envelope::{Address, TransportMessage};
pub use message::{Message, MessageType, NamedMessage};
pub use routing::{
    route_keys, Dispatcher, DynMessageHandler, HandlerError, HandlerRegistry, HandlerTable,
    MessageHandler,
};
pub use subscription::{
    InMemorySubscriptionStore, JsonFileSubscriptionStore, SubscriptionAction, SubscriptionError,
    SubscriptionRequest, SubscriptionRequestHandler, SubscriptionStore,
};
pub use transport::{
    InMemoryNetwork, InMemoryTransport, TransactionalUnit, Transport, TransportError,
};
pub use worker::{DisposeOutcome, Worker, WorkerConfig, WorkerState, WorkerStats};
