//! Transport capability traits and the in-memory implementation.

mod in_memory;
mod transport;

pub use in_memory::{InMemoryNetwork, InMemoryTransport};
pub use transport::{TransactionalUnit, Transport, TransportError};
