//! Transport capability traits.
//!
//! The wire transport is an external collaborator with a fixed
//! contract. The bus core sees two things: a [`Transport`] that names
//! this bus's input queue, opens transactional units, and performs
//! fire-and-forget sends; and the [`TransactionalUnit`] value covering
//! one receive and every send its dispatch produces, committed or
//! rolled back together.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::envelope::{Address, TransportMessage};

/// Error type for transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// Connection to the underlying queue failed.
    ConnectionFailed(String),
    /// The transport rejected the operation.
    Rejected(String),
    /// Timed out waiting for the transport.
    Timeout,
    /// Other error.
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            TransportError::Rejected(msg) => write!(f, "transport rejected: {}", msg),
            TransportError::Timeout => write!(f, "transport timeout"),
            TransportError::Other(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// A message transport bound to one input queue.
///
/// Shared by all workers of a bus; implementations must be safe for
/// concurrent use.
pub trait Transport: Send + Sync {
    /// The address of this bus's own input queue.
    fn input_queue(&self) -> &Address;

    /// Open a transactional unit covering one receive-and-dispatch
    /// cycle.
    fn begin(&self) -> Result<Box<dyn TransactionalUnit>, TransportError>;

    /// Deliver an envelope outside any transactional unit
    /// (fire-and-forget, auto-commit semantics). Used by the bus
    /// facade; handlers send through their unit instead.
    fn send(&self, destination: &Address, envelope: TransportMessage)
        -> Result<(), TransportError>;
}

/// One atomic receive-and-dispatch scope.
///
/// At most one envelope is received per unit. Sends are buffered and
/// take effect only on [`commit`](TransactionalUnit::commit).
/// Dropping an uncommitted unit is equivalent to
/// [`rollback`](TransactionalUnit::rollback).
pub trait TransactionalUnit: Send {
    /// Attempt one bounded receive from the input queue. Returning
    /// `None` is not an error; the unit is still eligible to commit
    /// trivially.
    fn receive(&mut self, timeout: Duration)
        -> Result<Option<TransportMessage>, TransportError>;

    /// Buffer an envelope for delivery on commit.
    fn send(&mut self, destination: &Address, envelope: TransportMessage)
        -> Result<(), TransportError>;

    /// Mark the unit complete: the received envelope is consumed and
    /// buffered sends are delivered.
    fn commit(self: Box<Self>) -> Result<(), TransportError>;

    /// Abandon the unit: buffered sends are discarded and the received
    /// envelope becomes eligible for redelivery.
    fn rollback(self: Box<Self>) -> Result<(), TransportError>;
}
