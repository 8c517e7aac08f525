//! Handler traits and the handler error type.
//!
//! A handler is bound to exactly one routing key and exposes a single
//! operation. Two forms exist:
//!
//! - [`MessageHandler<M>`]: fully typed, for handlers registered
//!   under a concrete message key.
//! - [`DynMessageHandler`]: erased, for handlers registered under a
//!   marker key (message family, capability) or the root key, where
//!   the concrete type of the incoming message is not known.
//!
//! Closures and plain functions with the right signature are handlers
//! too:
//!
//! ```ignore
//! fn audit(order: &OrderPlaced, _ctx: &mut DispatchContext<'_>) -> Result<(), HandlerError> {
//!     Ok(())
//! }
//!
//! let table = HandlerTable::new().on::<OrderPlaced, _, _>(|| audit);
//! ```

use std::error::Error;
use std::fmt;
use std::marker::PhantomData;

use crate::codec::CodecError;
use crate::context::DispatchContext;
use crate::message::Message;
use crate::subscription::SubscriptionError;
use crate::transport::TransportError;

/// Error type for handler execution.
#[derive(Debug)]
pub enum HandlerError {
    /// The handler rejected or failed to process the message.
    Failed(String),
    /// A typed handler received a message of the wrong concrete type.
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// A message type identifier could not be resolved; a routing
    /// error, not a business failure.
    UnknownMessageType(String),
    /// A send issued by the handler failed.
    Transport(TransportError),
    /// The subscription store failed.
    Subscription(SubscriptionError),
    /// Other error.
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Failed(msg) => write!(f, "handler failed: {}", msg),
            HandlerError::TypeMismatch { expected, actual } => write!(
                f,
                "handler expected message type {} but received {}",
                expected, actual
            ),
            HandlerError::UnknownMessageType(name) => {
                write!(f, "unknown message type: {}", name)
            }
            HandlerError::Transport(e) => write!(f, "transport error: {}", e),
            HandlerError::Subscription(e) => write!(f, "subscription error: {}", e),
            HandlerError::Other(e) => write!(f, "handler error: {}", e),
        }
    }
}

impl Error for HandlerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            HandlerError::Transport(e) => Some(e),
            HandlerError::Subscription(e) => Some(e),
            HandlerError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<TransportError> for HandlerError {
    fn from(err: TransportError) -> Self {
        HandlerError::Transport(err)
    }
}

impl From<SubscriptionError> for HandlerError {
    fn from(err: SubscriptionError) -> Self {
        HandlerError::Subscription(err)
    }
}

impl From<CodecError> for HandlerError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnknownMessageType(name) => HandlerError::UnknownMessageType(name),
            other => HandlerError::Other(Box::new(other)),
        }
    }
}

/// A typed handler for one concrete message type.
pub trait MessageHandler<M: Message>: Send {
    fn handle(
        &mut self,
        message: &M,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError>;
}

impl<M, F> MessageHandler<M> for F
where
    M: Message,
    F: FnMut(&M, &mut DispatchContext<'_>) -> Result<(), HandlerError> + Send,
{
    fn handle(
        &mut self,
        message: &M,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        self(message, ctx)
    }
}

/// An erased handler, invoked for any message routed to its key.
///
/// This is the form the registry traffics in; typed handlers are
/// adapted into it at registration time.
pub trait DynMessageHandler: Send {
    fn handle_dyn(
        &mut self,
        message: &dyn Message,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError>;
}

/// Adapter giving a typed handler the erased shape. Created once per
/// registration; the downcast is the only dynamic step in dispatch.
pub(crate) struct TypedHandler<M, H> {
    inner: H,
    _message: PhantomData<fn(M)>,
}

impl<M, H> TypedHandler<M, H> {
    pub(crate) fn new(inner: H) -> Self {
        Self {
            inner,
            _message: PhantomData,
        }
    }
}

impl<M, H> DynMessageHandler for TypedHandler<M, H>
where
    M: Message,
    H: MessageHandler<M>,
{
    fn handle_dyn(
        &mut self,
        message: &dyn Message,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        let typed = message
            .downcast_ref::<M>()
            .ok_or_else(|| HandlerError::TypeMismatch {
                expected: std::any::type_name::<M>(),
                actual: message.message_type().name(),
            })?;
        self.inner.handle(typed, ctx)
    }
}

/// Erase a typed handler. Used by the registry and for built-ins.
pub(crate) fn erase<M, H>(handler: H) -> Box<dyn DynMessageHandler>
where
    M: Message,
    H: MessageHandler<M> + 'static,
{
    Box::new(TypedHandler::<M, H>::new(handler))
}
