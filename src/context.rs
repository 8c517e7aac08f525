//! Per-dispatch context passed to handlers.
//!
//! The worker builds one [`MessageContext`] per received envelope and
//! threads it, together with the live transactional unit, through
//! every handler invocation as a [`DispatchContext`]. There is no
//! ambient or thread-local state: a reply can only be issued where a
//! context exists, which is only inside a dispatch.

use crate::envelope::{Address, TransportMessage};
use crate::message::Message;
use crate::routing::HandlerError;
use crate::subscription::SubscriptionStore;
use crate::transport::TransactionalUnit;

/// The dispatch-scoped record of the envelope being processed.
///
/// Lives exactly as long as one envelope's dispatch on one worker;
/// concurrent workers never share one.
#[derive(Clone, Debug)]
pub struct MessageContext {
    message_id: String,
    correlation_id: Option<String>,
    return_address: Address,
}

impl MessageContext {
    pub fn new(
        message_id: impl Into<String>,
        correlation_id: Option<String>,
        return_address: Address,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            correlation_id,
            return_address,
        }
    }

    pub(crate) fn for_envelope(envelope: &TransportMessage) -> Self {
        Self {
            message_id: envelope.id.clone(),
            correlation_id: envelope.correlation_id.clone(),
            return_address: envelope.return_address.clone(),
        }
    }

    /// Id of the envelope being processed.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Correlation id carried by the envelope, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Where replies to this envelope go.
    pub fn return_address(&self) -> &Address {
        &self.return_address
    }
}

/// What a handler sees while it runs.
///
/// All sends issued through the context are buffered in the current
/// transactional unit and take effect only if the whole envelope's
/// dispatch commits.
pub struct DispatchContext<'a> {
    context: &'a MessageContext,
    unit: &'a mut dyn TransactionalUnit,
    subscriptions: &'a dyn SubscriptionStore,
    input_queue: &'a Address,
}

impl<'a> DispatchContext<'a> {
    pub fn new(
        context: &'a MessageContext,
        unit: &'a mut dyn TransactionalUnit,
        subscriptions: &'a dyn SubscriptionStore,
        input_queue: &'a Address,
    ) -> Self {
        Self {
            context,
            unit,
            subscriptions,
            input_queue,
        }
    }

    /// Id of the envelope being processed.
    pub fn message_id(&self) -> &str {
        self.context.message_id()
    }

    /// Correlation id carried by the incoming envelope, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.context.correlation_id()
    }

    /// The incoming envelope's return address.
    pub fn return_address(&self) -> &Address {
        self.context.return_address()
    }

    /// This bus's own input queue.
    pub fn own_address(&self) -> &Address {
        self.input_queue
    }

    /// Send a reply to the incoming envelope's return address,
    /// correlated to the envelope being processed.
    pub fn reply<M: Message>(&mut self, message: M) -> Result<(), HandlerError> {
        let envelope =
            TransportMessage::single(self.input_queue.clone(), Box::new(message))
                .with_correlation(self.context.message_id().to_string());
        tracing::debug!(
            destination = %self.context.return_address(),
            correlation_id = %self.context.message_id(),
            "replying"
        );
        self.unit
            .send(self.context.return_address(), envelope)
            .map_err(HandlerError::from)
    }

    /// Send a message point-to-point. The new envelope's return
    /// address is this bus's own input queue.
    pub fn send<M: Message>(
        &mut self,
        destination: &Address,
        message: M,
    ) -> Result<(), HandlerError> {
        let envelope =
            TransportMessage::single(self.input_queue.clone(), Box::new(message));
        self.unit.send(destination, envelope).map_err(HandlerError::from)
    }

    /// Publish a message to every subscriber registered for its
    /// concrete type. Each subscriber gets an independent send; a
    /// failure for one does not stop the rest, and the first error is
    /// returned after all attempts.
    pub fn publish<M: Message>(&mut self, message: M) -> Result<(), HandlerError> {
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
                self.input_queue.clone(),
                message.clone_message(),
            );
            if let Err(e) = self.unit.send(subscriber, envelope) {
                if first_error.is_none() {
                    first_error = Some(HandlerError::from(e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
