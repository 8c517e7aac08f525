//! Built-in handler for subscription control messages.

use std::sync::Arc;

use crate::codec::MessageTypeRegistry;
use crate::context::DispatchContext;
use crate::routing::{HandlerError, MessageHandler};

use super::messages::{SubscriptionAction, SubscriptionRequest};
use super::store::SubscriptionStore;

/// Maintains the subscription store from incoming
/// [`SubscriptionRequest`]s.
///
/// Registered implicitly by the bus as a built-in for the control
/// message's key, so it cannot be disabled or intercepted by registry
/// changes. The subscriber address is the control envelope's return
/// address; the type identifier is resolved through the message type
/// registry, and an unknown identifier is a routing error.
pub struct SubscriptionRequestHandler {
    store: Arc<dyn SubscriptionStore>,
    types: Arc<MessageTypeRegistry>,
}

impl SubscriptionRequestHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, types: Arc<MessageTypeRegistry>) -> Self {
        Self { store, types }
    }
}

impl MessageHandler<SubscriptionRequest> for SubscriptionRequestHandler {
    fn handle(
        &mut self,
        request: &SubscriptionRequest,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        let resolved = self
            .types
            .resolve(&request.message_type)
            .map_err(|_| HandlerError::UnknownMessageType(request.message_type.clone()))?;
        let subscriber = ctx.return_address().clone();

        match request.action {
            SubscriptionAction::Subscribe => {
                self.store.save(resolved.name(), &subscriber)?;
                tracing::debug!(
                    message_type = resolved.name(),
                    subscriber = %subscriber,
                    "subscription saved"
                );
            }
            SubscriptionAction::Unsubscribe => {
                self.store.remove(resolved.name(), &subscriber)?;
                tracing::debug!(
                    message_type = resolved.name(),
                    subscriber = %subscriber,
                    "subscription removed"
                );
            }
        }
        Ok(())
    }
}
