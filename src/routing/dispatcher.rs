//! Message dispatch: route-key fan-out with release-always semantics.

use std::sync::Arc;

use crate::context::DispatchContext;
use crate::message::{Message, MessageType};

use super::handler::{DynMessageHandler, HandlerError};
use super::registry::HandlerRegistry;
use super::resolver::route_keys;

type BuiltinFactory = Box<dyn Fn() -> Box<dyn DynMessageHandler> + Send + Sync>;

/// Routes one payload message to every handler registered for its
/// routing keys.
///
/// For each key, the externally-resolved handlers run first, then the
/// built-in handlers for that key; built-ins cannot be disabled or
/// intercepted by registry changes. Fetched instances are released
/// back to the registry whether or not their invocation succeeded; a
/// handler error surfaces only after the release, and stops the rest
/// of the dispatch.
pub struct Dispatcher {
    registry: Arc<dyn HandlerRegistry>,
    builtins: Vec<(MessageType, BuiltinFactory)>,
}

impl Dispatcher {
    pub fn new(registry: Arc<dyn HandlerRegistry>) -> Self {
        Self {
            registry,
            builtins: Vec::new(),
        }
    }

    /// Append a built-in handler for a key.
    pub(crate) fn with_builtin<F>(mut self, key: MessageType, factory: F) -> Self
    where
        F: Fn() -> Box<dyn DynMessageHandler> + Send + Sync + 'static,
    {
        self.builtins.push((key, Box::new(factory)));
        self
    }

    /// Dispatch one payload message to all interested handlers.
    pub fn dispatch(
        &self,
        message: &dyn Message,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        for key in route_keys(message) {
            let mut fetched = self.registry.handlers_for(key);
            tracing::trace!(
                key = %key,
                handlers = fetched.len(),
                "dispatching"
            );

            let mut outcome = Ok(());
            for handler in fetched.iter_mut() {
                if let Err(e) = handler.handle_dyn(message, ctx) {
                    outcome = Err(e);
                    break;
                }
            }
            if outcome.is_ok() {
                for (builtin_key, factory) in &self.builtins {
                    if *builtin_key != key {
                        continue;
                    }
                    let mut builtin = factory();
                    if let Err(e) = builtin.handle_dyn(message, ctx) {
                        outcome = Err(e);
                        break;
                    }
                }
            }

            self.registry.release(fetched);
            outcome?;
        }
        Ok(())
    }
}
