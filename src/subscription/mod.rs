//! The subscription overlay: control message, built-in handler, and
//! subscription stores.

mod handler;
mod json_store;
mod messages;
mod store;

pub use handler::SubscriptionRequestHandler;
pub use json_store::JsonFileSubscriptionStore;
pub use messages::{SubscriptionAction, SubscriptionRequest};
pub use store::{InMemorySubscriptionStore, SubscriptionError, SubscriptionStore};
