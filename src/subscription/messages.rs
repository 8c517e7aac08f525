//! The subscription control message.

use serde::{Deserialize, Serialize};

use crate::impl_message;

/// What a subscription request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// Control message sent to a publisher to start or stop receiving
/// published messages of one type.
///
/// The `message_type` field carries the declared wire name of the
/// type being subscribed to; the subscriber's address travels as the
/// envelope's return address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub action: SubscriptionAction,
    pub message_type: String,
}

impl SubscriptionRequest {
    pub fn subscribe(message_type: impl Into<String>) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            message_type: message_type.into(),
        }
    }

    pub fn unsubscribe(message_type: impl Into<String>) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            message_type: message_type.into(),
        }
    }
}

impl_message!(SubscriptionRequest, "unibus.SubscriptionRequest");
