//! Shared message fixtures.

use serde::{Deserialize, Serialize};
use unibus::impl_message;

/// Family marker: all trading messages.
pub struct TradeEvent;

/// Capability marker: messages that must reach the audit trail.
pub struct Auditable;

/// Capability marker: messages that skip batching.
pub struct HighPriority;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: String,
    pub quantity: u32,
}

impl_message!(PlaceOrder, "orders.PlaceOrder", keys: [TradeEvent, Auditable, HighPriority]);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
}

impl_message!(OrderPlaced, "orders.OrderPlaced");

#[derive(Clone, Debug, PartialEq)]
pub struct EchoRequest {
    pub tag: String,
}

impl_message!(EchoRequest, "test.EchoRequest");

#[derive(Clone, Debug, PartialEq)]
pub struct EchoReply {
    pub tag: String,
}

impl_message!(EchoReply, "test.EchoReply");
