//! Message trait and routing keys.
//!
//! A payload message is any `'static + Send` value declared with the
//! [`impl_message!`] macro. The bus treats payloads as opaque data;
//! only their type identity matters for routing. Each message type
//! declares the set of routing keys it is delivered under: its own
//! concrete key, any number of marker keys standing for the message
//! families and capabilities it belongs to, and the root key shared by
//! every message.
//!
//! ## Example
//!
//! ```
//! use unibus::impl_message;
//!
//! // Marker types for a family and a capability.
//! pub struct TradeEvent;
//! pub struct Auditable;
//!
//! #[derive(Clone, Debug)]
//! pub struct OrderPlaced {
//!     pub order_id: String,
//! }
//!
//! impl_message!(OrderPlaced, "orders.OrderPlaced", keys: [TradeEvent, Auditable]);
//! ```
//!
//! A handler registered for `OrderPlaced` receives the typed message;
//! handlers registered under the `TradeEvent`, `Auditable`, or root
//! keys receive the erased `&dyn Message` and downcast to what they
//! know.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A routing key: a type identity plus a display/wire name.
///
/// Equality and hashing use only the type identity; the name is the
/// stable identifier used on the wire and in the subscription store.
#[derive(Clone, Copy, Debug)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
}

impl MessageType {
    /// Key for any `'static` type, named after the Rust type path.
    ///
    /// Used for marker types (families, capabilities), which never
    /// cross the wire.
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for a message type with an explicitly declared wire name.
    pub fn named<T: 'static>(name: &'static str) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name,
        }
    }

    /// The root key. Every message routes to it after all other keys.
    pub fn root() -> Self {
        Self {
            id: TypeId::of::<dyn Message>(),
            name: "message",
        }
    }

    /// The declared name of this key.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A payload message carried by the bus.
///
/// Implemented via [`impl_message!`], not by hand, so the routing
/// keys and clone behavior stay consistent.
pub trait Message: Any + Send {
    /// Upcast for downcasting in erased handlers.
    fn as_any(&self) -> &dyn Any;

    /// The concrete routing key of this message.
    fn message_type(&self) -> MessageType;

    /// Every key this message is delivered under: concrete key first,
    /// declared marker keys in declaration order, root key last.
    fn route_keys(&self) -> Vec<MessageType>;

    /// Clone into a new boxed payload (used by publish fan-out).
    fn clone_message(&self) -> Box<dyn Message>;
}

impl dyn Message {
    /// Downcast to a concrete message type.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

impl fmt::Debug for dyn Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({})", self.message_type().name())
    }
}

/// A message type with a statically known wire name.
///
/// Implemented by [`impl_message!`]; used wherever a type, rather
/// than an instance, must name itself: handler registration,
/// `subscribe::<M>`, codec registration.
pub trait NamedMessage: Message + Sized {
    /// The stable identifier for this type on the wire and in the
    /// subscription store.
    const WIRE_NAME: &'static str;

    /// The concrete routing key of this type.
    fn key() -> MessageType {
        MessageType::named::<Self>(Self::WIRE_NAME)
    }
}

/// Declare a type as a bus message.
///
/// The first form routes only under the concrete key and the root key:
///
/// ```ignore
/// impl_message!(OrderPlaced, "orders.OrderPlaced");
/// ```
///
/// The second form adds marker keys for the families and capabilities
/// the message belongs to:
///
/// ```ignore
/// impl_message!(OrderPlaced, "orders.OrderPlaced", keys: [TradeEvent, Auditable]);
/// ```
///
/// The type must be `Clone + Send + 'static`.
#[macro_export]
macro_rules! impl_message {
    ($ty:ty, $name:literal) => {
        $crate::impl_message!($ty, $name, keys: []);
    };
    ($ty:ty, $name:literal, keys: [$($key:ty),* $(,)?]) => {
        impl $crate::NamedMessage for $ty {
            const WIRE_NAME: &'static str = $name;
        }

        impl $crate::Message for $ty {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn message_type(&self) -> $crate::MessageType {
                <$ty as $crate::NamedMessage>::key()
            }

            fn route_keys(&self) -> ::std::vec::Vec<$crate::MessageType> {
                let mut keys = ::std::vec::Vec::new();
                keys.push(<$ty as $crate::NamedMessage>::key());
                $(
                    keys.push($crate::MessageType::of::<$key>());
                )*
                keys.push($crate::MessageType::root());
                keys
            }

            fn clone_message(&self) -> ::std::boxed::Box<dyn $crate::Message> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }
        }
    };
}
