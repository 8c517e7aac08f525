//! One dispatched message reaches the handlers registered for its
//! concrete type, every declared marker key, and the root key,
//! exactly once each, and no handler registered for an unrelated
//! type.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use support::messages::{Auditable, HighPriority, OrderPlaced, PlaceOrder, TradeEvent};
use support::{fast_config, init_tracing, wait_until};
use unibus::{
    DispatchContext, DynMessageHandler, HandlerError, HandlerTable, InMemoryNetwork, Message,
    MessageHandler, MessageType, ServiceBus,
};

struct Tally {
    count: Arc<AtomicUsize>,
}

impl DynMessageHandler for Tally {
    fn handle_dyn(
        &mut self,
        _message: &dyn Message,
        _ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct TypedTally {
    count: Arc<AtomicUsize>,
}

impl MessageHandler<PlaceOrder> for TypedTally {
    fn handle(
        &mut self,
        message: &PlaceOrder,
        _ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        assert_eq!(message.order_id, "order-1");
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct UnrelatedTally {
    count: Arc<AtomicUsize>,
}

impl MessageHandler<OrderPlaced> for UnrelatedTally {
    fn handle(
        &mut self,
        _message: &OrderPlaced,
        _ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn tally(count: &Arc<AtomicUsize>) -> impl Fn() -> Tally + Send + Sync + 'static {
    let count = Arc::clone(count);
    move || Tally {
        count: Arc::clone(&count),
    }
}

#[test]
fn message_reaches_all_matching_handlers_exactly_once() {
    init_tracing();
    let network = InMemoryNetwork::new();

    let concrete = Arc::new(AtomicUsize::new(0));
    let auditable = Arc::new(AtomicUsize::new(0));
    let high_priority = Arc::new(AtomicUsize::new(0));
    let family = Arc::new(AtomicUsize::new(0));
    let root = Arc::new(AtomicUsize::new(0));
    let unrelated = Arc::new(AtomicUsize::new(0));

    let concrete_factory = Arc::clone(&concrete);
    let unrelated_factory = Arc::clone(&unrelated);
    let table = HandlerTable::new()
        .on::<PlaceOrder, _, _>(move || TypedTally {
            count: Arc::clone(&concrete_factory),
        })
        .on_key(MessageType::of::<Auditable>(), tally(&auditable))
        .on_key(MessageType::of::<HighPriority>(), tally(&high_priority))
        .on_key(MessageType::of::<TradeEvent>(), tally(&family))
        .on_key(MessageType::root(), tally(&root))
        .on::<OrderPlaced, _, _>(move || UnrelatedTally {
            count: Arc::clone(&unrelated_factory),
        });

    let bus = ServiceBus::builder()
        .transport(network.transport("orders"))
        .handlers(table)
        .config(fast_config(1))
        .build()
        .unwrap();

    bus.start();
    bus.send(
        bus.input_queue(),
        PlaceOrder {
            order_id: "order-1".to_string(),
            quantity: 3,
        },
    )
    .unwrap();

    assert!(wait_until(2_000, || {
        concrete.load(Ordering::SeqCst) == 1
            && auditable.load(Ordering::SeqCst) == 1
            && high_priority.load(Ordering::SeqCst) == 1
            && family.load(Ordering::SeqCst) == 1
            && root.load(Ordering::SeqCst) == 1
    }));

    // Let the worker idle a little more: counts must not grow past one
    // and the unrelated handler must never fire.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(concrete.load(Ordering::SeqCst), 1);
    assert_eq!(auditable.load(Ordering::SeqCst), 1);
    assert_eq!(high_priority.load(Ordering::SeqCst), 1);
    assert_eq!(family.load(Ordering::SeqCst), 1);
    assert_eq!(root.load(Ordering::SeqCst), 1);
    assert_eq!(unrelated.load(Ordering::SeqCst), 0);

    for outcome in bus.shutdown() {
        assert!(!outcome.timed_out());
    }
}
