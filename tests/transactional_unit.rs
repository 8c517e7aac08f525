//! The receive-and-dispatch pair commits or rolls back as a unit, and
//! fetched handler instances go back to the registry even when one of
//! them fails.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use support::counting::CountingRegistry;
use support::messages::{EchoRequest, PlaceOrder};
use support::{fast_config, init_tracing, wait_until};
use unibus::{
    DispatchContext, HandlerError, HandlerTable, InMemoryNetwork, MessageHandler, ServiceBus,
};

struct CountingEcho {
    count: Arc<AtomicUsize>,
}

impl MessageHandler<EchoRequest> for CountingEcho {
    fn handle(
        &mut self,
        _message: &EchoRequest,
        _ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RejectingOrder;

impl MessageHandler<PlaceOrder> for RejectingOrder {
    fn handle(
        &mut self,
        message: &PlaceOrder,
        _ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::Failed(format!(
            "order {} rejected",
            message.order_id
        )))
    }
}

struct AcceptingOrder;

impl MessageHandler<PlaceOrder> for AcceptingOrder {
    fn handle(
        &mut self,
        _message: &PlaceOrder,
        _ctx: &mut DispatchContext<'_>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[test]
fn failing_second_payload_prevents_commit() {
    init_tracing();
    let network = InMemoryNetwork::new();
    let transport = network.transport("svc");

    let first_payload_handled = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&first_payload_handled);
    let table = HandlerTable::new()
        .on::<EchoRequest, _, _>(move || CountingEcho {
            count: Arc::clone(&count),
        })
        .on::<PlaceOrder, _, _>(|| RejectingOrder);

    let bus = ServiceBus::builder()
        .transport(transport.clone())
        .handlers(table)
        .config(fast_config(1))
        .build()
        .unwrap();

    bus.start();
    bus.send_many(
        bus.input_queue(),
        vec![
            Box::new(EchoRequest {
                tag: "first".to_string(),
            }),
            Box::new(PlaceOrder {
                order_id: "order-2".to_string(),
                quantity: 1,
            }),
        ],
    )
    .unwrap();

    // The first payload's handler runs, the second payload's handler
    // fails, and the unit is never marked complete.
    assert!(wait_until(2_000, || {
        transport.rolled_back_messages() >= 1
    }));
    assert!(first_payload_handled.load(Ordering::SeqCst) >= 1);
    assert_eq!(transport.committed_messages(), 0);

    bus.shutdown();
}

#[test]
fn handlers_are_released_when_one_fails() {
    init_tracing();
    let network = InMemoryNetwork::new();
    let transport = network.transport("svc");

    let table = HandlerTable::new()
        .on::<PlaceOrder, _, _>(|| AcceptingOrder)
        .on::<PlaceOrder, _, _>(|| RejectingOrder);
    let registry = CountingRegistry::new(table);
    let fetched = registry.fetched();
    let released = registry.released();

    let bus = ServiceBus::builder()
        .transport(transport.clone())
        .registry(Arc::new(registry))
        .config(fast_config(1))
        .build()
        .unwrap();

    bus.start();
    bus.send(
        bus.input_queue(),
        PlaceOrder {
            order_id: "order-3".to_string(),
            quantity: 1,
        },
    )
    .unwrap();

    assert!(wait_until(2_000, || {
        transport.rolled_back_messages() >= 1
    }));
    bus.shutdown();

    // With the workers stopped, every fetch has been matched by a
    // release, failure or not.
    let fetched = fetched.load(Ordering::SeqCst);
    let released = released.load(Ordering::SeqCst);
    assert!(fetched > 0);
    assert_eq!(fetched, released);
}
