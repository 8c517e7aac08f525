//! In-memory transport for testing and single-process scenarios.
//!
//! A shared [`InMemoryNetwork`] of named queues, with one
//! [`InMemoryTransport`] handle per bus. Cloning a network or a
//! transport creates another handle to the same storage.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use unibus::{Address, InMemoryNetwork, Transport, TransportMessage};
//!
//! let network = InMemoryNetwork::new();
//! let transport = network.transport("orders");
//!
//! transport
//!     .send(
//!         &Address::from("billing"),
//!         TransportMessage::new(Address::from("orders"), vec![]),
//!     )
//!     .unwrap();
//! assert_eq!(network.pending(&Address::from("billing")), 1);
//! ```
//!
//! The transport records receive attempts, committed messages, and
//! rollbacks, so tests can observe the transactional behavior of the
//! worker loop without a real broker.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::envelope::{Address, TransportMessage};

use super::transport::{TransactionalUnit, Transport, TransportError};

#[derive(Default)]
struct NetworkInner {
    queues: Mutex<HashMap<Address, VecDeque<TransportMessage>>>,
    available: Condvar,
}

/// A set of named in-memory queues shared by any number of transports.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose input queue is `input_queue`.
    pub fn transport(&self, input_queue: impl Into<Address>) -> InMemoryTransport {
        InMemoryTransport {
            network: self.clone(),
            input_queue: input_queue.into(),
            receive_attempts: Arc::new(AtomicUsize::new(0)),
            committed: Arc::new(AtomicUsize::new(0)),
            rolled_back: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue an envelope directly, bypassing any transport. Lets
    /// tests craft envelopes with arbitrary return addresses.
    pub fn deliver(&self, destination: &Address, envelope: TransportMessage) {
        self.push_back(destination, envelope);
    }

    /// Number of envelopes waiting on a queue.
    pub fn pending(&self, queue: &Address) -> usize {
        self.inner
            .queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Remove and return every envelope waiting on a queue.
    pub fn drain(&self, queue: &Address) -> Vec<TransportMessage> {
        self.inner
            .queues
            .lock()
            .unwrap()
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    fn push_back(&self, queue: &Address, envelope: TransportMessage) {
        let mut queues = self.inner.queues.lock().unwrap();
        queues.entry(queue.clone()).or_default().push_back(envelope);
        self.inner.available.notify_all();
    }

    fn push_front(&self, queue: &Address, envelope: TransportMessage) {
        let mut queues = self.inner.queues.lock().unwrap();
        queues.entry(queue.clone()).or_default().push_front(envelope);
        self.inner.available.notify_all();
    }

    fn pop(&self, queue: &Address, timeout: Duration) -> Option<TransportMessage> {
        let deadline = Instant::now() + timeout;
        let mut queues = self.inner.queues.lock().unwrap();
        loop {
            if let Some(envelope) = queues.get_mut(queue).and_then(|q| q.pop_front()) {
                return Some(envelope);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = self
                .inner
                .available
                .wait_timeout(queues, deadline - now)
                .unwrap();
            queues = guard;
        }
    }
}

/// In-memory [`Transport`] bound to one input queue.
#[derive(Clone)]
pub struct InMemoryTransport {
    network: InMemoryNetwork,
    input_queue: Address,
    receive_attempts: Arc<AtomicUsize>,
    committed: Arc<AtomicUsize>,
    rolled_back: Arc<AtomicUsize>,
}

impl InMemoryTransport {
    /// The network this transport delivers through.
    pub fn network(&self) -> &InMemoryNetwork {
        &self.network
    }

    /// Number of receive attempts made through this transport's units.
    pub fn receive_attempts(&self) -> usize {
        self.receive_attempts.load(Ordering::SeqCst)
    }

    /// Number of units that committed while holding a received
    /// envelope. Trivial commits of empty units are not counted.
    pub fn committed_messages(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    /// Number of units rolled back while holding a received envelope.
    pub fn rolled_back_messages(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

impl Transport for InMemoryTransport {
    fn input_queue(&self) -> &Address {
        &self.input_queue
    }

    fn begin(&self) -> Result<Box<dyn TransactionalUnit>, TransportError> {
        Ok(Box::new(InMemoryUnit {
            network: self.network.clone(),
            input_queue: self.input_queue.clone(),
            receive_attempts: Arc::clone(&self.receive_attempts),
            committed: Arc::clone(&self.committed),
            rolled_back: Arc::clone(&self.rolled_back),
            received: None,
            outgoing: Vec::new(),
            finished: false,
        }))
    }

    fn send(
        &self,
        destination: &Address,
        envelope: TransportMessage,
    ) -> Result<(), TransportError> {
        self.network.push_back(destination, envelope);
        Ok(())
    }
}

struct InMemoryUnit {
    network: InMemoryNetwork,
    input_queue: Address,
    receive_attempts: Arc<AtomicUsize>,
    committed: Arc<AtomicUsize>,
    rolled_back: Arc<AtomicUsize>,
    received: Option<TransportMessage>,
    outgoing: Vec<(Address, TransportMessage)>,
    finished: bool,
}

impl InMemoryUnit {
    fn requeue_received(&mut self) {
        if let Some(envelope) = self.received.take() {
            // Redelivery position: front of the queue, as a broker
            // would redeliver an uncommitted receive.
            self.network.push_front(&self.input_queue, envelope);
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl TransactionalUnit for InMemoryUnit {
    fn receive(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<TransportMessage>, TransportError> {
        if self.received.is_some() {
            return Err(TransportError::Rejected(
                "unit already holds a received envelope".to_string(),
            ));
        }
        self.receive_attempts.fetch_add(1, Ordering::SeqCst);
        match self.network.pop(&self.input_queue, timeout) {
            Some(envelope) => {
                self.received = Some(envelope.clone());
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }

    fn send(
        &mut self,
        destination: &Address,
        envelope: TransportMessage,
    ) -> Result<(), TransportError> {
        self.outgoing.push((destination.clone(), envelope));
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), TransportError> {
        self.finished = true;
        if self.received.take().is_some() {
            self.committed.fetch_add(1, Ordering::SeqCst);
        }
        for (destination, envelope) in self.outgoing.drain(..) {
            self.network.push_back(&destination, envelope);
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), TransportError> {
        self.finished = true;
        self.outgoing.clear();
        self.requeue_received();
        Ok(())
    }
}

impl Drop for InMemoryUnit {
    fn drop(&mut self) {
        if !self.finished {
            self.outgoing.clear();
            self.requeue_received();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_message;

    #[derive(Clone, Debug, PartialEq)]
    struct Probe {
        n: u32,
    }

    impl_message!(Probe, "test.Probe");

    fn probe_envelope(reply_to: &str, n: u32) -> TransportMessage {
        TransportMessage::single(Address::from(reply_to), Box::new(Probe { n }))
    }

    #[test]
    fn send_and_receive() {
        let network = InMemoryNetwork::new();
        let transport = network.transport("inbox");

        transport
            .send(&Address::from("inbox"), probe_envelope("replies", 1))
            .unwrap();

        let mut unit = transport.begin().unwrap();
        let envelope = unit.receive(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(envelope.payloads[0].downcast_ref::<Probe>().unwrap().n, 1);
        unit.commit().unwrap();

        assert_eq!(transport.committed_messages(), 1);
        assert_eq!(network.pending(&Address::from("inbox")), 0);
    }

    #[test]
    fn receive_times_out_on_empty_queue() {
        let network = InMemoryNetwork::new();
        let transport = network.transport("inbox");

        let mut unit = transport.begin().unwrap();
        let started = Instant::now();
        assert!(unit.receive(Duration::from_millis(20)).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
        unit.commit().unwrap();

        assert_eq!(transport.receive_attempts(), 1);
        assert_eq!(transport.committed_messages(), 0);
    }

    #[test]
    fn second_receive_on_one_unit_is_rejected() {
        let network = InMemoryNetwork::new();
        let transport = network.transport("inbox");
        network.deliver(&Address::from("inbox"), probe_envelope("r", 1));
        network.deliver(&Address::from("inbox"), probe_envelope("r", 2));

        let mut unit = transport.begin().unwrap();
        unit.receive(Duration::from_millis(10)).unwrap().unwrap();
        assert!(matches!(
            unit.receive(Duration::from_millis(10)),
            Err(TransportError::Rejected(_))
        ));
    }

    #[test]
    fn commit_delivers_buffered_sends() {
        let network = InMemoryNetwork::new();
        let transport = network.transport("inbox");

        let mut unit = transport.begin().unwrap();
        unit.send(&Address::from("out"), probe_envelope("inbox", 7))
            .unwrap();
        assert_eq!(network.pending(&Address::from("out")), 0);
        unit.commit().unwrap();
        assert_eq!(network.pending(&Address::from("out")), 1);
    }

    #[test]
    fn rollback_discards_sends_and_requeues_receive_at_front() {
        let network = InMemoryNetwork::new();
        let transport = network.transport("inbox");
        network.deliver(&Address::from("inbox"), probe_envelope("r", 1));
        network.deliver(&Address::from("inbox"), probe_envelope("r", 2));

        let mut unit = transport.begin().unwrap();
        let first = unit.receive(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(first.payloads[0].downcast_ref::<Probe>().unwrap().n, 1);
        unit.send(&Address::from("out"), probe_envelope("inbox", 9))
            .unwrap();
        unit.rollback().unwrap();

        assert_eq!(network.pending(&Address::from("out")), 0);
        assert_eq!(transport.rolled_back_messages(), 1);

        // The rolled-back envelope comes back before the second one.
        let mut unit = transport.begin().unwrap();
        let redelivered = unit.receive(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(
            redelivered.payloads[0].downcast_ref::<Probe>().unwrap().n,
            1
        );
    }

    #[test]
    fn dropping_an_uncommitted_unit_rolls_back() {
        let network = InMemoryNetwork::new();
        let transport = network.transport("inbox");
        network.deliver(&Address::from("inbox"), probe_envelope("r", 1));

        {
            let mut unit = transport.begin().unwrap();
            unit.receive(Duration::from_millis(10)).unwrap().unwrap();
        }

        assert_eq!(transport.rolled_back_messages(), 1);
        assert_eq!(network.pending(&Address::from("inbox")), 1);
    }

    #[test]
    fn blocked_receive_wakes_on_delivery() {
        let network = InMemoryNetwork::new();
        let transport = network.transport("inbox");

        let sender = network.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sender.deliver(&Address::from("inbox"), probe_envelope("r", 5));
        });

        let mut unit = transport.begin().unwrap();
        let envelope = unit.receive(Duration::from_millis(500)).unwrap();
        assert!(envelope.is_some());
        handle.join().unwrap();
    }
}
