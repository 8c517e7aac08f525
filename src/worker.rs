//! Worker threads: lifecycle and the transactional receive loop.
//!
//! Each worker owns one thread and runs the same loop: drain control
//! commands, then either idle-sleep (created/paused) or run one
//! transactional iteration: begin a unit, attempt one bounded
//! receive, dispatch every payload of the received envelope in
//! sequence order, commit on success, roll back on failure. Errors at
//! the loop boundary are logged and the worker keeps polling; a single
//! bad message never kills the thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::context::{DispatchContext, MessageContext};
use crate::routing::{Dispatcher, HandlerError};
use crate::subscription::SubscriptionStore;
use crate::transport::{Transport, TransportError};

/// Observable lifecycle state of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Thread alive, not yet started.
    Created,
    /// Polling the transport.
    Working,
    /// Polling halted; thread alive.
    Paused,
    /// Exit requested; current iteration finishing.
    Stopping,
    /// Thread function returned.
    Terminated,
}

const STATE_CREATED: u8 = 0;
const STATE_WORKING: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_STOPPING: u8 = 3;
const STATE_TERMINATED: u8 = 4;

fn decode_state(raw: u8) -> WorkerState {
    match raw {
        STATE_WORKING => WorkerState::Working,
        STATE_PAUSED => WorkerState::Paused,
        STATE_STOPPING => WorkerState::Stopping,
        STATE_TERMINATED => WorkerState::Terminated,
        _ => WorkerState::Created,
    }
}

/// Statistics from a worker thread.
#[derive(Clone, Debug, Default)]
pub struct WorkerStats {
    /// Number of transactional iterations attempted while working.
    pub polls: usize,
    /// Envelopes dispatched and committed.
    pub messages_handled: usize,
    /// Envelopes whose dispatch failed and rolled back.
    pub messages_failed: usize,
}

/// Outcome of [`Worker::dispose`].
#[derive(Clone, Debug)]
pub enum DisposeOutcome {
    /// The thread exited within the grace period.
    Clean(WorkerStats),
    /// The thread did not exit in time and was leaked. Flagged as an
    /// abnormal event; any in-flight unit is treated as uncommitted.
    TimedOut,
}

impl DisposeOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, DisposeOutcome::TimedOut)
    }
}

/// Worker tuning, a subset of the bus configuration.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Sleep between control checks while created or paused.
    pub idle_poll_interval: Duration,
    /// Upper bound on one blocking receive attempt.
    pub receive_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval: Duration::from_millis(100),
            receive_timeout: Duration::from_millis(100),
        }
    }
}

enum Command {
    Start,
    Pause,
    Stop,
}

/// A worker owning one thread.
///
/// Legal states: Created → Working ⇄ Paused → Stopping → Terminated.
/// Control is cooperative: commands are observed once per loop
/// iteration, so an in-flight dispatch always finishes before a pause
/// or stop takes effect.
pub struct Worker {
    name: String,
    control_tx: Sender<Command>,
    handle: Option<JoinHandle<WorkerStats>>,
    state: Arc<AtomicU8>,
}

impl Worker {
    /// Spawn a worker thread in the Created state.
    pub fn spawn(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
        subscriptions: Arc<dyn SubscriptionStore>,
        config: WorkerConfig,
    ) -> Self {
        let name = name.into();
        let (control_tx, control_rx) = channel();
        let state = Arc::new(AtomicU8::new(STATE_CREATED));

        let thread_name = name.clone();
        let thread_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            run_loop(
                thread_name,
                control_rx,
                thread_state,
                transport,
                dispatcher,
                subscriptions,
                config,
            )
        });

        Self {
            name,
            control_tx,
            handle: Some(handle),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        decode_state(self.state.load(Ordering::SeqCst))
    }

    /// Begin (or resume) polling the transport.
    pub fn start(&self) {
        let _ = self.control_tx.send(Command::Start);
    }

    /// Halt polling; the thread stays alive and an iteration already
    /// in progress completes.
    pub fn pause(&self) {
        let _ = self.control_tx.send(Command::Pause);
    }

    /// Request exit. The current iteration finishes first.
    pub fn stop(&self) {
        let _ = self.control_tx.send(Command::Stop);
    }

    /// Stop and wait for the thread to exit, returning its stats.
    pub fn join(mut self) -> WorkerStats {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => WorkerStats::default(),
        }
    }

    /// Stop and wait up to `grace` for the thread to exit
    /// cooperatively.
    ///
    /// A thread that does not exit in time is leaked, not killed: the
    /// timeout is logged as an abnormal event and reported through
    /// [`DisposeOutcome::TimedOut`]. The fate of any in-flight unit is
    /// whatever the transport does with an uncommitted unit.
    pub fn dispose(mut self, grace: Duration) -> DisposeOutcome {
        self.stop();
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return DisposeOutcome::Clean(WorkerStats::default()),
        };

        let deadline = Instant::now() + grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    worker = %self.name,
                    grace_ms = grace.as_millis() as u64,
                    "worker did not exit within the dispose grace period; leaking its thread"
                );
                return DisposeOutcome::TimedOut;
            }
            thread::sleep(Duration::from_millis(5));
        }

        match handle.join() {
            Ok(stats) => DisposeOutcome::Clean(stats),
            Err(_) => {
                tracing::error!(worker = %self.name, "worker thread panicked");
                DisposeOutcome::Clean(WorkerStats::default())
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.control_tx.send(Command::Stop);
        // Don't join on drop - let the thread finish naturally.
    }
}

fn run_loop(
    name: String,
    control_rx: Receiver<Command>,
    state: Arc<AtomicU8>,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    subscriptions: Arc<dyn SubscriptionStore>,
    config: WorkerConfig,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut working = false;

    loop {
        let mut should_exit = false;
        loop {
            match control_rx.try_recv() {
                Ok(Command::Start) => {
                    working = true;
                    state.store(STATE_WORKING, Ordering::SeqCst);
                }
                Ok(Command::Pause) => {
                    working = false;
                    state.store(STATE_PAUSED, Ordering::SeqCst);
                }
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => {
                    state.store(STATE_STOPPING, Ordering::SeqCst);
                    should_exit = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        if should_exit {
            break;
        }

        if !working {
            thread::sleep(config.idle_poll_interval);
            continue;
        }

        stats.polls += 1;
        match run_iteration(
            transport.as_ref(),
            &dispatcher,
            subscriptions.as_ref(),
            config.receive_timeout,
        ) {
            Ok(true) => stats.messages_handled += 1,
            Ok(false) => {}
            Err(e) => {
                stats.messages_failed += 1;
                tracing::error!(worker = %name, error = %e, "message processing failed");
            }
        }
    }

    state.store(STATE_TERMINATED, Ordering::SeqCst);
    tracing::debug!(worker = %name, "worker terminated");
    stats
}

/// One transactional iteration. `Ok(true)` means an envelope was
/// dispatched and committed, `Ok(false)` that no envelope was
/// available.
fn run_iteration(
    transport: &dyn Transport,
    dispatcher: &Dispatcher,
    subscriptions: &dyn SubscriptionStore,
    receive_timeout: Duration,
) -> Result<bool, IterationError> {
    let mut unit = transport.begin()?;

    let envelope = match unit.receive(receive_timeout) {
        Ok(Some(envelope)) => envelope,
        Ok(None) => {
            unit.commit()?;
            return Ok(false);
        }
        Err(e) => {
            let _ = unit.rollback();
            return Err(e.into());
        }
    };

    let context = MessageContext::for_envelope(&envelope);
    let input_queue = transport.input_queue().clone();
    let dispatched = catch_unwind(AssertUnwindSafe(|| {
        let mut ctx =
            DispatchContext::new(&context, unit.as_mut(), subscriptions, &input_queue);
        for payload in &envelope.payloads {
            dispatcher.dispatch(payload.as_ref(), &mut ctx)?;
        }
        Ok::<(), HandlerError>(())
    }));

    match dispatched {
        Ok(Ok(())) => {
            unit.commit()?;
            Ok(true)
        }
        Ok(Err(e)) => {
            let _ = unit.rollback();
            Err(IterationError::Dispatch(e))
        }
        Err(payload) => {
            let _ = unit.rollback();
            Err(IterationError::Panicked(panic_message(payload)))
        }
    }
}

enum IterationError {
    Transport(TransportError),
    Dispatch(HandlerError),
    Panicked(String),
}

impl std::fmt::Display for IterationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationError::Transport(e) => write!(f, "transport error: {}", e),
            IterationError::Dispatch(e) => write!(f, "dispatch failed: {}", e),
            IterationError::Panicked(msg) => write!(f, "handler panicked: {}", msg),
        }
    }
}

impl From<TransportError> for IterationError {
    fn from(err: TransportError) -> Self {
        IterationError::Transport(err)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
