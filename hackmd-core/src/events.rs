use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Change notifications emitted by the session registry.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionsChanged,
    ActiveSessionChanged,
}

/// Change notifications emitted by the recents store.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HistoryEvent {
    HistoryChanged,
}

/// Trait for delivering manager events to the frontend.
/// Implement this for your UI framework's event channel.
pub trait EventSink<E>: Send + Sync + 'static {
    fn send(&self, event: E);
}

impl<E: Send + 'static> EventSink<E> for crossbeam_channel::Sender<E> {
    fn send(&self, event: E) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = crossbeam_channel::Sender::send(self, event);
    }
}

/// Adapter so plain closures can subscribe.
pub struct FnSink<F>(pub F);

impl<E, F> EventSink<E> for FnSink<F>
where
    F: Fn(E) + Send + Sync + 'static,
{
    fn send(&self, event: E) {
        (self.0)(event)
    }
}

/// Ordered list of subscribers for one event type.
///
/// Sinks run synchronously inside the mutator that emits, so a sink must
/// not call back into the manager it observes. Shared state should be
/// observed through an [`EventRelay`] instead.
pub struct Observers<E> {
    sinks: Vec<Arc<dyn EventSink<E>>>,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self { sinks: Vec::new() }
    }
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Self {
            sinks: self.sinks.clone(),
        }
    }
}

impl<E: Copy + 'static> Observers<E> {
    pub fn subscribe(&mut self, sink: impl EventSink<E>) {
        self.sinks.push(Arc::new(sink));
    }

    /// Deliver `event` to every subscriber in subscription order.
    pub fn emit(&self, event: E) {
        for sink in &self.sinks {
            sink.send(event);
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Queues events raised under a lock and replays them to its own
/// subscribers once the caller has released that lock.
///
/// Subscribe [`EventRelay::sender`] to the locked manager, mutate, drop the
/// guard, then call [`EventRelay::flush`]. Subscribers may re-enter the
/// manager from `send`.
pub struct EventRelay<E> {
    tx: crossbeam_channel::Sender<E>,
    rx: crossbeam_channel::Receiver<E>,
    observers: Mutex<Observers<E>>,
}

impl<E: Copy + Send + 'static> Default for EventRelay<E> {
    fn default() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            observers: Mutex::new(Observers::default()),
        }
    }
}

impl<E: Copy + Send + 'static> EventRelay<E> {
    /// Sink that only queues; safe to call while the manager lock is held.
    pub fn sender(&self) -> crossbeam_channel::Sender<E> {
        self.tx.clone()
    }

    pub fn subscribe(&self, sink: impl EventSink<E>) {
        self.observers.lock().subscribe(sink);
    }

    /// Deliver every queued event. Must be called with no manager lock
    /// held.
    pub fn flush(&self) {
        let pending: Vec<E> = self.rx.try_iter().collect();
        if pending.is_empty() {
            return;
        }
        let observers = self.observers.lock().clone();
        for event in pending {
            observers.emit(event);
        }
    }

    /// Drop queued events without delivering them.
    pub fn discard(&self) {
        for _ in self.rx.try_iter() {}
    }
}
