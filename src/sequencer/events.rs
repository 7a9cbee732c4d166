// Event bus - typed notifications from the scheduler to listeners (UI, loggers)
// Listeners run synchronously in subscription order; a panicking listener is
// contained and logged so it cannot take the scheduler down with it.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Event discriminant, used as the subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Stop,
    Pause,
    Beat,
    Measure,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Pause => "pause",
            EventKind::Beat => "beat",
            EventKind::Measure => "measure",
        };
        f.write_str(name)
    }
}

/// Notification emitted by the scheduler
///
/// `time` fields are audio clock timestamps (seconds). Beat and measure
/// events are emitted when the note is scheduled, which is up to one
/// lookahead window before it becomes audible; listeners that want to
/// animate in sync should wait until the clock reaches `time`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetronomeEvent {
    /// Scheduler entered `Running`; `time` is when the next beat is due
    Start { time: f64, resumed: bool },
    /// Scheduler returned to `Idle`
    Stop,
    /// Scheduler suspended at the given cursor position
    Pause { beat: u32, measure: u64 },
    /// A beat was scheduled
    Beat { beat: u32, measure: u64, time: f64 },
    /// The first beat of a measure was scheduled
    Measure { measure: u64, time: f64 },
}

impl MetronomeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MetronomeEvent::Start { .. } => EventKind::Start,
            MetronomeEvent::Stop => EventKind::Stop,
            MetronomeEvent::Pause { .. } => EventKind::Pause,
            MetronomeEvent::Beat { .. } => EventKind::Beat,
            MetronomeEvent::Measure { .. } => EventKind::Measure,
        }
    }
}

/// Shared listener callback; identity is the `Arc` allocation
pub type Callback = Arc<dyn Fn(&MetronomeEvent) + Send + Sync>;

/// Opaque id of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(SubscriptionId, Callback)>>,
}

/// Publish/subscribe hub keyed by `EventKind`
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Subscribers>,
}

/// Handle returned by `EventBus::on`
///
/// Dropping it keeps the listener registered; call `unsubscribe` to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<EventBus>,
    kind: EventKind,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the listener; returns false if it was already gone
    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.off_id(self.kind, self.id),
            None => false,
        }
    }
}

fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for `kind`
    ///
    /// Registering the same `Arc` twice for one kind keeps a single entry and
    /// returns a handle to it.
    pub fn on(self: &Arc<Self>, kind: EventKind, callback: Callback) -> Subscription {
        let mut subs = self.lock();
        let existing = subs
            .by_kind
            .get(&kind)
            .and_then(|list| list.iter().find(|(_, cb)| same_callback(cb, &callback)))
            .map(|(id, _)| *id);

        let id = match existing {
            Some(id) => id,
            None => {
                let id = SubscriptionId(subs.next_id);
                subs.next_id += 1;
                subs.by_kind.entry(kind).or_default().push((id, callback));
                id
            }
        };

        Subscription {
            bus: Arc::downgrade(self),
            kind,
            id,
        }
    }

    /// Convenience wrapper around `on` for plain closures
    pub fn subscribe<F>(self: &Arc<Self>, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&MetronomeEvent) + Send + Sync + 'static,
    {
        self.on(kind, Arc::new(callback))
    }

    /// Remove `callback` from `kind` by identity
    pub fn off(&self, kind: EventKind, callback: &Callback) -> bool {
        let mut subs = self.lock();
        match subs.by_kind.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(_, cb)| !same_callback(cb, callback));
                list.len() != before
            }
            None => false,
        }
    }

    /// Remove a registration by id
    pub fn off_id(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        match subs.by_kind.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(sid, _)| *sid != id);
                list.len() != before
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock().by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every listener of `event.kind()` in subscription order
    ///
    /// Runs on a snapshot of the listener list, so callbacks may subscribe or
    /// unsubscribe freely. Returns the number of listeners that panicked.
    pub fn trigger(&self, event: &MetronomeEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Callback> = match self.lock().by_kind.get(&kind) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };

        let mut failures = 0;
        for callback in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                failures += 1;
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!(target: "metronome::events", "Error in {} event handler: {}", kind, reason);
            }
        }
        failures
    }

    /// Trigger a batch of events in order
    pub fn dispatch_all(&self, events: &[MetronomeEvent]) {
        for event in events {
            self.trigger(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self.lock();
        let counts: HashMap<EventKind, usize> = subs
            .by_kind
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}
