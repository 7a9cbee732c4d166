// Metronome - thread-safe handle around the beat scheduler
//
// Three threads cooperate:
// - the tick source's timer thread emits ticks
// - the scheduler thread consumes them and runs scheduling passes
// - the event thread runs listeners
// Every operation locks the scheduler for its whole duration, so a tick can
// never observe a half-applied reconfiguration. Events are queued while the
// lock is held (keeping their order) and dispatched after it is released,
// which lets listeners call back into the metronome.

use super::SchedulerError;
use super::config::{ConfigUpdate, MetronomeConfig};
use super::events::{Callback, EventBus, EventKind, MetronomeEvent, Subscription};
use super::scheduler::{BeatCursor, BeatScheduler, RunState, ScheduledNote};
use super::tick::{ThreadTickSource, TickReceiver};
use super::timeline::TimeSignature;
use crate::audio::{AudioClock, SoundSink};
use crate::messaging::notification::Notification;
use crate::sound::SoundProvider;
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

enum Dispatch {
    Events(Vec<MetronomeEvent>),
    Flush(Sender<()>),
    Shutdown,
}

/// Consistent view of the scheduler taken under one lock
#[derive(Debug, Clone, PartialEq)]
pub struct MetronomeSnapshot {
    pub config: MetronomeConfig,
    pub cursor: BeatCursor,
    pub state: RunState,
}

fn lock(scheduler: &Mutex<BeatScheduler>) -> MutexGuard<'_, BeatScheduler> {
    scheduler.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Move queued events to the event thread; call with the lock held
fn forward_events(scheduler: &mut BeatScheduler, dispatch_tx: &Sender<Dispatch>) {
    let events = scheduler.take_events();
    if !events.is_empty() {
        let _ = dispatch_tx.send(Dispatch::Events(events));
    }
}

pub struct Metronome {
    scheduler: Arc<Mutex<BeatScheduler>>,
    bus: Arc<EventBus>,
    dispatch_tx: Sender<Dispatch>,
    shutdown_tx: Sender<()>,
    consumer: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    dispatcher_id: ThreadId,
}

impl Metronome {
    /// Wrap `scheduler`, consuming the ticks of its tick source from `ticks`
    pub fn new(scheduler: BeatScheduler, ticks: TickReceiver) -> Result<Self, SchedulerError> {
        let bus = EventBus::new();
        let (dispatch_tx, dispatch_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        let dispatcher_bus = Arc::clone(&bus);
        let dispatcher = thread::Builder::new()
            .name("beatkeeper-events".to_string())
            .spawn(move || run_dispatcher(dispatcher_bus, dispatch_rx))
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;
        let dispatcher_id = dispatcher.thread().id();

        let scheduler = Arc::new(Mutex::new(scheduler));
        let consumer_scheduler = Arc::clone(&scheduler);
        let consumer_tx = dispatch_tx.clone();
        let consumer = thread::Builder::new()
            .name("beatkeeper-scheduler".to_string())
            .spawn(move || run_consumer(consumer_scheduler, ticks, shutdown_rx, consumer_tx))
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;

        Ok(Self {
            scheduler,
            bus,
            dispatch_tx,
            shutdown_tx,
            consumer: Some(consumer),
            dispatcher: Some(dispatcher),
            dispatcher_id,
        })
    }

    /// Build a scheduler driven by a `ThreadTickSource` and wrap it
    pub fn with_thread_timer(
        config: MetronomeConfig,
        clock: Arc<dyn AudioClock>,
        sink: Box<dyn SoundSink>,
        provider: Box<dyn SoundProvider>,
    ) -> Result<Self, SchedulerError> {
        let (ticks, tick_rx) = ThreadTickSource::spawn(config.tick_interval())
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;
        let scheduler = BeatScheduler::new(config, clock, sink, provider, Box::new(ticks))?;
        Self::new(scheduler, tick_rx)
    }

    fn with_scheduler<R>(&self, f: impl FnOnce(&mut BeatScheduler) -> R) -> R {
        let mut scheduler = lock(&self.scheduler);
        let result = f(&mut *scheduler);
        forward_events(&mut scheduler, &self.dispatch_tx);
        result
    }

    pub fn start(&self, update: Option<ConfigUpdate>) -> Result<(), SchedulerError> {
        self.with_scheduler(|s| s.start(update))
    }

    pub fn pause(&self) {
        self.with_scheduler(BeatScheduler::pause)
    }

    pub fn resume(&self) -> Result<(), SchedulerError> {
        self.with_scheduler(BeatScheduler::resume)
    }

    pub fn stop(&self) {
        self.with_scheduler(BeatScheduler::stop)
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<(), SchedulerError> {
        self.with_scheduler(|s| s.set_tempo(bpm))
    }

    pub fn set_time_signature(&self, time_signature: TimeSignature) {
        self.with_scheduler(|s| s.set_time_signature(time_signature))
    }

    pub fn set_time_signature_parts(&self, parts: &[u32]) -> Result<(), SchedulerError> {
        self.with_scheduler(|s| s.set_time_signature_parts(parts))
    }

    pub fn set_sound_source(&self, provider: Box<dyn SoundProvider>) {
        self.with_scheduler(|s| s.set_sound_source(provider))
    }

    pub fn use_generated_sounds(&self) {
        self.with_scheduler(BeatScheduler::use_generated_sounds)
    }

    pub fn set_click_sounds(&self, sounds: BTreeMap<u32, PathBuf>) {
        self.with_scheduler(|s| s.set_click_sounds(sounds))
    }

    pub fn set_volume(&self, level: f32) -> Result<(), SchedulerError> {
        self.with_scheduler(|s| s.set_volume(level))
    }

    pub fn set_diagnostics(&self, tx: Option<Sender<Notification>>) {
        self.with_scheduler(|s| s.set_diagnostics(tx))
    }

    pub fn get_config(&self) -> MetronomeConfig {
        lock(&self.scheduler).get_config()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.scheduler).is_running()
    }

    pub fn state(&self) -> RunState {
        lock(&self.scheduler).state()
    }

    pub fn cursor(&self) -> BeatCursor {
        lock(&self.scheduler).cursor()
    }

    pub fn queued_notes(&self) -> Vec<ScheduledNote> {
        lock(&self.scheduler).queued_notes().iter().copied().collect()
    }

    pub fn snapshot(&self) -> MetronomeSnapshot {
        let scheduler = lock(&self.scheduler);
        MetronomeSnapshot {
            config: scheduler.get_config(),
            cursor: scheduler.cursor(),
            state: scheduler.state(),
        }
    }

    pub fn on(&self, kind: EventKind, callback: Callback) -> Subscription {
        self.bus.on(kind, callback)
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&MetronomeEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, callback)
    }

    pub fn off(&self, kind: EventKind, callback: &Callback) -> bool {
        self.bus.off(kind, callback)
    }

    /// Block until every event emitted so far has been delivered
    ///
    /// Returns immediately when called from a listener.
    pub fn sync_events(&self) {
        if thread::current().id() == self.dispatcher_id {
            return;
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.dispatch_tx.send(Dispatch::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.consumer.take() {
            if handle.join().is_err() {
                log::error!(target: "metronome", "scheduler thread panicked");
            }
        }

        let _ = self.dispatch_tx.send(Dispatch::Shutdown);
        if let Some(handle) = self.dispatcher.take() {
            // Dropped from inside a listener: the event thread exits by itself
            if thread::current().id() != self.dispatcher_id && handle.join().is_err() {
                log::error!(target: "metronome", "event thread panicked");
            }
        }
    }
}

fn run_consumer(
    scheduler: Arc<Mutex<BeatScheduler>>,
    ticks: TickReceiver,
    shutdown_rx: Receiver<()>,
    dispatch_tx: Sender<Dispatch>,
) {
    loop {
        crossbeam_channel::select! {
            recv(ticks) -> tick => {
                let Ok(tick) = tick else { return };
                let skipped = ticks.try_iter().count();
                if skipped > 0 {
                    log::trace!(target: "metronome", "tick {} coalesced {} pending ticks", tick.seq, skipped);
                }
                let mut guard = lock(&scheduler);
                guard.on_tick();
                forward_events(&mut guard, &dispatch_tx);
            }
            recv(shutdown_rx) -> _ => return,
        }
    }
}

fn run_dispatcher(bus: Arc<EventBus>, dispatch_rx: Receiver<Dispatch>) {
    while let Ok(message) = dispatch_rx.recv() {
        match message {
            Dispatch::Events(events) => bus.dispatch_all(&events),
            Dispatch::Flush(ack) => {
                let _ = ack.send(());
            }
            Dispatch::Shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioError, ManualClock};
    use crate::sequencer::tick::{ManualTickSource, TickSource};
    use crate::sound::{GeneratedClicks, SoundBuffer};
    use std::sync::Weak;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct NullSink;

    impl SoundSink for NullSink {
        fn schedule_start(&mut self, _sound: &SoundBuffer, _time: f64) -> Result<(), AudioError> {
            Ok(())
        }

        fn set_gain(&mut self, _level: f32) {}
    }

    fn manual_metronome() -> (Metronome, ManualClock, ManualTickSource) {
        let clock = ManualClock::new(1.0);
        let (ticks, tick_rx) = ManualTickSource::new();
        let scheduler = BeatScheduler::new(
            MetronomeConfig::default(),
            Arc::new(clock.clone()),
            Box::new(NullSink),
            Box::new(GeneratedClicks::new()),
            Box::new(ticks.clone()),
        )
        .unwrap();
        (Metronome::new(scheduler, tick_rx).unwrap(), clock, ticks)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn counter(metronome: &Metronome, kind: EventKind) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        metronome.subscribe(kind, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_start_and_stop_reach_listeners() {
        let (metronome, _clock, _ticks) = manual_metronome();
        let starts = counter(&metronome, EventKind::Start);
        let stops = counter(&metronome, EventKind::Stop);

        metronome.start(None).unwrap();
        metronome.stop();
        metronome.stop();
        metronome.sync_events();

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(metronome.state(), RunState::Idle);
    }

    #[test]
    fn test_ticks_drive_beats() {
        let (metronome, clock, ticks) = manual_metronome();
        let beats = counter(&metronome, EventKind::Beat);
        let measures = counter(&metronome, EventKind::Measure);

        metronome.start(None).unwrap();
        assert!(ticks.fire());
        assert!(wait_until(|| !metronome.queued_notes().is_empty()));
        metronome.sync_events();
        assert_eq!(beats.load(Ordering::SeqCst), 1);
        assert_eq!(measures.load(Ordering::SeqCst), 1);

        clock.advance(0.5);
        assert!(ticks.fire());
        assert!(wait_until(|| metronome.cursor().beat_count == 3));
        metronome.sync_events();
        assert_eq!(beats.load(Ordering::SeqCst), 2);
        assert_eq!(measures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_call_back_into_metronome() {
        let (metronome, _clock, ticks) = manual_metronome();
        let metronome = Arc::new(metronome);
        let weak: Weak<Metronome> = Arc::downgrade(&metronome);

        metronome.subscribe(EventKind::Beat, move |_| {
            if let Some(m) = weak.upgrade() {
                m.pause();
                m.sync_events();
            }
        });
        let pauses = counter(&metronome, EventKind::Pause);

        metronome.start(None).unwrap();
        assert!(ticks.fire());
        assert!(wait_until(|| metronome.state() == RunState::Paused));
        metronome.sync_events();
        assert_eq!(pauses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let (metronome, _clock, _ticks) = manual_metronome();
        metronome.start(Some(ConfigUpdate::new().tempo(90.0))).unwrap();

        let snapshot = metronome.snapshot();
        assert_eq!(snapshot.state, RunState::Running);
        assert_eq!(snapshot.config.tempo.bpm(), 90.0);
        assert_eq!(snapshot.cursor.seconds_per_beat, 60.0 / 90.0);
        assert!(metronome.is_running());
        assert_eq!(metronome.get_config(), snapshot.config);
    }

    #[test]
    fn test_drop_stops_and_delivers_stop() {
        let (metronome, _clock, ticks) = manual_metronome();
        let stops = counter(&metronome, EventKind::Stop);
        metronome.start(None).unwrap();
        drop(metronome);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!ticks.is_active());
    }
}
