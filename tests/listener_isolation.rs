// Misbehaving listeners must not disturb scheduling or other listeners

mod common;

use beatkeeper::{
    BeatScheduler, EventKind, GeneratedClicks, ManualClock, ManualTickSource, Metronome,
    MetronomeConfig, RunState,
};
use common::{NullSink, wait_until};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

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

#[test]
fn test_panicking_listener_is_contained() {
    let (metronome, clock, ticks) = manual_metronome();
    let healthy = Arc::new(AtomicUsize::new(0));

    metronome.subscribe(EventKind::Beat, |_| panic!("listener blew up"));
    let h = Arc::clone(&healthy);
    metronome.subscribe(EventKind::Beat, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    metronome.start(None).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        ticks.fire();
        clock.advance(0.1);
        metronome.sync_events();
        healthy.load(Ordering::SeqCst) >= 4
    }));
    assert_eq!(metronome.state(), RunState::Running);

    metronome.stop();
    assert_eq!(metronome.state(), RunState::Idle);
}

#[test]
fn test_unsubscribed_listener_stops_hearing_events() {
    let (metronome, _clock, _ticks) = manual_metronome();
    let starts = Arc::new(AtomicUsize::new(0));

    let s = Arc::clone(&starts);
    let subscription = metronome.subscribe(EventKind::Start, move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    metronome.start(None).unwrap();
    metronome.sync_events();
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    assert!(subscription.unsubscribe());
    metronome.start(None).unwrap();
    metronome.sync_events();
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_off_removes_shared_callback() {
    let (metronome, _clock, _ticks) = manual_metronome();
    let stops = Arc::new(AtomicUsize::new(0));

    let s = Arc::clone(&stops);
    let callback: beatkeeper::sequencer::events::Callback = Arc::new(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });
    metronome.on(EventKind::Stop, Arc::clone(&callback));
    metronome.on(EventKind::Stop, Arc::clone(&callback));

    metronome.start(None).unwrap();
    metronome.stop();
    metronome.sync_events();
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    assert!(metronome.off(EventKind::Stop, &callback));
    metronome.start(None).unwrap();
    metronome.stop();
    metronome.sync_events();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}
