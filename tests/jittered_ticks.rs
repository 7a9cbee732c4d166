// Irregular timer ticks must not leak into beat timing

mod common;

use beatkeeper::{AudioClock, GeneratedClicks, MetronomeEvent, Notification};
use common::harness;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LOOKAHEAD: f64 = 0.5;

#[test]
fn test_random_tick_gaps_keep_exact_spacing() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut h = harness(3.0, Box::new(GeneratedClicks::new()));
    let (diag_tx, diag_rx) = crossbeam_channel::unbounded::<Notification>();
    h.scheduler.set_diagnostics(Some(diag_tx));
    h.scheduler.start(None).unwrap();
    h.scheduler.on_tick();

    let mut seen = h.submitted.lock().unwrap().len();
    for _ in 0..2000 {
        // Up to 90% of the lookahead window between passes
        h.clock.advance(rng.gen_range(0.0..0.45));
        let now = h.clock.now();
        h.scheduler.on_tick();

        let submitted = h.submitted.lock().unwrap();
        for &(time, _) in &submitted[seen..] {
            assert!(time >= now, "note at {} scheduled in the past at {}", time, now);
            assert!(time < now + LOOKAHEAD);
        }
        seen = submitted.len();
        drop(submitted);

        assert!(h.scheduler.cursor().next_note_time >= now + LOOKAHEAD);
    }

    let submitted = h.submitted.lock().unwrap();
    assert!(submitted.len() > 100);
    for pair in submitted.windows(2) {
        assert!((pair[1].0 - pair[0].0 - 0.5).abs() < 1e-6);
    }
    assert!(diag_rx.try_recv().is_err());
}

#[test]
fn test_random_tempo_changes_never_go_backwards() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut h = harness(0.0, Box::new(GeneratedClicks::new()));
    let (diag_tx, diag_rx) = crossbeam_channel::unbounded::<Notification>();
    h.scheduler.set_diagnostics(Some(diag_tx));
    h.scheduler.start(None).unwrap();

    let mut min_spacing: f64 = 0.5;
    for i in 0..3000 {
        // 25 ms timer with +/- 20 ms of jitter
        h.clock.advance(rng.gen_range(0.005..0.045));
        h.scheduler.on_tick();

        if i % 97 == 0 {
            let bpm = rng.gen_range(60.0..240.0);
            h.scheduler.set_tempo(bpm).unwrap();
            min_spacing = min_spacing.min(60.0 / bpm);
        }
    }

    let beats: Vec<(u32, f64)> = h
        .scheduler
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            MetronomeEvent::Beat { beat, time, .. } => Some((beat, time)),
            _ => None,
        })
        .collect();

    assert!(beats.len() > 50);
    for pair in beats.windows(2) {
        let (prev_beat, prev_time) = pair[0];
        let (beat, time) = pair[1];
        assert_eq!(beat, prev_beat % 4 + 1);
        assert!(time - prev_time >= min_spacing - 1e-9);
    }
    assert!(diag_rx.try_recv().is_err());
}
