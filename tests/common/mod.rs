// Shared test doubles for integration tests
#![allow(dead_code)]

use beatkeeper::{
    AudioError, BeatScheduler, ManualClock, ManualTickSource, MetronomeConfig, SoundBuffer,
    SoundProvider, SoundSink,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// (start time, buffer length) of every submitted sound
pub type Submissions = Arc<Mutex<Vec<(f64, usize)>>>;

pub struct RecordingSink {
    pub submitted: Submissions,
    pub gain: Arc<Mutex<f32>>,
}

impl RecordingSink {
    pub fn new() -> (Self, Submissions) {
        let submitted = Submissions::default();
        (
            Self {
                submitted: Arc::clone(&submitted),
                gain: Arc::new(Mutex::new(1.0)),
            },
            submitted,
        )
    }
}

impl SoundSink for RecordingSink {
    fn schedule_start(&mut self, sound: &SoundBuffer, time: f64) -> Result<(), AudioError> {
        self.submitted.lock().unwrap().push((time, sound.len()));
        Ok(())
    }

    fn set_gain(&mut self, level: f32) {
        *self.gain.lock().unwrap() = level;
    }
}

pub struct NullSink;

impl SoundSink for NullSink {
    fn schedule_start(&mut self, _sound: &SoundBuffer, _time: f64) -> Result<(), AudioError> {
        Ok(())
    }

    fn set_gain(&mut self, _level: f32) {}
}

pub struct Harness {
    pub scheduler: BeatScheduler,
    pub clock: ManualClock,
    pub ticks: ManualTickSource,
    pub submitted: Submissions,
}

/// Scheduler on a manual clock starting at `start`, with a recording sink
pub fn harness(start: f64, provider: Box<dyn SoundProvider>) -> Harness {
    let clock = ManualClock::new(start);
    let (ticks, _tick_rx) = ManualTickSource::new();
    let (sink, submitted) = RecordingSink::new();
    let scheduler = BeatScheduler::new(
        MetronomeConfig::default(),
        Arc::new(clock.clone()),
        Box::new(sink),
        provider,
        Box::new(ticks.clone()),
    )
    .unwrap();

    Harness {
        scheduler,
        clock,
        ticks,
        submitted,
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
