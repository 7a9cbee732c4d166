// Beatkeeper - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod connection;
pub mod messaging;
pub mod sequencer;
pub mod sound;

// Re-export commonly used types for convenience
pub use audio::engine::AudioEngine;
pub use audio::timing::{AudioClock, ManualClock, MonotonicClock, StreamClock};
pub use audio::{AudioError, Mixer, MixerSink, SoundSink};
pub use messaging::notification::{Notification, NotificationCategory, NotificationLevel};
pub use sequencer::{
    BeatCursor, BeatScheduler, ConfigUpdate, EventBus, EventKind, ManualTickSource, Metronome,
    MetronomeConfig, MetronomeEvent, RunState, ScheduledNote, SchedulerError, Subscription, Tempo,
    ThreadTickSource, TickSource, TimeSignature,
};
pub use sound::{FileSounds, GeneratedClicks, PrepareReport, SoundBuffer, SoundError, SoundProvider};
