// Sequencer module
// Lookahead beat scheduling, musical time, and the metronome handle

pub mod config;
pub mod events;
pub mod metronome;
pub mod scheduler;
pub mod tick;
pub mod timeline;

pub use config::{ConfigError, ConfigUpdate, MetronomeConfig};
pub use events::{EventBus, EventKind, MetronomeEvent, Subscription, SubscriptionId};
pub use metronome::{Metronome, MetronomeSnapshot};
pub use scheduler::{BeatCursor, BeatScheduler, RunState, ScheduledNote, START_DELAY};
pub use tick::{ManualTickSource, ThreadTickSource, Tick, TickReceiver, TickSource};
pub use timeline::{Tempo, TimeSignature};

use crate::audio::AudioError;

/// Errors surfaced by scheduler operations
///
/// Invalid arguments never change scheduler state; callers that prefer the
/// fire-and-forget behaviour can simply ignore them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid tempo: {0} BPM (must be finite and > 0)")]
    InvalidTempo(f64),

    #[error("Invalid time signature: {beats_per_measure}/{beat_unit} (both parts must be > 0)")]
    InvalidTimeSignature { beats_per_measure: u32, beat_unit: u32 },

    #[error("Malformed time signature: expected 2 parts, got {0}")]
    MalformedTimeSignature(usize),

    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Audio unavailable: {0}")]
    Audio(#[from] AudioError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}
