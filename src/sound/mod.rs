// Sound module - per-beat click buffers for the scheduler
//
// A `SoundProvider` owns one decoded buffer per beat position. The scheduler
// calls `prepare` before playback and whenever the meter changes, then asks
// `buffer_for(beat)` on every scheduled note.

pub mod generator;
pub mod loader;

pub use generator::{ClickParams, GeneratedClicks};
pub use loader::{FileSounds, load_sound};

use crate::sequencer::TimeSignature;
use std::path::PathBuf;
use std::sync::Arc;

/// Decoded mono audio, cheap to clone
#[derive(Debug, Clone, PartialEq)]
pub struct SoundBuffer {
    samples: Arc<[f32]>,
    sample_rate: f64,
}

impl SoundBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: f64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate
    }
}

/// Sound loading and generation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SoundError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Sound file contains no audio: {0}")]
    Empty(PathBuf),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),
}

/// Outcome of `SoundProvider::prepare`
///
/// A beat listed in `failures` stays silent; playback goes on regardless.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareReport {
    pub loaded: Vec<u32>,
    pub failures: Vec<(u32, SoundError)>,
}

impl PrepareReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Source of the click played on each beat
pub trait SoundProvider: Send {
    /// Buffer for a 1-based beat position, if one is prepared
    fn buffer_for(&self, beat: u32) -> Option<SoundBuffer>;

    /// Build or load the buffers for `signature` at the output `sample_rate`
    fn prepare(
        &mut self,
        signature: &TimeSignature,
        sample_rate: f64,
    ) -> Result<PrepareReport, SoundError>;

    /// Whether the buffers depend on the time signature and must be
    /// rebuilt when it changes
    fn is_signature_dependent(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}
