// Timeline - Musical time primitives
// Tempo and time signature as validated value types

use super::SchedulerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time signature (beats per measure / beat unit)
/// Example: 4/4 time = TimeSignature { beats_per_measure: 4, beat_unit: 4 }
///
/// Serialized as a two-element tuple, `(4, 4)`, and validated on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct TimeSignature {
    beats_per_measure: u32,
    beat_unit: u32,
}

impl TimeSignature {
    /// Creates a new time signature
    /// Both parts must be positive
    pub fn new(beats_per_measure: u32, beat_unit: u32) -> Result<Self, SchedulerError> {
        if beats_per_measure == 0 || beat_unit == 0 {
            return Err(SchedulerError::InvalidTimeSignature {
                beats_per_measure,
                beat_unit,
            });
        }
        Ok(Self {
            beats_per_measure,
            beat_unit,
        })
    }

    /// Builds a signature from an arbitrary slice of parts
    /// Anything other than exactly two positive integers is rejected
    pub fn from_parts(parts: &[u32]) -> Result<Self, SchedulerError> {
        match parts {
            [beats, unit] => Self::new(*beats, *unit),
            _ => Err(SchedulerError::MalformedTimeSignature(parts.len())),
        }
    }

    /// Common 4/4 time signature
    pub const fn four_four() -> Self {
        Self {
            beats_per_measure: 4,
            beat_unit: 4,
        }
    }

    /// Common 3/4 time signature (waltz)
    pub const fn three_four() -> Self {
        Self {
            beats_per_measure: 3,
            beat_unit: 4,
        }
    }

    /// Common 6/8 time signature
    pub const fn six_eight() -> Self {
        Self {
            beats_per_measure: 6,
            beat_unit: 8,
        }
    }

    /// Number of beats in one measure (numerator)
    pub fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }

    /// Note value that gets one beat (denominator)
    pub fn beat_unit(&self) -> u32 {
        self.beat_unit
    }

    /// Whether `beat` is a valid 1-based position inside a measure
    pub fn contains_beat(&self, beat: u32) -> bool {
        (1..=self.beats_per_measure).contains(&beat)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl TryFrom<(u32, u32)> for TimeSignature {
    type Error = SchedulerError;

    fn try_from((beats_per_measure, beat_unit): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(beats_per_measure, beat_unit)
    }
}

impl From<TimeSignature> for (u32, u32) {
    fn from(sig: TimeSignature) -> Self {
        (sig.beats_per_measure, sig.beat_unit)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_measure, self.beat_unit)
    }
}

/// Tempo in BPM (Beats Per Minute)
/// Always finite and strictly positive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    pub fn new(bpm: f64) -> Result<Self, SchedulerError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SchedulerError::InvalidTempo(bpm));
        }
        Ok(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one measure in seconds at given time signature
    pub fn measure_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        self.seconds_per_beat() * time_signature.beats_per_measure() as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl TryFrom<f64> for Tempo {
    type Error = SchedulerError;

    fn try_from(bpm: f64) -> Result<Self, Self::Error> {
        Self::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}
