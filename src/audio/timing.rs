// Audio timing - the clock every scheduling decision is measured against
//
// The scheduler never reads wall-clock time. It asks an `AudioClock` for the
// current position of the audio timeline, in seconds, and schedules sounds
// on that same timeline.

use super::AudioError;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic high-resolution clock of the audio output
pub trait AudioClock: Send + Sync {
    /// Current audio time in seconds; never decreases
    fn now(&self) -> f64;

    /// Sample rate of the timeline, used to convert seconds to frames
    fn sample_rate(&self) -> f64;

    /// Make sure the clock is advancing before playback starts
    ///
    /// Devices that need a user gesture or are still opening report an error
    /// here; the caller must not enter `Running`.
    fn ensure_running(&self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Clock driven by the audio callback's frame counter
#[derive(Debug, Clone)]
pub struct StreamClock {
    /// Frames rendered so far (incremented by the audio callback)
    frames: Arc<AtomicU64>,
    sample_rate: f64,
    status: AtomicDeviceStatus,
}

impl StreamClock {
    pub fn new(sample_rate: f64, status: AtomicDeviceStatus) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
            status,
        }
    }

    /// Get current frame position (called from the scheduler thread)
    pub fn current_frame(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Advance the frame position (called from the audio callback)
    pub fn advance(&self, frames: usize) {
        self.frames.fetch_add(frames as u64, Ordering::AcqRel);
    }

    /// Convert an audio timestamp to the frame it falls on
    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate).round() as u64
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    pub fn status_handle(&self) -> AtomicDeviceStatus {
        self.status.clone()
    }
}

impl AudioClock for StreamClock {
    fn now(&self) -> f64 {
        self.current_frame() as f64 / self.sample_rate
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn ensure_running(&self) -> Result<(), AudioError> {
        let status = self.status.get();
        if status.is_usable() {
            Ok(())
        } else {
            Err(AudioError::DeviceUnavailable(status))
        }
    }
}

/// Hand-driven clock for tests and offline rendering
///
/// Clones share the same time, so a test can advance the clock the scheduler
/// is reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    seconds_bits: Arc<AtomicU64>,
    sample_rate: f64,
    available: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self::with_sample_rate(start, 48_000.0)
    }

    pub fn with_sample_rate(start: f64, sample_rate: f64) -> Self {
        Self {
            seconds_bits: Arc::new(AtomicU64::new(start.to_bits())),
            sample_rate,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Jump to `seconds`; earlier values are ignored to keep the clock monotonic
    pub fn set(&self, seconds: f64) {
        let _ = self
            .seconds_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (seconds > f64::from_bits(bits)).then(|| seconds.to_bits())
            });
    }

    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            self.set(self.now() + seconds);
        }
    }

    /// Simulate a device that cannot be resumed
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::Acquire))
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn ensure_running(&self) -> Result<(), AudioError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(AudioError::DeviceUnavailable(DeviceStatus::Disconnected))
        }
    }
}

/// Clock backed by `Instant`, for running without an output device
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    sample_rate: f64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sample_rate: 48_000.0,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
