// Audio module - clock, sink and the cpal output backend
//
// The scheduler only sees the `AudioClock` and `SoundSink` traits. The rest
// of this module is the reference backend: a frame-counting clock, a mixer
// that starts sounds on exact frames, and the cpal stream that drives it.

pub mod dsp_utils;
pub mod engine;
pub mod format_conversion;
pub mod mixer;
pub mod parameters;
pub mod sink;
pub mod timing;

pub use engine::AudioEngine;
pub use mixer::Mixer;
pub use sink::{MixerSink, SoundSink};
pub use timing::{AudioClock, ManualClock, MonotonicClock, StreamClock};

use crate::connection::status::DeviceStatus;

/// Audio backend errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Audio device configuration error: {0}")]
    DeviceConfig(String),

    #[error("Unsupported sample format: {0}. Supported formats: F32, I16, U16")]
    UnsupportedFormat(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Audio device not running (status: {0:?})")]
    DeviceUnavailable(DeviceStatus),

    #[error("Sink command queue is full")]
    QueueFull,
}
