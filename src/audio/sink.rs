// Sound sink - where the scheduler submits sounds for playback

use super::AudioError;
use super::parameters::AtomicF32;
use super::timing::{AudioClock, StreamClock};
use crate::messaging::channels::SinkCommandProducer;
use crate::messaging::command::SinkCommand;
use crate::sound::SoundBuffer;
use ringbuf::traits::Producer;

/// Playback target for scheduled sounds
///
/// Submitted sounds cannot be revoked; a sound scheduled in the past starts
/// immediately.
pub trait SoundSink: Send {
    /// Start `sound` at audio time `time` (seconds on the `AudioClock`)
    fn schedule_start(&mut self, sound: &SoundBuffer, time: f64) -> Result<(), AudioError>;

    /// Master output level in [0, 1]
    fn set_gain(&mut self, level: f32);

    /// Check that the output can accept sounds
    fn ensure_available(&self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Sink feeding a `Mixer` through a lock-free command queue
pub struct MixerSink {
    commands: SinkCommandProducer,
    clock: StreamClock,
    gain: AtomicF32,
}

impl MixerSink {
    pub fn new(commands: SinkCommandProducer, clock: StreamClock, gain: AtomicF32) -> Self {
        Self {
            commands,
            clock,
            gain,
        }
    }

    pub fn clock(&self) -> &StreamClock {
        &self.clock
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }
}

impl SoundSink for MixerSink {
    fn schedule_start(&mut self, sound: &SoundBuffer, time: f64) -> Result<(), AudioError> {
        let start_frame = self.clock.seconds_to_frames(time);
        self.commands
            .try_push(SinkCommand::Play {
                sound: sound.clone(),
                start_frame,
            })
            .map_err(|_| AudioError::QueueFull)
    }

    fn set_gain(&mut self, level: f32) {
        self.gain.set(level.clamp(0.0, 1.0));
    }

    fn ensure_available(&self) -> Result<(), AudioError> {
        self.clock.ensure_running()
    }
}
