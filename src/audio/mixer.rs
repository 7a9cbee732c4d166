// Mixer - starts scheduled sounds on their exact output frame
//
// Runs inside the audio callback. Everything it needs is pre-allocated in
// `new`; `render` performs no allocation, I/O or blocking.

use super::dsp_utils::{OnePoleSmoother, flush_denormals_to_zero, soft_clip};
use super::parameters::AtomicF32;
use super::sink::MixerSink;
use super::timing::{AudioClock, StreamClock};
use crate::messaging::channels::{SinkCommandConsumer, create_sink_channel};
use crate::messaging::command::SinkCommand;
use crate::sound::SoundBuffer;
use ringbuf::traits::Consumer;

/// Maximum simultaneously sounding clicks
pub const MAX_VOICES: usize = 32;

/// Maximum sounds waiting for their start frame
pub const MAX_PENDING: usize = 64;

/// Capacity of the scheduler → mixer command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

struct Voice {
    sound: SoundBuffer,
    position: usize,
}

struct PendingStart {
    sound: SoundBuffer,
    start_frame: u64,
}

pub struct Mixer {
    commands: SinkCommandConsumer,
    clock: StreamClock,
    gain: AtomicF32,
    gain_smoother: OnePoleSmoother,
    voices: Vec<Voice>,
    pending: Vec<PendingStart>,
    dropped: u64,
}

impl Mixer {
    pub fn new(commands: SinkCommandConsumer, clock: StreamClock, gain: AtomicF32) -> Self {
        let gain_smoother = OnePoleSmoother::new(gain.get(), 10.0, clock.sample_rate() as f32);
        Self {
            commands,
            clock,
            gain,
            gain_smoother,
            voices: Vec::with_capacity(MAX_VOICES),
            pending: Vec::with_capacity(MAX_PENDING),
            dropped: 0,
        }
    }

    /// Create a mixer and the sink that feeds it, sharing `clock`
    pub fn pair(clock: StreamClock) -> (Mixer, MixerSink) {
        let (producer, consumer) = create_sink_channel(COMMAND_QUEUE_CAPACITY);
        let gain = AtomicF32::new(1.0);
        let sink = MixerSink::new(producer, clock.clone(), gain.clone());
        (Mixer::new(consumer, clock, gain), sink)
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn pending_starts(&self) -> usize {
        self.pending.len()
    }

    /// Sounds discarded because the pending list was full
    pub fn dropped_starts(&self) -> u64 {
        self.dropped
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            match command {
                SinkCommand::Play { sound, start_frame } => {
                    if self.pending.len() < MAX_PENDING {
                        self.pending.push(PendingStart { sound, start_frame });
                    } else {
                        self.dropped += 1;
                    }
                }
            }
        }
    }

    fn start_due(&mut self, frame: u64) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].start_frame <= frame {
                let start = self.pending.swap_remove(i);
                if self.voices.len() == MAX_VOICES {
                    // Steal the oldest voice
                    self.voices.remove(0);
                }
                self.voices.push(Voice {
                    sound: start.sound,
                    position: 0,
                });
            } else {
                i += 1;
            }
        }
    }

    /// Render one block of mono output and advance the shared clock
    ///
    /// `output[0]` is the frame at `clock.current_frame()`.
    pub fn render(&mut self, output: &mut [f32]) {
        self.drain_commands();

        let base_frame = self.clock.current_frame();
        let target_gain = self.gain.get();

        for (offset, out) in output.iter_mut().enumerate() {
            if !self.pending.is_empty() {
                self.start_due(base_frame + offset as u64);
            }

            let mut sample = 0.0f32;
            for voice in &mut self.voices {
                if let Some(s) = voice.sound.samples().get(voice.position) {
                    sample += *s;
                }
                voice.position += 1;
            }
            self.voices
                .retain(|voice| voice.position < voice.sound.len());

            let gain = self.gain_smoother.process(target_gain);
            *out = soft_clip(flush_denormals_to_zero(sample) * gain);
        }

        self.clock.advance(output.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::SoundSink;
    use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};

    fn setup() -> (Mixer, MixerSink, StreamClock) {
        let clock = StreamClock::new(1000.0, AtomicDeviceStatus::new(DeviceStatus::Connected));
        let (mut mixer, sink) = Mixer::pair(clock.clone());
        mixer.gain_smoother.reset(1.0);
        (mixer, sink, clock)
    }

    fn impulse() -> SoundBuffer {
        SoundBuffer::new(vec![0.5, 0.25], 1000.0)
    }

    #[test]
    fn test_sound_starts_on_exact_frame() {
        let (mut mixer, mut sink, clock) = setup();
        // 1000 Hz: t = 0.013 s is frame 13
        sink.schedule_start(&impulse(), 0.013).unwrap();

        let mut block = [0.0f32; 10];
        mixer.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
        assert_eq!(clock.current_frame(), 10);
        assert_eq!(mixer.pending_starts(), 1);

        mixer.render(&mut block);
        assert_eq!(block[2], 0.0);
        assert!((block[3] - 0.5f32.tanh()).abs() < 1e-6);
        assert!((block[4] - 0.25f32.tanh()).abs() < 1e-6);
        assert_eq!(block[5], 0.0);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_late_sound_starts_immediately() {
        let (mut mixer, mut sink, _clock) = setup();
        let mut block = [0.0f32; 8];
        mixer.render(&mut block);

        sink.schedule_start(&impulse(), 0.002).unwrap();
        mixer.render(&mut block);
        assert!((block[0] - 0.5f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_overlapping_sounds_are_summed() {
        let (mut mixer, mut sink, _clock) = setup();
        sink.schedule_start(&impulse(), 0.0).unwrap();
        sink.schedule_start(&impulse(), 0.0).unwrap();

        let mut block = [0.0f32; 4];
        mixer.render(&mut block);
        assert!((block[0] - 1.0f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_gain_is_applied() {
        let (mut mixer, mut sink, _clock) = setup();
        sink.set_gain(0.0);
        mixer.gain_smoother.reset(0.0);
        sink.schedule_start(&impulse(), 0.0).unwrap();

        let mut block = [0.0f32; 4];
        mixer.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
        assert_eq!(sink.gain(), 0.0);
    }

    #[test]
    fn test_sink_reports_unavailable_device() {
        let status = AtomicDeviceStatus::new(DeviceStatus::Error);
        let (_mixer, sink) = Mixer::pair(StreamClock::new(48000.0, status));
        assert!(sink.ensure_available().is_err());
    }
}
