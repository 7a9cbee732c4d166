// Audio engine - real-time cpal callback
//
// # Format Support
//
// The engine supports several device sample formats:
// - **F32**: 32-bit floating point (native, no conversion needed)
// - **I16**: signed 16-bit integer (common on Windows/WASAPI)
// - **U16**: unsigned 16-bit integer (less common)
//
// The mixer always renders mono f32; conversion to the device format happens
// when writing the interleaved output buffer, without allocation.
//
// # Stream Limitations
//
// On macOS (CoreAudio) the Stream is neither Send nor Sync, so the engine has
// to stay on the thread that created it. Stream errors flip the device status
// to `Error`, which makes the clock refuse to start new playback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::Sender;

use crate::audio::AudioError;
use crate::audio::format_conversion::write_mono_to_interleaved_frame;
use crate::audio::mixer::Mixer;
use crate::audio::sink::MixerSink;
use crate::audio::timing::StreamClock;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::messaging::notification::{Notification, NotificationCategory};

/// Frames rendered per mixer call; larger device buffers are split
const RENDER_CHUNK_FRAMES: usize = 1024;

pub struct AudioEngine {
    _device: Device,
    _stream: Stream,
    sample_rate: f64,
    channels: usize,
    clock: StreamClock,
    status: AtomicDeviceStatus,
}

impl AudioEngine {
    /// Open the default output device and start streaming
    ///
    /// Returns the engine (keep it alive for as long as sound should play)
    /// and the sink the scheduler submits clicks to.
    pub fn start(
        diagnostics: Option<Sender<Notification>>,
    ) -> Result<(Self, MixerSink), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        log::info!(
            target: "metronome::audio",
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;

        let sample_format = supported_config.sample_format();
        log::debug!(target: "metronome::audio", "Audio config: {:?}", supported_config);

        let sample_rate = supported_config.sample_rate().0 as f64;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        // Connected only once the stream is playing
        let status = AtomicDeviceStatus::new(DeviceStatus::Connecting);
        let clock = StreamClock::new(sample_rate, status.clone());
        let (mixer, sink) = Mixer::pair(clock.clone());

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, channels, mixer, status.clone(), diagnostics.clone())
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, channels, mixer, status.clone(), diagnostics.clone())
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, channels, mixer, status.clone(), diagnostics.clone())
            }
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream.play().map_err(|e| {
            status.set(DeviceStatus::Error);
            AudioError::Stream(e.to_string())
        })?;
        status.set(DeviceStatus::Connected);

        log::info!(
            target: "metronome::audio",
            "Audio engine started: {} Hz, {} channels",
            sample_rate,
            channels
        );
        if let Some(tx) = &diagnostics {
            let _ = tx.try_send(Notification::info(
                NotificationCategory::Audio,
                format!("Audio connected: {} Hz", sample_rate),
            ));
        }

        Ok((
            Self {
                _device: device,
                _stream: stream,
                sample_rate,
                channels,
                clock,
                status,
            },
            sink,
        ))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Clock advanced by this engine's callback
    pub fn clock(&self) -> StreamClock {
        self.clock.clone()
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    /// Build an output stream for any supported sample type
    ///
    /// The mixer renders f32 internally and the result is converted to `T`.
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut mixer: Mixer,
        status: AtomicDeviceStatus,
        diagnostics: Option<Sender<Notification>>,
    ) -> Result<Stream, AudioError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let mut scratch = vec![0.0f32; RENDER_CHUNK_FRAMES];
        let channels = channels.max(1);

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // ========== SACRED ZONE ==========
                    // No allocations, No I/O, No blocking locks
                    for chunk in data.chunks_mut(RENDER_CHUNK_FRAMES * channels) {
                        let frames = chunk.len() / channels;
                        let mono = &mut scratch[..frames];
                        mixer.render(mono);
                        for (frame, sample) in chunk.chunks_mut(channels).zip(mono.iter()) {
                            write_mono_to_interleaved_frame(*sample, frame);
                        }
                    }
                    // ========== SACRED ZONE END ==========
                },
                move |err| {
                    // Runs outside the audio callback, so logging is fine here
                    log::error!(target: "metronome::audio", "Audio stream error: {}", err);
                    status.set(DeviceStatus::Error);
                    if let Some(tx) = &diagnostics {
                        let _ = tx.try_send(Notification::error(
                            NotificationCategory::Audio,
                            format!("Audio stream error: {}", err),
                        ));
                    }
                },
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))
    }
}
