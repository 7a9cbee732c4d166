// Sound file loading - WAV (hound) and FLAC (claxon)
// Files are decoded to mono f32 at the output sample rate.

use super::{PrepareReport, SoundBuffer, SoundError, SoundProvider};
use crate::audio::format_conversion::int_to_f32;
use crate::sequencer::TimeSignature;
use claxon::FlacReader;
use hound::{SampleFormat, WavReader};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Interleaved samples as read from disk
struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

/// Load a sound file and convert it to a mono buffer at `target_sample_rate`
pub fn load_sound(path: &Path, target_sample_rate: f64) -> Result<SoundBuffer, SoundError> {
    if !target_sample_rate.is_finite() || target_sample_rate <= 0.0 {
        return Err(SoundError::InvalidSampleRate(target_sample_rate));
    }

    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let decoded = match extension.to_lowercase().as_str() {
        "wav" => load_wav(path)?,
        "flac" => load_flac(path)?,
        other => return Err(SoundError::UnsupportedFormat(other.to_string())),
    };

    let mono = downmix(&decoded.samples, decoded.channels);
    if mono.is_empty() {
        return Err(SoundError::Empty(path.to_path_buf()));
    }

    let samples = resample_linear(&mono, decoded.sample_rate as f64, target_sample_rate);
    Ok(SoundBuffer::new(samples, target_sample_rate))
}

fn decode_error(path: &Path, err: impl std::fmt::Display) -> SoundError {
    SoundError::Decode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn load_wav(path: &Path) -> Result<DecodedAudio, SoundError> {
    let reader = WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) => SoundError::Io {
            path: path.to_path_buf(),
            reason: io.to_string(),
        },
        other => decode_error(path, other),
    })?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| decode_error(path, e))?,
        SampleFormat::Int => {
            let bits = u32::from(spec.bits_per_sample);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| int_to_f32(v, bits)))
                .collect::<Result<_, _>>()
                .map_err(|e| decode_error(path, e))?
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: usize::from(spec.channels),
    })
}

fn load_flac(path: &Path) -> Result<DecodedAudio, SoundError> {
    let mut reader = FlacReader::open(path).map_err(|e| decode_error(path, e))?;
    let info = reader.streaminfo();
    let bits = info.bits_per_sample;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| int_to_f32(v, bits)))
        .collect::<Result<_, _>>()
        .map_err(|e| decode_error(path, e))?;

    Ok(DecodedAudio {
        samples,
        sample_rate: info.sample_rate,
        channels: info.channels as usize,
    })
}

/// Average interleaved channels into one
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler; good enough for short clicks
fn resample_linear(input: &[f32], from_rate: f64, to_rate: f64) -> Vec<f32> {
    if input.is_empty() || from_rate <= 0.0 || (from_rate - to_rate).abs() < f64::EPSILON {
        return input.to_vec();
    }

    let ratio = from_rate / to_rate;
    let out_len = ((input.len() as f64) / ratio).round().max(1.0) as usize;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let index = (pos.floor() as usize).min(last);
            let next = (index + 1).min(last);
            let frac = (pos - index as f64) as f32;
            input[index] + (input[next] - input[index]) * frac
        })
        .collect()
}

/// Provider backed by one sound file per beat position
///
/// Beats without a file, or whose file fails to load, stay silent.
#[derive(Debug, Clone, Default)]
pub struct FileSounds {
    paths: BTreeMap<u32, PathBuf>,
    buffers: BTreeMap<u32, SoundBuffer>,
}

impl FileSounds {
    pub fn new(paths: BTreeMap<u32, PathBuf>) -> Self {
        Self {
            paths,
            buffers: BTreeMap::new(),
        }
    }
}

impl SoundProvider for FileSounds {
    fn buffer_for(&self, beat: u32) -> Option<SoundBuffer> {
        self.buffers.get(&beat).cloned()
    }

    fn prepare(
        &mut self,
        _signature: &TimeSignature,
        sample_rate: f64,
    ) -> Result<PrepareReport, SoundError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(SoundError::InvalidSampleRate(sample_rate));
        }

        self.buffers.clear();
        let mut report = PrepareReport::default();
        for (&beat, path) in &self.paths {
            match load_sound(path, sample_rate) {
                Ok(buffer) => {
                    log::debug!(
                        target: "metronome::sound",
                        "Loaded {} for beat {} ({} samples)",
                        path.display(),
                        beat,
                        buffer.len()
                    );
                    self.buffers.insert(beat, buffer);
                    report.loaded.push(beat);
                }
                Err(err) => report.failures.push((beat, err)),
            }
        }
        Ok(report)
    }

    fn name(&self) -> &str {
        "files"
    }
}
