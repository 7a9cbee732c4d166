// Format conversion
//
// Output side: the mixer renders mono f32, which is fanned out to every
// channel of the cpal stream in the device's native sample format.
// Input side: integer PCM read from sound files is scaled to [-1.0, 1.0].
//
// All conversions are allocation-free and suitable for real-time audio callbacks.

use cpal::{FromSample, Sample};

/// Convert a signed integer sample of arbitrary bit depth to f32
///
/// Used for 8/24/32-bit WAV and FLAC data. `bits` must be in 1..=32.
#[inline]
pub fn int_to_f32(sample: i32, bits: u32) -> f32 {
    let bits = bits.clamp(1, 32);
    let full_scale = (1u64 << (bits - 1)) as f64;
    ((sample as f64) / full_scale).clamp(-1.0, 1.0) as f32
}

/// Write a mono sample to every channel of one interleaved frame
///
/// # Arguments
/// * `internal_sample` - The mono f32 sample to write
/// * `output_frame` - A slice representing one audio frame (e.g., [L, R] for stereo)
#[inline]
pub fn write_mono_to_interleaved_frame<T>(internal_sample: f32, output_frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    for channel_sample in output_frame.iter_mut() {
        *channel_sample = Sample::from_sample::<f32>(internal_sample);
    }
}
