// Click generator - procedural metronome sounds
// Beat 1 gets the accent click; every other beat gets the regular one.

use super::{PrepareReport, SoundBuffer, SoundError, SoundProvider};
use crate::sequencer::TimeSignature;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Frequency, length and level range of generated clicks
///
/// The accent uses the `max_*` values, regular beats the `min_*` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickParams {
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub min_gain: f32,
    pub max_gain: f32,
}

impl Default for ClickParams {
    fn default() -> Self {
        Self {
            min_frequency: 440.0,
            max_frequency: 1760.0,
            min_duration: 0.05,
            max_duration: 0.15,
            min_gain: 0.3,
            max_gain: 0.7,
        }
    }
}

/// Generate one click: a sine with exponential decay
///
/// The envelope falls to 1/e after a third of the click.
fn generate_click(sample_rate: f64, frequency: f64, duration: f64, gain: f32) -> Vec<f32> {
    let num_samples = (sample_rate * duration) as usize;
    let phase_increment = 2.0 * PI * frequency / sample_rate;
    let decay = duration / 3.0;

    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let envelope = (-t / decay).exp();
            ((i as f64 * phase_increment).sin() * envelope) as f32 * gain
        })
        .collect()
}

/// Provider that synthesizes one click per beat of the current signature
#[derive(Debug, Clone, Default)]
pub struct GeneratedClicks {
    params: ClickParams,
    buffers: BTreeMap<u32, SoundBuffer>,
}

impl GeneratedClicks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: ClickParams) -> Self {
        Self {
            params,
            buffers: BTreeMap::new(),
        }
    }

    /// Number of beats that currently have a click
    pub fn prepared_beats(&self) -> usize {
        self.buffers.len()
    }
}

impl SoundProvider for GeneratedClicks {
    fn buffer_for(&self, beat: u32) -> Option<SoundBuffer> {
        self.buffers.get(&beat).cloned()
    }

    fn prepare(
        &mut self,
        signature: &TimeSignature,
        sample_rate: f64,
    ) -> Result<PrepareReport, SoundError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(SoundError::InvalidSampleRate(sample_rate));
        }

        let p = self.params;
        let accent = SoundBuffer::new(
            generate_click(sample_rate, p.max_frequency, p.max_duration, p.max_gain),
            sample_rate,
        );
        let regular = SoundBuffer::new(
            generate_click(sample_rate, p.min_frequency, p.min_duration, p.min_gain),
            sample_rate,
        );

        self.buffers.clear();
        let mut report = PrepareReport::default();
        for beat in 1..=signature.beats_per_measure() {
            let buffer = if beat == 1 { &accent } else { &regular };
            self.buffers.insert(beat, buffer.clone());
            report.loaded.push(beat);
        }

        log::debug!(
            target: "metronome::sound",
            "Generated clicks for {} at {} Hz",
            signature,
            sample_rate
        );
        Ok(report)
    }

    fn is_signature_dependent(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "generated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(buffer: &SoundBuffer) -> f32 {
        buffer.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_click_shape() {
        let click = generate_click(48000.0, 1000.0, 0.1, 0.5);
        assert_eq!(click.len(), 4800);
        assert_eq!(click[0], 0.0);
        assert!(click.iter().all(|s| s.abs() <= 0.5));

        // Decay: the tail is much quieter than the head
        let head = click[..480].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let tail = click[4320..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail < head * 0.1);
    }

    #[test]
    fn test_one_buffer_per_beat_with_accent() {
        let mut clicks = GeneratedClicks::new();
        assert!(clicks.buffer_for(1).is_none());

        let report = clicks
            .prepare(&TimeSignature::three_four(), 48000.0)
            .unwrap();
        assert_eq!(report.loaded, vec![1, 2, 3]);
        assert!(report.is_complete());

        let accent = clicks.buffer_for(1).unwrap();
        let regular = clicks.buffer_for(2).unwrap();
        assert!(clicks.buffer_for(4).is_none());

        assert!((accent.duration() - 0.15).abs() < 1e-3);
        assert!((regular.duration() - 0.05).abs() < 1e-3);
        assert!(peak(&accent) > peak(&regular));
    }

    #[test]
    fn test_reprepare_follows_signature() {
        let mut clicks = GeneratedClicks::new();
        clicks.prepare(&TimeSignature::six_eight(), 44100.0).unwrap();
        assert_eq!(clicks.prepared_beats(), 6);

        clicks.prepare(&TimeSignature::new(2, 4).unwrap(), 44100.0).unwrap();
        assert_eq!(clicks.prepared_beats(), 2);
        assert!(clicks.buffer_for(3).is_none());
        assert!(clicks.is_signature_dependent());
    }

    #[test]
    fn test_invalid_sample_rate() {
        let mut clicks = GeneratedClicks::new();
        assert!(matches!(
            clicks.prepare(&TimeSignature::four_four(), 0.0),
            Err(SoundError::InvalidSampleRate(_))
        ));
    }
}
