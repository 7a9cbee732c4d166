// Click sounds loaded from disk

mod common;

use beatkeeper::{
    ConfigUpdate, FileSounds, Notification, NotificationCategory, NotificationLevel, SoundError,
    SoundProvider, TimeSignature,
};
use common::harness;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn write_int16_stereo(path: &Path, frames: usize, sample_rate: u32) {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let v = if i % 2 == 0 { 8192i16 } else { -8192 };
        writer.write_sample(v).unwrap();
        writer.write_sample(v).unwrap();
    }
    writer.finalize().unwrap();
}

fn write_float_mono(path: &Path, frames: usize, sample_rate: u32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((i as f32 / frames as f32) - 0.5).unwrap();
    }
    writer.finalize().unwrap();
}

struct ClickDir {
    _dir: tempfile::TempDir,
    paths: BTreeMap<u32, PathBuf>,
}

/// Beat 1: int16 stereo at 24 kHz, beat 2: float mono at 48 kHz,
/// beat 3: not a WAV file, beat 4: no file
fn click_dir() -> ClickDir {
    let dir = tempfile::tempdir().unwrap();
    let accent = dir.path().join("accent.wav");
    let regular = dir.path().join("regular.wav");
    let broken = dir.path().join("broken.wav");

    write_int16_stereo(&accent, 100, 24000);
    write_float_mono(&regular, 50, 48000);
    std::fs::write(&broken, b"definitely not RIFF").unwrap();

    let paths = BTreeMap::from([(1, accent), (2, regular), (3, broken)]);
    ClickDir { _dir: dir, paths }
}

#[test]
fn test_file_sounds_prepare_reports_each_beat() {
    let clicks = click_dir();
    let mut sounds = FileSounds::new(clicks.paths.clone());

    let report = sounds.prepare(&TimeSignature::four_four(), 48000.0).unwrap();
    assert_eq!(report.loaded, vec![1, 2]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, 3);
    assert!(matches!(report.failures[0].1, SoundError::Decode { .. }));
    assert!(!report.is_complete());

    // Stereo averaged to mono and upsampled 2x
    let accent = sounds.buffer_for(1).unwrap();
    assert_eq!(accent.len(), 200);
    assert_eq!(accent.sample_rate(), 48000.0);
    assert!((accent.samples()[0] - 0.25).abs() < 1e-3);

    assert_eq!(sounds.buffer_for(2).unwrap().len(), 50);
    assert!(sounds.buffer_for(3).is_none());
    assert!(sounds.buffer_for(4).is_none());
}

#[test]
fn test_missing_file_is_an_io_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut sounds = FileSounds::new(BTreeMap::from([(1, dir.path().join("gone.wav"))]));

    let report = sounds.prepare(&TimeSignature::four_four(), 44100.0).unwrap();
    assert!(report.loaded.is_empty());
    assert!(matches!(report.failures[0].1, SoundError::Io { .. }));
}

#[test]
fn test_scheduler_plays_loaded_files_and_silences_the_rest() {
    let clicks = click_dir();
    let mut h = harness(2.0, Box::new(FileSounds::new(BTreeMap::new())));
    let (diag_tx, diag_rx) = crossbeam_channel::unbounded::<Notification>();
    h.scheduler.set_diagnostics(Some(diag_tx));

    h.scheduler.set_click_sounds(clicks.paths.clone());
    assert_eq!(h.scheduler.sound_source_name(), "files");

    h.scheduler
        .start(Some(ConfigUpdate::new().lookahead_window(2.0)))
        .unwrap();
    assert_eq!(h.scheduler.on_tick(), 4);

    let audible: Vec<bool> = h.scheduler.queued_notes().iter().map(|n| n.audible).collect();
    assert_eq!(audible, vec![true, true, false, false]);

    let lengths: Vec<usize> = h.submitted.lock().unwrap().iter().map(|(_, len)| *len).collect();
    assert_eq!(lengths, vec![200, 50]);

    let warning = diag_rx.try_recv().unwrap();
    assert_eq!(warning.level, NotificationLevel::Warning);
    assert_eq!(warning.category, NotificationCategory::Sound);
    assert!(warning.message.contains("Beat 3"));
}
