// Beat scheduler - lookahead scheduling of metronome clicks
//
// Timer ticks are coarse and jittery; the audio clock is not. On every tick
// the scheduler looks `lookahead_window` seconds ahead on the audio clock and
// submits every beat that falls inside that window to the sink with its exact
// start time. Tick jitter therefore never reaches the audible timing.

use super::SchedulerError;
use super::config::{ConfigUpdate, MetronomeConfig};
use super::events::MetronomeEvent;
use super::tick::TickSource;
use super::timeline::{Tempo, TimeSignature};
use crate::audio::{AudioClock, AudioError, SoundSink};
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::sound::{FileSounds, GeneratedClicks, SoundProvider};
use crossbeam_channel::Sender;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

/// Gap between `start` and the first beat, so the first note is never
/// scheduled in the past (seconds)
pub const START_DELAY: f64 = 0.05;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
}

/// A beat submitted to the sink, kept until its time has passed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    /// 1-based position in the measure
    pub beat: u32,
    pub measure: u64,
    /// Audio clock time the note starts at
    pub time: f64,
    /// False when the beat had no buffer or the sink refused it
    pub audible: bool,
}

/// Position of the scheduler in musical time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatCursor {
    /// Beat the next note will carry, in 1..=beats_per_measure
    pub beat_count: u32,
    pub measure_count: u64,
    /// Audio time of the next note to schedule
    pub next_note_time: f64,
    pub seconds_per_beat: f64,
    /// Audio time of the most recently scheduled note
    pub last_scheduled: Option<f64>,
}

impl BeatCursor {
    pub fn new(seconds_per_beat: f64) -> Self {
        Self {
            beat_count: 1,
            measure_count: 0,
            next_note_time: 0.0,
            seconds_per_beat,
            last_scheduled: None,
        }
    }

    /// Move to the following beat, wrapping into the next measure
    fn advance(&mut self, beats_per_measure: u32) {
        self.last_scheduled = Some(self.next_note_time);
        self.next_note_time += self.seconds_per_beat;
        self.beat_count += 1;
        if self.beat_count > beats_per_measure {
            self.beat_count = 1;
            self.measure_count += 1;
        }
    }

    /// Bring the beat back into a shorter measure: beat 1 of the next one
    fn clamp_to(&mut self, beats_per_measure: u32) {
        if self.beat_count > beats_per_measure {
            self.beat_count = 1;
            self.measure_count += 1;
        }
    }
}

/// What the current sound buffers were prepared for
#[derive(Debug, Clone, Copy, PartialEq)]
struct PreparedFor {
    time_signature: TimeSignature,
    sample_rate: f64,
}

/// The metronome state machine
///
/// Single-threaded by itself: the owner calls `on_tick` whenever the tick
/// source fires and drains emitted events with `take_events`. `Metronome`
/// wraps it for multi-threaded use.
pub struct BeatScheduler {
    config: MetronomeConfig,
    state: RunState,
    cursor: BeatCursor,
    queue: VecDeque<ScheduledNote>,
    clock: Arc<dyn AudioClock>,
    sink: Box<dyn SoundSink>,
    provider: Box<dyn SoundProvider>,
    ticks: Box<dyn TickSource>,
    /// `None` until buffers are ready; ticks are ignored meanwhile
    prepared: Option<PreparedFor>,
    outbox: Vec<MetronomeEvent>,
    diagnostics: Option<Sender<Notification>>,
}

impl BeatScheduler {
    pub fn new(
        config: MetronomeConfig,
        clock: Arc<dyn AudioClock>,
        sink: Box<dyn SoundSink>,
        provider: Box<dyn SoundProvider>,
        mut ticks: Box<dyn TickSource>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        ticks.set_interval(config.tick_interval());

        Ok(Self {
            cursor: BeatCursor::new(config.seconds_per_beat()),
            config,
            state: RunState::Idle,
            queue: VecDeque::new(),
            clock,
            sink,
            provider,
            ticks,
            prepared: None,
            outbox: Vec::new(),
            diagnostics: None,
        })
    }

    /// Route non-fatal problems (silent beats, late ticks) to `tx`
    pub fn set_diagnostics(&mut self, tx: Option<Sender<Notification>>) {
        self.diagnostics = tx;
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Copy of the current configuration
    pub fn get_config(&self) -> MetronomeConfig {
        self.config.clone()
    }

    pub fn cursor(&self) -> BeatCursor {
        self.cursor
    }

    /// Notes submitted to the sink whose time has not passed yet
    pub fn queued_notes(&self) -> &VecDeque<ScheduledNote> {
        &self.queue
    }

    pub fn sound_source_name(&self) -> &str {
        self.provider.name()
    }

    /// Events emitted since the last call, in emission order
    pub fn take_events(&mut self) -> Vec<MetronomeEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, event: MetronomeEvent) {
        self.outbox.push(event);
    }

    fn report_warning(&self, category: NotificationCategory, message: String) {
        log::warn!(target: "metronome::scheduler", "{}", message);
        if let Some(tx) = &self.diagnostics {
            let _ = tx.try_send(Notification::warning(category, message));
        }
    }

    fn ensure_output(&self) -> Result<(), AudioError> {
        self.clock.ensure_running()?;
        self.sink.ensure_available()
    }

    /// Load or generate buffers for the current signature
    ///
    /// Failures only silence the affected beats.
    fn prepare_sounds(&mut self) {
        let time_signature = self.config.time_signature;
        let sample_rate = self.clock.sample_rate();

        match self.provider.prepare(&time_signature, sample_rate) {
            Ok(report) => {
                log::debug!(
                    target: "metronome::scheduler",
                    "Prepared {} sounds: {} loaded, {} failed",
                    self.provider.name(),
                    report.loaded.len(),
                    report.failures.len()
                );
                for (beat, err) in report.failures {
                    self.report_warning(
                        NotificationCategory::Sound,
                        format!("Beat {} will be silent: {}", beat, err),
                    );
                }
            }
            Err(err) => self.report_warning(
                NotificationCategory::Sound,
                format!("Could not prepare {} sounds, all beats silent: {}", self.provider.name(), err),
            ),
        }

        self.prepared = Some(PreparedFor {
            time_signature,
            sample_rate,
        });
    }

    fn buffers_current(&self) -> bool {
        match self.prepared {
            None => false,
            Some(prepared) => {
                prepared.sample_rate == self.clock.sample_rate()
                    && (!self.provider.is_signature_dependent()
                        || prepared.time_signature == self.config.time_signature)
            }
        }
    }

    /// Begin a new session, optionally overriding parts of the configuration
    ///
    /// An invalid update is rejected before anything changes. If the output
    /// is unavailable the scheduler ends up `Idle`.
    pub fn start(&mut self, update: Option<ConfigUpdate>) -> Result<(), SchedulerError> {
        let config = match &update {
            Some(update) => update.merge_into(&self.config)?,
            None => self.config.clone(),
        };

        if self.state == RunState::Running {
            self.stop();
        }

        if let Err(err) = self.ensure_output() {
            log::warn!(target: "metronome::scheduler", "Cannot start: {}", err);
            if self.state != RunState::Idle {
                self.stop();
            }
            return Err(err.into());
        }

        self.config = config;
        self.cursor = BeatCursor::new(self.config.seconds_per_beat());
        self.queue.clear();
        self.sink.set_gain(self.config.volume);

        if !self.buffers_current() {
            self.prepare_sounds();
        }

        self.cursor.next_note_time = self.clock.now() + START_DELAY;
        self.ticks.set_interval(self.config.tick_interval());
        self.ticks.start();
        self.state = RunState::Running;

        log::info!(
            target: "metronome::scheduler",
            "Started at {} in {} ({:.3} s per measure)",
            self.config.tempo,
            self.config.time_signature,
            self.config.tempo.measure_duration_seconds(&self.config.time_signature)
        );
        self.emit(MetronomeEvent::Start {
            time: self.cursor.next_note_time,
            resumed: false,
        });
        Ok(())
    }

    /// Suspend scheduling, keeping the beat position
    pub fn pause(&mut self) {
        if self.state != RunState::Running {
            return;
        }
        self.ticks.stop();
        self.state = RunState::Paused;
        log::info!(target: "metronome::scheduler", "Paused");
        self.emit(MetronomeEvent::Pause {
            beat: self.cursor.beat_count,
            measure: self.cursor.measure_count,
        });
    }

    /// Continue a paused session from where it stopped
    ///
    /// If the output is unavailable the scheduler stays `Paused`.
    pub fn resume(&mut self) -> Result<(), SchedulerError> {
        if self.state != RunState::Paused {
            return Ok(());
        }
        self.ensure_output()?;

        if !self.buffers_current() {
            self.prepare_sounds();
        }

        let earliest = self.clock.now() + START_DELAY;
        self.cursor.next_note_time = self.cursor.next_note_time.max(earliest);
        self.ticks.start();
        self.state = RunState::Running;

        log::info!(target: "metronome::scheduler", "Resumed");
        self.emit(MetronomeEvent::Start {
            time: self.cursor.next_note_time,
            resumed: true,
        });
        Ok(())
    }

    /// End the session and rewind to beat 1 of measure 0
    ///
    /// Already submitted notes are not revoked.
    pub fn stop(&mut self) {
        if self.state == RunState::Idle {
            return;
        }
        self.ticks.stop();
        self.cursor.beat_count = 1;
        self.cursor.measure_count = 0;
        self.cursor.last_scheduled = None;
        self.queue.clear();
        self.state = RunState::Idle;
        log::info!(target: "metronome::scheduler", "Stopped");
        self.emit(MetronomeEvent::Stop);
    }

    /// Change the tempo; non-positive or non-finite values change nothing
    ///
    /// While running, the next beat lands one new beat length after the last
    /// scheduled one, but never earlier than `START_DELAY` from now.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), SchedulerError> {
        let tempo = Tempo::new(bpm)?;
        self.config.tempo = tempo;
        self.cursor.seconds_per_beat = tempo.seconds_per_beat();

        match self.state {
            RunState::Running => {
                let earliest = self.clock.now() + START_DELAY;
                self.cursor.next_note_time = match self.cursor.last_scheduled {
                    Some(last) => (last + self.cursor.seconds_per_beat).max(earliest),
                    None => earliest,
                };
            }
            RunState::Paused => {
                if let Some(last) = self.cursor.last_scheduled {
                    self.cursor.next_note_time = last + self.cursor.seconds_per_beat;
                }
            }
            RunState::Idle => {}
        }

        log::debug!(target: "metronome::scheduler", "Tempo set to {}", tempo);
        Ok(())
    }

    /// Change the meter
    ///
    /// The signature, the cursor and any signature-dependent sounds are
    /// updated in one `&mut self` call, so no scheduling pass can observe a
    /// partial change. The tick source keeps running and keeps its phase.
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        let beats = time_signature.beats_per_measure();

        self.config.time_signature = time_signature;
        self.cursor.clamp_to(beats);

        if self.provider.is_signature_dependent() {
            if self.state == RunState::Running {
                self.prepare_sounds();
            } else {
                self.prepared = None;
            }
        }

        log::debug!(target: "metronome::scheduler", "Time signature set to {}", time_signature);
    }

    /// Validating variant of `set_time_signature` for untyped input
    pub fn set_time_signature_parts(&mut self, parts: &[u32]) -> Result<(), SchedulerError> {
        let time_signature = TimeSignature::from_parts(parts)?;
        self.set_time_signature(time_signature);
        Ok(())
    }

    /// Swap the sound provider, keeping the beat position
    pub fn set_sound_source(&mut self, provider: Box<dyn SoundProvider>) {
        self.provider = provider;
        self.prepared = None;

        if self.state == RunState::Running {
            self.prepare_sounds();
        }

        log::info!(target: "metronome::scheduler", "Sound source set to {}", self.provider.name());
    }

    /// Switch to procedurally generated clicks
    pub fn use_generated_sounds(&mut self) {
        self.set_sound_source(Box::new(GeneratedClicks::new()));
    }

    /// Switch to one sound file per beat position
    pub fn set_click_sounds(&mut self, sounds: BTreeMap<u32, PathBuf>) {
        self.set_sound_source(Box::new(FileSounds::new(sounds)));
    }

    /// Set the output level, clamped to [0, 1]
    pub fn set_volume(&mut self, level: f32) -> Result<(), SchedulerError> {
        if level.is_nan() {
            return Err(SchedulerError::InvalidVolume(level));
        }
        let level = level.clamp(0.0, 1.0);
        self.config.volume = level;
        self.sink.set_gain(level);
        Ok(())
    }

    /// Run one scheduling pass; returns the number of notes scheduled
    pub fn on_tick(&mut self) -> usize {
        if self.state != RunState::Running || self.prepared.is_none() {
            return 0;
        }

        let now = self.clock.now();
        while self.queue.front().is_some_and(|note| note.time < now) {
            self.queue.pop_front();
        }

        if self.cursor.next_note_time < now {
            // The pass came later than the whole lookahead window
            let late = now - self.cursor.next_note_time;
            self.report_warning(
                NotificationCategory::Scheduler,
                format!("Scheduling fell behind by {:.3} s, re-anchoring", late),
            );
            self.cursor.next_note_time = now + START_DELAY;
        }

        let horizon = now + self.config.lookahead_window;
        let beats = self.config.time_signature.beats_per_measure();
        let mut scheduled = 0;

        while self.cursor.next_note_time < horizon {
            self.schedule_current_beat();
            self.cursor.advance(beats);
            scheduled += 1;
        }

        if scheduled > 0 {
            log::trace!(
                target: "metronome::scheduler",
                "Scheduled {} notes, next at {:.3}",
                scheduled,
                self.cursor.next_note_time
            );
        }
        scheduled
    }

    fn schedule_current_beat(&mut self) {
        let beat = self.cursor.beat_count;
        let measure = self.cursor.measure_count;
        let time = self.cursor.next_note_time;

        let audible = match self.provider.buffer_for(beat) {
            Some(buffer) => match self.sink.schedule_start(&buffer, time) {
                Ok(()) => true,
                Err(err) => {
                    self.report_warning(
                        NotificationCategory::Audio,
                        format!("Beat {} at {:.3} dropped by sink: {}", beat, time, err),
                    );
                    false
                }
            },
            None => {
                log::trace!(target: "metronome::scheduler", "No sound for beat {}", beat);
                false
            }
        };

        self.queue.push_back(ScheduledNote {
            beat,
            measure,
            time,
            audible,
        });
        self.emit(MetronomeEvent::Beat {
            beat,
            measure,
            time,
        });
        if beat == 1 {
            self.emit(MetronomeEvent::Measure { measure, time });
        }
    }
}
