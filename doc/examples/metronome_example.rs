// Example: rendering the metronome offline
// Drives the scheduler and mixer by hand, the way an audio callback would,
// and prints where each click lands.

use beatkeeper::connection::{AtomicDeviceStatus, DeviceStatus};
use beatkeeper::{
    BeatScheduler, ConfigUpdate, GeneratedClicks, ManualTickSource, MetronomeConfig,
    MetronomeEvent, Mixer, StreamClock, TimeSignature,
};
use std::sync::Arc;

fn main() {
    let sample_rate = 48000.0;
    let buffer_size = 480; // 10 ms

    // The clock counts rendered frames, exactly like the cpal callback does
    let clock = StreamClock::new(sample_rate, AtomicDeviceStatus::new(DeviceStatus::Connected));
    let (mut mixer, sink) = Mixer::pair(clock.clone());
    let (ticks, _tick_rx) = ManualTickSource::new();

    let mut scheduler = BeatScheduler::new(
        MetronomeConfig::default(),
        Arc::new(clock.clone()),
        Box::new(sink),
        Box::new(GeneratedClicks::new()),
        Box::new(ticks),
    )
    .expect("default config is valid");

    let update = ConfigUpdate::new()
        .tempo(90.0)
        .time_signature(TimeSignature::three_four());
    scheduler.start(Some(update)).expect("clock is connected");

    println!("Rendering 4 seconds at 90 BPM, 3/4 time\n");

    let num_buffers = (4.0 * sample_rate / buffer_size as f64) as usize;
    let mut block = vec![0.0f32; buffer_size];

    for _ in 0..num_buffers {
        // Timer tick: schedule everything due within the lookahead window
        scheduler.on_tick();
        for event in scheduler.take_events() {
            if let MetronomeEvent::Beat { beat, measure, time } = event {
                println!(
                    "measure {:2} beat {} -> frame {:6} ({:.3} s)",
                    measure,
                    beat,
                    clock.seconds_to_frames(time),
                    time
                );
            }
        }

        // Audio callback: start due clicks on their exact frame
        mixer.render(&mut block);
    }

    scheduler.stop();
    println!("\nRendered {} frames", clock.current_frame());
}
