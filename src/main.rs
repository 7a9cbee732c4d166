use beatkeeper::messaging::notification::{Notification, NotificationLevel};
use beatkeeper::{
    AudioEngine, EventKind, GeneratedClicks, Metronome, MetronomeConfig, MetronomeEvent,
};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

// Diagnostics are best-effort; a full channel drops the newest message
const DIAGNOSTICS_CAPACITY: usize = 64;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("=== Beatkeeper ===");
    println!("Version {}\n", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => MetronomeConfig::load(Path::new(&path))?,
        None => MetronomeConfig::default(),
    };

    let (diagnostics_tx, diagnostics_rx) = crossbeam_channel::bounded::<Notification>(DIAGNOSTICS_CAPACITY);
    std::thread::Builder::new()
        .name("beatkeeper-diagnostics".to_string())
        .spawn(move || {
            for notification in diagnostics_rx.iter() {
                match notification.level {
                    NotificationLevel::Error => log::error!("{}", notification),
                    NotificationLevel::Warning => log::warn!("{}", notification),
                    NotificationLevel::Info => log::info!("{}", notification),
                }
            }
        })?;

    let (engine, sink) = AudioEngine::start(Some(diagnostics_tx.clone()))?;

    let metronome = Metronome::with_thread_timer(
        config,
        Arc::new(engine.clock()),
        Box::new(sink),
        Box::new(GeneratedClicks::new()),
    )?;
    metronome.set_diagnostics(Some(diagnostics_tx));

    metronome.subscribe(EventKind::Beat, |event| {
        if let MetronomeEvent::Beat { beat, measure, time } = event {
            log::info!("beat {} of measure {} at {:.3}s", beat, measure, time);
        }
    });
    metronome.subscribe(EventKind::Measure, |event| {
        if let MetronomeEvent::Measure { measure, .. } = event {
            log::debug!("measure {}", measure);
        }
    });

    metronome.start(None)?;
    let config = metronome.get_config();
    println!(
        "Playing {} in {} on {} Hz, {}-channel output. Press Enter to stop.",
        config.tempo,
        config.time_signature,
        engine.sample_rate(),
        engine.channels()
    );

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    metronome.stop();
    metronome.sync_events();
    Ok(())
}
