// Tick source - coarse periodic timer driving scheduling passes
// Ticks carry no timing information the scheduler relies on; they only say
// "look at the audio clock again". The timer lives on its own thread so a
// stalled consumer never stalls the timer itself.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Ticks waiting for the consumer; extra ticks are dropped, which coalesces
/// bursts after a consumer stall into a single scheduling pass
pub const TICK_QUEUE_CAPACITY: usize = 4;

/// Opaque timer signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Monotonic sequence number, starting at 1
    pub seq: u64,
    /// Wall-clock instant the timer fired (diagnostics only)
    pub emitted_at: Instant,
}

pub type TickReceiver = Receiver<Tick>;

/// Timer abstraction consumed by the scheduler
///
/// Ticks are delivered on the `TickReceiver` handed out at construction,
/// to exactly one consumer.
pub trait TickSource: Send {
    fn set_interval(&mut self, interval: Duration);
    fn start(&mut self);
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Control messages for the timer thread
#[derive(Debug, Clone, Copy)]
enum TimerControl {
    SetInterval(Duration),
    Start,
    Stop,
    Shutdown,
}

/// Tick source backed by a dedicated timer thread
pub struct ThreadTickSource {
    control_tx: Sender<TimerControl>,
    interval: Duration,
    active: bool,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTickSource {
    /// Spawn the timer thread (initially stopped)
    pub fn spawn(interval: Duration) -> std::io::Result<(Self, TickReceiver)> {
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(TICK_QUEUE_CAPACITY);

        let handle = thread::Builder::new()
            .name("beatkeeper-timer".to_string())
            .spawn(move || run_timer(control_rx, tick_tx, interval))?;

        Ok((
            Self {
                control_tx,
                interval,
                active: false,
                handle: Some(handle),
            },
            tick_rx,
        ))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn send(&self, msg: TimerControl) {
        if self.control_tx.send(msg).is_err() {
            log::warn!(target: "metronome::tick", "timer thread is gone, dropped {:?}", msg);
        }
    }
}

impl TickSource for ThreadTickSource {
    fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
        self.send(TimerControl::SetInterval(interval));
    }

    fn start(&mut self) {
        self.active = true;
        self.send(TimerControl::Start);
    }

    fn stop(&mut self) {
        self.active = false;
        self.send(TimerControl::Stop);
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for ThreadTickSource {
    fn drop(&mut self) {
        let _ = self.control_tx.send(TimerControl::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "metronome::tick", "timer thread panicked");
            }
        }
    }
}

fn run_timer(control_rx: Receiver<TimerControl>, tick_tx: Sender<Tick>, mut interval: Duration) {
    let mut running = false;
    let mut seq = 0u64;
    let mut deadline = Instant::now();

    loop {
        let msg = if running {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match control_rx.recv_timeout(timeout) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        } else {
            match control_rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => return,
            }
        };

        match msg {
            Some(TimerControl::Start) => {
                if !running {
                    running = true;
                    // A restart before the pending deadline keeps it
                    let now = Instant::now();
                    if deadline <= now {
                        deadline = now + interval;
                    }
                }
            }
            Some(TimerControl::Stop) => running = false,
            Some(TimerControl::SetInterval(new_interval)) => {
                interval = new_interval;
                if running {
                    deadline = Instant::now() + interval;
                }
            }
            Some(TimerControl::Shutdown) => return,
            None => {
                seq += 1;
                match tick_tx.try_send(Tick {
                    seq,
                    emitted_at: Instant::now(),
                }) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => return,
                }

                deadline += interval;
                // Skip missed periods instead of bursting after a stall
                let now = Instant::now();
                if deadline < now {
                    deadline = now + interval;
                }
            }
        }
    }
}

#[derive(Debug)]
struct ManualState {
    interval: Duration,
    active: bool,
    starts: usize,
    stops: usize,
    seq: u64,
}

/// Hand-driven tick source for tests and offline rendering
///
/// Clones share state, so a test can keep one clone while the scheduler
/// owns another.
#[derive(Debug, Clone)]
pub struct ManualTickSource {
    state: Arc<Mutex<ManualState>>,
    tick_tx: Sender<Tick>,
}

impl ManualTickSource {
    pub fn new() -> (Self, TickReceiver) {
        let (tick_tx, tick_rx) = crossbeam_channel::unbounded();
        let state = ManualState {
            interval: Duration::from_millis(25),
            active: false,
            starts: 0,
            stops: 0,
            seq: 0,
        };
        (
            Self {
                state: Arc::new(Mutex::new(state)),
                tick_tx,
            },
            tick_rx,
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit one tick if the source is started; returns whether it was sent
    pub fn fire(&self) -> bool {
        let seq = {
            let mut state = self.lock();
            if !state.active {
                return false;
            }
            state.seq += 1;
            state.seq
        };
        self.tick_tx
            .send(Tick {
                seq,
                emitted_at: Instant::now(),
            })
            .is_ok()
    }

    pub fn interval(&self) -> Duration {
        self.lock().interval
    }

    pub fn start_count(&self) -> usize {
        self.lock().starts
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stops
    }
}

impl TickSource for ManualTickSource {
    fn set_interval(&mut self, interval: Duration) {
        self.lock().interval = interval;
    }

    fn start(&mut self) {
        let mut state = self.lock();
        state.active = true;
        state.starts += 1;
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.active = false;
        state.stops += 1;
    }

    fn is_active(&self) -> bool {
        self.lock().active
    }
}
