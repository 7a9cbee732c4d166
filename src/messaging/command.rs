// Command types - scheduler → audio thread

use crate::sound::SoundBuffer;

#[derive(Debug, Clone)]
pub enum SinkCommand {
    /// Start `sound` when the output reaches `start_frame`
    Play { sound: SoundBuffer, start_frame: u64 },
}
