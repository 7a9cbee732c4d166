// Master gain shared by the scheduler (writer) and the mixer (reader)

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// f32 stored as its bit pattern in an `AtomicU32`; clones share the value
#[derive(Debug, Clone)]
pub struct AtomicF32 {
    inner: Arc<AtomicU32>,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    pub fn set(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Safe to call from the audio callback
    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32_shared_between_clones() {
        let gain = AtomicF32::new(0.5);
        let audio_side = gain.clone();
        assert_eq!(audio_side.get(), 0.5);

        gain.set(0.25);
        assert_eq!(audio_side.get(), 0.25);
    }
}
