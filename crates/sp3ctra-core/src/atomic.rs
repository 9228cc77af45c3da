//! Atomic f32 storage for cross-thread parameter publication.
//!
//! Control threads publish scalar values (master volume, contrast telemetry,
//! filtered IMU samples) that the audio-side threads read every block. An
//! `f32` is carried inside an [`AtomicU32`] via its bit pattern, the same
//! convention the rest of the workspace uses for lock-free float hand-off.

use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` readable and writable from any thread without locking.
///
/// Loads and stores are single atomic operations on the value's bit
/// pattern; there is no read-modify-write cycle, so writers simply
/// overwrite. Use one `AtomicF32` per logically independent scalar.
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    /// Create with an initial value.
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Read the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.bits.load(order))
    }

    /// Publish a new value.
    #[inline]
    pub fn store(&self, value: f32, order: Ordering) {
        self.bits.store(value.to_bits(), order);
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
    fn round_trips_values() {
        let a = AtomicF32::new(0.5);
        assert_eq!(a.load(Ordering::Relaxed), 0.5);

        a.store(-3.25, Ordering::Relaxed);
        assert_eq!(a.load(Ordering::Relaxed), -3.25);
    }

    #[test]
    fn preserves_special_values() {
        let a = AtomicF32::new(0.0);
        a.store(f32::INFINITY, Ordering::Relaxed);
        assert_eq!(a.load(Ordering::Relaxed), f32::INFINITY);

        a.store(-0.0, Ordering::Relaxed);
        assert!(a.load(Ordering::Relaxed).is_sign_negative());
    }

    #[test]
    fn shared_across_threads() {
        use std::sync::Arc;

        let a = Arc::new(AtomicF32::new(0.0));
        let writer = Arc::clone(&a);
        let handle = std::thread::spawn(move || {
            writer.store(1.5, Ordering::Release);
        });
        handle.join().unwrap();
        assert_eq!(a.load(Ordering::Acquire), 1.5);
    }
}
