//! Lock-free double-buffered pan gains.
//!
//! The preprocessor rewrites per-note stereo gains on every completed line;
//! the additive engine reads them once per block. Two fully allocated
//! buffers alternate: the writer fills the inactive one, then publishes it
//! with a release store of the active pointer. A reader that loaded the
//! pointer keeps indexing the same buffer for its whole block, so it can
//! never observe a half-updated left/right pair. Staleness is bounded by
//! one block.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// One buffer of per-note stereo gains.
///
/// Values are f32 bits inside `AtomicU32`, the workspace's convention for
/// lock-free float arrays.
#[derive(Debug)]
pub struct GainBuffer {
    left: Box<[AtomicU32]>,
    right: Box<[AtomicU32]>,
}

impl GainBuffer {
    fn new(notes: usize, initial: f32) -> Self {
        let make = || {
            (0..notes)
                .map(|_| AtomicU32::new(initial.to_bits()))
                .collect()
        };
        Self {
            left: make(),
            right: make(),
        }
    }

    /// Left gain for note `i`.
    #[inline]
    pub fn left(&self, i: usize) -> f32 {
        f32::from_bits(self.left[i].load(Ordering::Relaxed))
    }

    /// Right gain for note `i`.
    #[inline]
    pub fn right(&self, i: usize) -> f32 {
        f32::from_bits(self.right[i].load(Ordering::Relaxed))
    }

    /// Notes in the table.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// True when the table has no notes.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Double-buffered pan gains with an atomic active pointer.
#[derive(Debug)]
pub struct PanGainsTable {
    buffers: [Arc<GainBuffer>; 2],
    active: ArcSwap<GainBuffer>,
    /// Index of the buffer currently published. Only the single writer
    /// toggles it.
    active_index: AtomicUsize,
}

impl PanGainsTable {
    /// Allocate both buffers, initialized to center gains.
    pub fn new(notes: usize) -> Self {
        let center = core::f32::consts::FRAC_1_SQRT_2;
        let buffers = [
            Arc::new(GainBuffer::new(notes, center)),
            Arc::new(GainBuffer::new(notes, center)),
        ];
        let active = ArcSwap::from(Arc::clone(&buffers[0]));
        Self {
            buffers,
            active,
            active_index: AtomicUsize::new(0),
        }
    }

    /// Notes in the table.
    pub fn notes(&self) -> usize {
        self.buffers[0].len()
    }

    /// Publish a new gain set (single writer).
    ///
    /// Writes land in the inactive buffer, then the active pointer swings
    /// over with release ordering. If a slow reader still pins the inactive
    /// buffer, the update is skipped and `false` returned; gains stay one
    /// line stale and the next line retries. A reader can therefore never
    /// observe a buffer being written.
    pub fn write(&self, left: &[f32], right: &[f32]) -> bool {
        let idx = 1 - self.active_index.load(Ordering::Relaxed);
        let target = &self.buffers[idx];
        // Inactive buffer is referenced only by `self.buffers` unless a
        // reader's snapshot from before the last swap is still alive.
        if Arc::strong_count(target) != 1 {
            return false;
        }
        let n = target.len().min(left.len());
        for i in 0..n {
            target.left[i].store(left[i].to_bits(), Ordering::Relaxed);
            target.right[i].store(right[i].to_bits(), Ordering::Relaxed);
        }
        self.active.store(Arc::clone(target));
        self.active_index.store(idx, Ordering::Relaxed);
        true
    }

    /// Load the active buffer for one block of reads.
    ///
    /// Wait-free; the returned `Arc` pins the buffer so concurrent writes
    /// go to the other one.
    #[inline]
    pub fn load(&self) -> Arc<GainBuffer> {
        self.active.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_to_center() {
        let table = PanGainsTable::new(8);
        let gains = table.load();
        for i in 0..8 {
            assert!((gains.left(i) - core::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
            assert!((gains.right(i) - core::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let table = PanGainsTable::new(4);
        assert!(table.write(&[0.1, 0.2, 0.3, 0.4], &[0.9, 0.8, 0.7, 0.6]));
        let gains = table.load();
        assert_eq!(gains.left(0), 0.1);
        assert_eq!(gains.right(3), 0.6);
    }

    #[test]
    fn held_snapshot_survives_writes() {
        let table = PanGainsTable::new(2);
        assert!(table.write(&[0.25, 0.25], &[0.75, 0.75]));
        let snapshot = table.load();

        // Next write toggles to the other buffer.
        assert!(table.write(&[0.5, 0.5], &[0.5, 0.5]));
        // This one would land in the pinned buffer and must be refused.
        assert!(!table.write(&[0.6, 0.6], &[0.4, 0.4]));
        assert_eq!(snapshot.left(0), 0.25, "held snapshot must stay intact");

        drop(snapshot);
        assert!(table.write(&[0.6, 0.6], &[0.4, 0.4]));
    }

    #[test]
    fn concurrent_reader_sees_consistent_pairs() {
        use std::sync::atomic::AtomicBool;

        let table = Arc::new(PanGainsTable::new(64));
        let stop = Arc::new(AtomicBool::new(false));

        let writer_table = Arc::clone(&table);
        let writer_stop = Arc::clone(&stop);
        let writer = std::thread::spawn(move || {
            let mut toggle = false;
            while !writer_stop.load(Ordering::Relaxed) {
                // Each write keeps left + right == 1.0 per note.
                let value = if toggle { 0.3 } else { 0.8 };
                let left = vec![value; 64];
                let right = vec![1.0 - value; 64];
                writer_table.write(&left, &right);
                toggle = !toggle;
            }
        });

        for _ in 0..2000 {
            let gains = table.load();
            for i in 0..64 {
                let sum = gains.left(i) + gains.right(i);
                assert!(
                    (sum - 1.0).abs() < 1e-5 || sum == 2.0 * core::f32::consts::FRAC_1_SQRT_2,
                    "torn pair: sum {}",
                    sum
                );
            }
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }
}
