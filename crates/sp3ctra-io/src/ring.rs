//! Double-buffered audio hand-off between a producer thread and the
//! real-time callback.
//!
//! Two slots of one interleaved stereo block each, with a per-slot state
//! machine driven by compare-and-swap:
//!
//! ```text
//! Empty --(producer claims)--> Writing --(commit)--> Full
//! Full  --(consumer claims)--> Reading --(release)--> Empty
//! Full  --(producer reclaims, consumer stalled)--> Writing
//! ```
//!
//! The consumer side is wait-free: a single CAS either yields a full slot
//! or reports an underrun. The producer prefers an empty slot and, when the
//! consumer has stalled with both slots full, reclaims the *older* one so
//! the consumer always finds the freshest audio when it returns. Samples
//! are f32 bits in `AtomicU32`; the slot state transitions carry the
//! acquire/release ordering.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const FULL: u8 = 2;
const READING: u8 = 3;

#[derive(Debug)]
struct Slot {
    state: AtomicU8,
    /// Interleaved L/R samples as f32 bits.
    data: Box<[AtomicU32]>,
    /// Producer block counter at commit time.
    timestamp: AtomicU64,
}

impl Slot {
    fn new(samples: usize) -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            data: (0..samples).map(|_| AtomicU32::new(0)).collect(),
            timestamp: AtomicU64::new(0),
        }
    }
}

/// Single-producer single-consumer double-buffered audio ring.
#[derive(Debug)]
pub struct AudioRing {
    slots: [Slot; 2],
    frames_per_block: usize,
    underruns: AtomicU64,
    overwrites: AtomicU64,
}

impl AudioRing {
    /// Create a ring for stereo blocks of `frames_per_block` frames.
    pub fn new(frames_per_block: usize) -> Self {
        let samples = frames_per_block * 2;
        Self {
            slots: [Slot::new(samples), Slot::new(samples)],
            frames_per_block,
            underruns: AtomicU64::new(0),
            overwrites: AtomicU64::new(0),
        }
    }

    /// Frames per block.
    pub fn frames_per_block(&self) -> usize {
        self.frames_per_block
    }

    /// Times the consumer found no ready block.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Times the producer reclaimed an unconsumed block.
    pub fn overwrites(&self) -> u64 {
        self.overwrites.load(Ordering::Relaxed)
    }

    /// True when a slot is free for writing without an overwrite.
    pub fn has_empty_slot(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.state.load(Ordering::Relaxed) == EMPTY)
    }

    /// Producer: claim a slot to write into.
    ///
    /// Prefers an empty slot; with the consumer stalled and both slots
    /// full, reclaims the older one (freshest-audio rule). Returns `None`
    /// only if no slot is claimable, which cannot happen in the
    /// single-producer single-consumer discipline.
    pub fn begin_write(&self) -> Option<WriteSlot<'_>> {
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot
                .state
                .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(WriteSlot { ring: self, idx });
            }
        }

        // No empty slot: reclaim the older FULL slot.
        let t0 = self.slots[0].timestamp.load(Ordering::Relaxed);
        let t1 = self.slots[1].timestamp.load(Ordering::Relaxed);
        let order = if t0 <= t1 { [0, 1] } else { [1, 0] };
        for idx in order {
            if self.slots[idx]
                .state
                .compare_exchange(FULL, WRITING, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.overwrites.fetch_add(1, Ordering::Relaxed);
                return Some(WriteSlot { ring: self, idx });
            }
        }
        None
    }

    /// Consumer: claim the oldest ready block, if any.
    ///
    /// Wait-free: one or two CAS attempts, no spinning. On `None` the
    /// caller outputs silence; the underrun counter is already bumped.
    pub fn try_read(&self) -> Option<ReadSlot<'_>> {
        let t0 = self.slots[0].timestamp.load(Ordering::Relaxed);
        let t1 = self.slots[1].timestamp.load(Ordering::Relaxed);
        let order = if t0 <= t1 { [0, 1] } else { [1, 0] };
        for idx in order {
            if self.slots[idx]
                .state
                .compare_exchange(FULL, READING, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(ReadSlot { ring: self, idx });
            }
        }
        self.underruns.fetch_add(1, Ordering::Relaxed);
        None
    }
}

/// Exclusive write access to one slot.
#[derive(Debug)]
pub struct WriteSlot<'a> {
    ring: &'a AudioRing,
    idx: usize,
}

impl WriteSlot<'_> {
    /// Copy an interleaved stereo block into the slot.
    pub fn fill(&self, interleaved: &[f32]) {
        let slot = &self.ring.slots[self.idx];
        for (i, &sample) in interleaved.iter().enumerate().take(slot.data.len()) {
            slot.data[i].store(sample.to_bits(), Ordering::Relaxed);
        }
    }

    /// Publish the block with the producer's block counter.
    pub fn commit(self, block_index: u64) {
        let slot = &self.ring.slots[self.idx];
        slot.timestamp.store(block_index, Ordering::Relaxed);
        slot.state.store(FULL, Ordering::Release);
    }
}

impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        // Abandoned write (commit never ran): return the slot to Empty.
        let slot = &self.ring.slots[self.idx];
        let _ = slot.state.compare_exchange(
            WRITING,
            EMPTY,
            Ordering::Release,
            Ordering::Relaxed,
        );
    }
}

/// Exclusive read access to one ready slot.
#[derive(Debug)]
pub struct ReadSlot<'a> {
    ring: &'a AudioRing,
    idx: usize,
}

impl ReadSlot<'_> {
    /// Copy the interleaved stereo block out of the slot.
    pub fn copy_to(&self, interleaved: &mut [f32]) {
        let slot = &self.ring.slots[self.idx];
        for (i, out) in interleaved
            .iter_mut()
            .enumerate()
            .take(slot.data.len())
        {
            *out = f32::from_bits(slot.data[i].load(Ordering::Relaxed));
        }
    }

    /// Block counter the producer committed with.
    pub fn block_index(&self) -> u64 {
        self.ring.slots[self.idx].timestamp.load(Ordering::Relaxed)
    }
}

impl Drop for ReadSlot<'_> {
    fn drop(&mut self) {
        self.ring.slots[self.idx]
            .state
            .store(EMPTY, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn write_then_read_round_trips() {
        let ring = AudioRing::new(4);
        let block = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.4, -0.4];

        let w = ring.begin_write().unwrap();
        w.fill(&block);
        w.commit(1);

        let r = ring.try_read().unwrap();
        let mut out = [0.0; 8];
        r.copy_to(&mut out);
        assert_eq!(out, block);
        assert_eq!(r.block_index(), 1);
        drop(r);

        assert_eq!(ring.underruns(), 0);
        assert_eq!(ring.overwrites(), 0);
    }

    #[test]
    fn empty_ring_underruns() {
        let ring = AudioRing::new(4);
        assert!(ring.try_read().is_none());
        assert!(ring.try_read().is_none());
        assert_eq!(ring.underruns(), 2);
    }

    #[test]
    fn stalled_consumer_gets_freshest() {
        let ring = AudioRing::new(2);

        // Producer runs ahead: blocks 1, 2, 3 with no consumer.
        for n in 1..=3u64 {
            let w = ring.begin_write().unwrap();
            w.fill(&[n as f32; 4]);
            w.commit(n);
        }
        // Block 1 was overwritten by block 3.
        assert_eq!(ring.overwrites(), 1);

        // Consumer drains in order and ends on the freshest.
        let r = ring.try_read().unwrap();
        assert_eq!(r.block_index(), 2);
        drop(r);
        let r = ring.try_read().unwrap();
        assert_eq!(r.block_index(), 3);
        let mut out = [0.0; 4];
        r.copy_to(&mut out);
        assert_eq!(out, [3.0; 4]);
    }

    #[test]
    fn abandoned_write_frees_the_slot() {
        let ring = AudioRing::new(2);
        {
            let w = ring.begin_write().unwrap();
            w.fill(&[1.0; 4]);
            // dropped without commit
        }
        assert!(ring.try_read().is_none());
        assert!(ring.has_empty_slot());
    }

    #[test]
    fn concurrent_producer_consumer_never_tears() {
        let ring = Arc::new(AudioRing::new(64));
        let stop = Arc::new(AtomicBool::new(false));

        let producer_ring = Arc::clone(&ring);
        let producer_stop = Arc::clone(&stop);
        let producer = std::thread::spawn(move || {
            let mut block = vec![0.0f32; 128];
            let mut counter = 0u64;
            while !producer_stop.load(Ordering::Relaxed) {
                counter += 1;
                block.fill(counter as f32);
                if let Some(w) = producer_ring.begin_write() {
                    w.fill(&block);
                    w.commit(counter);
                }
            }
        });

        let mut out = vec![0.0f32; 128];
        let mut last_seen = 0u64;
        let mut reads = 0;
        while reads < 5000 {
            if let Some(r) = ring.try_read() {
                r.copy_to(&mut out);
                let index = r.block_index();
                drop(r);

                // Every sample of the block must carry the same counter.
                let first = out[0];
                assert!(out.iter().all(|&x| x == first), "torn block");
                assert_eq!(first as u64, index, "content/index mismatch");
                assert!(index >= last_seen, "time went backwards");
                last_seen = index;
                reads += 1;
            }
        }

        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();
    }
}
