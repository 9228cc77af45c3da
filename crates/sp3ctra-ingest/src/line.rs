//! Line double-buffer and fragment reassembly.
//!
//! Image lines arrive as up to 64 UDP fragments. The network thread
//! assembles them into one of two slots; when a line completes, that slot
//! is atomically promoted to the read slot. Audio-side readers acquire the
//! read slot without blocking and always observe a fully assembled line.
//!
//! Ownership discipline (single-writer): the assembler's bookkeeping
//! (current line id, fragment bitset) is owned exclusively by the network
//! thread. Slot bytes are `AtomicU8` so cross-thread access is data-race
//! free without any `unsafe`; publication order is guaranteed by the
//! release store of the read index.

use crate::packet::ImageFragment;
use crate::stats::IngestStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};

/// One slot: three parallel channels of `pixel_count` bytes.
#[derive(Debug)]
struct LineSlot {
    r: Box<[AtomicU8]>,
    g: Box<[AtomicU8]>,
    b: Box<[AtomicU8]>,
}

impl LineSlot {
    fn new(pixel_count: usize) -> Self {
        let make = || (0..pixel_count).map(|_| AtomicU8::new(0)).collect();
        Self {
            r: make(),
            g: make(),
            b: make(),
        }
    }
}

/// Errors from [`LineDoubleBuffer::start_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// Another writer currently holds the write slot.
    #[error("write slot already held by another writer")]
    BusyWriter,
}

/// Double-buffered storage for the most recent complete scanner line.
///
/// Exactly one slot is the read slot at any instant; the other is the
/// write slot. Readers never see a line between `start_write` and
/// `publish`. A disconnected producer leaves the last good line readable
/// indefinitely.
#[derive(Debug)]
pub struct LineDoubleBuffer {
    slots: [LineSlot; 2],
    read_index: AtomicUsize,
    writer_claimed: AtomicBool,
    /// Bumped on every publish; readers use it for staleness checks.
    sequence: AtomicU64,
    pixel_count: usize,
}

impl LineDoubleBuffer {
    /// Allocate both slots for lines of `pixel_count` pixels.
    pub fn new(pixel_count: usize) -> Self {
        Self {
            slots: [LineSlot::new(pixel_count), LineSlot::new(pixel_count)],
            read_index: AtomicUsize::new(0),
            writer_claimed: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            pixel_count,
        }
    }

    /// Pixels per line.
    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Number of lines published so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Claim exclusive write access to the non-read slot.
    ///
    /// Single-writer is the expected case; a second concurrent claim fails
    /// with [`WriteError::BusyWriter`]. Dropping the guard without
    /// publishing discards the partial line.
    pub fn start_write(self: &Arc<Self>) -> Result<WriteGuard, WriteError> {
        if self
            .writer_claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(WriteError::BusyWriter);
        }
        // The read index only moves on publish, and only the claim holder
        // publishes, so the write slot is stable for the guard's lifetime.
        let slot = 1 - self.read_index.load(Ordering::Acquire);
        Ok(WriteGuard {
            buffer: Arc::clone(self),
            slot,
        })
    }

    /// Acquire the current read slot.
    ///
    /// Never blocks, never allocates. The view stays coherent as long as
    /// the reader finishes with it before two further lines are published
    /// (one block, in practice).
    pub fn read(&self) -> LineView<'_> {
        let slot = &self.slots[self.read_index.load(Ordering::Acquire)];
        LineView {
            r: &slot.r,
            g: &slot.g,
            b: &slot.b,
        }
    }
}

/// Exclusive write access to the non-read slot.
#[derive(Debug)]
pub struct WriteGuard {
    buffer: Arc<LineDoubleBuffer>,
    slot: usize,
}

impl WriteGuard {
    /// Write channel bytes at `offset`. Out-of-bounds tails are clipped.
    pub fn write_channels(&self, offset: usize, r: &[u8], g: &[u8], b: &[u8]) {
        let slot = &self.buffer.slots[self.slot];
        let end = self.buffer.pixel_count;
        for (i, &byte) in r.iter().enumerate() {
            let idx = offset + i;
            if idx >= end {
                break;
            }
            slot.r[idx].store(byte, Ordering::Relaxed);
            slot.g[idx].store(g[i], Ordering::Relaxed);
            slot.b[idx].store(b[i], Ordering::Relaxed);
        }
    }

    /// Promote this slot to be the read slot.
    ///
    /// Must only be called once the full line has been written.
    pub fn publish(self) {
        self.buffer.read_index.store(self.slot, Ordering::Release);
        self.buffer.sequence.fetch_add(1, Ordering::AcqRel);
        // Drop clears the claim.
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.buffer.writer_claimed.store(false, Ordering::Release);
    }
}

/// Read access to the published line.
#[derive(Debug, Clone, Copy)]
pub struct LineView<'a> {
    r: &'a [AtomicU8],
    g: &'a [AtomicU8],
    b: &'a [AtomicU8],
}

impl LineView<'_> {
    /// Pixels in the line.
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// True when the line has no pixels.
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// RGB triple at pixel `i`.
    #[inline]
    pub fn rgb(&self, i: usize) -> (u8, u8, u8) {
        (
            self.r[i].load(Ordering::Relaxed),
            self.g[i].load(Ordering::Relaxed),
            self.b[i].load(Ordering::Relaxed),
        )
    }

    /// Copy all three channels into caller-owned scratch buffers.
    pub fn copy_into(&self, r: &mut [u8], g: &mut [u8], b: &mut [u8]) {
        for i in 0..self.len().min(r.len()) {
            r[i] = self.r[i].load(Ordering::Relaxed);
            g[i] = self.g[i].load(Ordering::Relaxed);
            b[i] = self.b[i].load(Ordering::Relaxed);
        }
    }
}

/// Outcome of feeding one fragment to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembled {
    /// Fragment stored; line still incomplete.
    Partial,
    /// Fragment completed its line; the line is now published.
    LineComplete,
    /// Fragment was dropped (inconsistent or out of bounds).
    Dropped,
}

/// Reassembles fragments into the line double-buffer.
///
/// Owned exclusively by the network thread.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Arc<LineDoubleBuffer>,
    stats: Arc<IngestStats>,
    guard: Option<WriteGuard>,
    current_line_id: u32,
    /// One bit per expected fragment of the current line.
    received: u64,
    total_fragments: u32,
    fragment_size: u32,
}

impl LineAssembler {
    /// Create an assembler writing into `buffer`.
    pub fn new(buffer: Arc<LineDoubleBuffer>, stats: Arc<IngestStats>) -> Self {
        Self {
            buffer,
            stats,
            guard: None,
            current_line_id: 0,
            received: 0,
            total_fragments: 0,
            fragment_size: 0,
        }
    }

    /// Feed one validated fragment.
    pub fn accept(&mut self, fragment: &ImageFragment<'_>) -> Assembled {
        if self.guard.is_none() || fragment.line_id != self.current_line_id {
            self.begin_line(fragment);
        }
        if self.guard.is_none() {
            // start_write refused (concurrent writer); count and move on.
            return Assembled::Dropped;
        }

        // All fragments of one line must agree on geometry.
        if fragment.total_fragments != self.total_fragments
            || fragment.fragment_size != self.fragment_size
        {
            self.stats.dropped_fragment();
            return Assembled::Dropped;
        }

        let offset = fragment.fragment_id as usize * fragment.fragment_size as usize;
        if offset >= self.buffer.pixel_count() {
            self.stats.dropped_fragment();
            return Assembled::Dropped;
        }

        let bit = 1u64 << fragment.fragment_id;
        if self.received & bit != 0 {
            // Duplicate (retransmission); bytes are identical, nothing to do.
            return Assembled::Partial;
        }

        let guard = self.guard.as_ref().unwrap_or_else(|| unreachable!());
        guard.write_channels(offset, fragment.r, fragment.g, fragment.b);
        self.received |= bit;

        if self.is_complete() {
            if let Some(guard) = self.guard.take() {
                guard.publish();
            }
            self.stats.complete_line();
            Assembled::LineComplete
        } else {
            Assembled::Partial
        }
    }

    fn is_complete(&self) -> bool {
        let needed = if self.total_fragments >= 64 {
            u64::MAX
        } else {
            (1u64 << self.total_fragments) - 1
        };
        self.received & needed == needed
    }

    fn begin_line(&mut self, fragment: &ImageFragment<'_>) {
        if self.guard.take().is_some() {
            // A partial line was in flight; no partial promotion.
            self.stats.incomplete_line();
            tracing::trace!(
                line_id = self.current_line_id,
                "discarding incomplete line"
            );
        }
        self.current_line_id = fragment.line_id;
        self.total_fragments = fragment.total_fragments;
        self.fragment_size = fragment.fragment_size;
        self.received = 0;
        match self.buffer.start_write() {
            Ok(guard) => self.guard = Some(guard),
            Err(WriteError::BusyWriter) => {
                self.stats.dropped_fragment();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment<'a>(
        line_id: u32,
        fragment_id: u32,
        total: u32,
        r: &'a [u8],
        g: &'a [u8],
        b: &'a [u8],
    ) -> ImageFragment<'a> {
        ImageFragment {
            line_id,
            fragment_id,
            total_fragments: total,
            fragment_size: r.len() as u32,
            r,
            g,
            b,
        }
    }

    #[test]
    fn single_fragment_line_publishes() {
        let buffer = Arc::new(LineDoubleBuffer::new(4));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(Arc::clone(&buffer), Arc::clone(&stats));

        let result = asm.accept(&fragment(
            1,
            0,
            1,
            &[10, 11, 12, 13],
            &[20, 21, 22, 23],
            &[30, 31, 32, 33],
        ));
        assert_eq!(result, Assembled::LineComplete);
        assert_eq!(buffer.sequence(), 1);

        let view = buffer.read();
        assert_eq!(view.rgb(0), (10, 20, 30));
        assert_eq!(view.rgb(3), (13, 23, 33));
        assert_eq!(stats.snapshot().complete_lines, 1);
    }

    #[test]
    fn fragments_assemble_out_of_order() {
        let buffer = Arc::new(LineDoubleBuffer::new(4));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(Arc::clone(&buffer), stats);

        assert_eq!(
            asm.accept(&fragment(7, 1, 2, &[3, 4], &[3, 4], &[3, 4])),
            Assembled::Partial
        );
        assert_eq!(
            asm.accept(&fragment(7, 0, 2, &[1, 2], &[1, 2], &[1, 2])),
            Assembled::LineComplete
        );

        let view = buffer.read();
        assert_eq!(view.rgb(0).0, 1);
        assert_eq!(view.rgb(2).0, 3);
    }

    #[test]
    fn line_id_change_discards_partial() {
        let buffer = Arc::new(LineDoubleBuffer::new(4));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(Arc::clone(&buffer), Arc::clone(&stats));

        // First complete line so there is something published.
        asm.accept(&fragment(1, 0, 1, &[9; 4], &[9; 4], &[9; 4]));
        assert_eq!(buffer.sequence(), 1);

        // 1 of 2 fragments of line 2, then line 3 starts.
        asm.accept(&fragment(2, 0, 2, &[1, 1], &[1, 1], &[1, 1]));
        asm.accept(&fragment(3, 0, 2, &[2, 2], &[2, 2], &[2, 2]));

        assert_eq!(stats.snapshot().incomplete_lines, 1);
        // Published line is still line 1.
        assert_eq!(buffer.sequence(), 1);
        assert_eq!(buffer.read().rgb(0).0, 9);
    }

    #[test]
    fn duplicate_fragment_is_harmless() {
        let buffer = Arc::new(LineDoubleBuffer::new(4));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(buffer, stats);

        assert_eq!(
            asm.accept(&fragment(1, 0, 2, &[1, 1], &[1, 1], &[1, 1])),
            Assembled::Partial
        );
        assert_eq!(
            asm.accept(&fragment(1, 0, 2, &[1, 1], &[1, 1], &[1, 1])),
            Assembled::Partial
        );
        assert_eq!(
            asm.accept(&fragment(1, 1, 2, &[2, 2], &[2, 2], &[2, 2])),
            Assembled::LineComplete
        );
    }

    #[test]
    fn oversized_offset_dropped() {
        let buffer = Arc::new(LineDoubleBuffer::new(4));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(buffer, Arc::clone(&stats));

        // fragment 3 of 4 with size 4 starts at offset 12, beyond 4 pixels
        let result = asm.accept(&fragment(1, 3, 4, &[1; 4], &[1; 4], &[1; 4]));
        assert_eq!(result, Assembled::Dropped);
        assert_eq!(stats.snapshot().dropped_fragments, 1);
    }

    #[test]
    fn geometry_mismatch_dropped() {
        let buffer = Arc::new(LineDoubleBuffer::new(8));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(buffer, Arc::clone(&stats));

        asm.accept(&fragment(1, 0, 2, &[1; 4], &[1; 4], &[1; 4]));
        // Same line id but different declared total.
        let result = asm.accept(&fragment(1, 1, 3, &[1; 4], &[1; 4], &[1; 4]));
        assert_eq!(result, Assembled::Dropped);
    }

    #[test]
    fn busy_writer_refused() {
        let buffer = Arc::new(LineDoubleBuffer::new(4));
        let guard = buffer.start_write().unwrap();
        assert_eq!(buffer.start_write().unwrap_err(), WriteError::BusyWriter);
        drop(guard);
        assert!(buffer.start_write().is_ok());
    }

    #[test]
    fn reader_sees_last_line_after_silence() {
        let buffer = Arc::new(LineDoubleBuffer::new(2));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(Arc::clone(&buffer), stats);
        asm.accept(&fragment(1, 0, 1, &[5, 6], &[5, 6], &[5, 6]));

        // No further traffic: every read returns the same bytes.
        for _ in 0..10 {
            let view = buffer.read();
            assert_eq!(view.rgb(0), (5, 5, 5));
            assert_eq!(view.rgb(1), (6, 6, 6));
        }
    }
}
