//! Preprocessed frame publication.
//!
//! All per-line derived data travels together in one immutable
//! [`PreprocessedFrame`] so a reader can never pair one line's grayscale
//! with another line's contrast. Publication goes through [`ArcSwap`]:
//! the writer (network thread) allocates and swaps, readers load one `Arc`
//! per audio block; wait-free, no allocation on the read side.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Averaged RGB of one lighting zone, for the DMX host contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmxColor {
    /// Red channel mean.
    pub r: u8,
    /// Green channel mean.
    pub g: u8,
    /// Blue channel mean.
    pub b: u8,
}

/// Everything derived from one assembled scanner line.
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
    /// Per-note grayscale volumes in [0, 255].
    pub grayscale: Box<[f32]>,
    /// Per-pixel signed wavetable samples in [-1, 1].
    pub wave: Box<[f32]>,
    /// Per-note pan positions in [-1, 1].
    pub pan: Box<[f32]>,
    /// RMS contrast of the line, [0, 1].
    pub contrast: f32,
    /// Monotonic frame counter (0 = the silent boot frame).
    pub sequence: u64,
    /// Optional FFT magnitudes of the luminance line.
    pub spectrum: Option<Box<[f32]>>,
    /// Optional per-zone color samples for lighting.
    pub dmx: Box<[DmxColor]>,
}

impl PreprocessedFrame {
    /// The silent frame engines render before the first line arrives.
    pub fn silent(notes: usize, pixels: usize) -> Self {
        Self {
            grayscale: vec![0.0; notes].into_boxed_slice(),
            wave: vec![0.0; pixels].into_boxed_slice(),
            pan: vec![0.0; notes].into_boxed_slice(),
            contrast: 0.0,
            sequence: 0,
            spectrum: None,
            dmx: Box::default(),
        }
    }

    /// Number of notes in the frame.
    pub fn notes(&self) -> usize {
        self.grayscale.len()
    }
}

/// Shared handle to the most recent preprocessed frame.
#[derive(Debug)]
pub struct FrameStore {
    current: ArcSwap<PreprocessedFrame>,
}

impl FrameStore {
    /// Create a store seeded with the silent frame.
    pub fn new(notes: usize, pixels: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(PreprocessedFrame::silent(notes, pixels)),
        }
    }

    /// Publish a frame (network thread).
    pub fn publish(&self, frame: Arc<PreprocessedFrame>) {
        self.current.store(frame);
    }

    /// Load the current frame for one block of rendering.
    #[inline]
    pub fn load(&self) -> Arc<PreprocessedFrame> {
        self.current.load_full()
    }

    /// Sequence number of the current frame.
    pub fn sequence(&self) -> u64 {
        self.current.load().sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_silent() {
        let store = FrameStore::new(4, 16);
        let frame = store.load();
        assert_eq!(frame.sequence, 0);
        assert!(frame.grayscale.iter().all(|&v| v == 0.0));
        assert_eq!(frame.wave.len(), 16);
    }

    #[test]
    fn publish_replaces_wholesale() {
        let store = FrameStore::new(2, 4);
        let held = store.load();

        let mut frame = PreprocessedFrame::silent(2, 4);
        frame.grayscale[0] = 200.0;
        frame.contrast = 0.5;
        frame.sequence = 1;
        store.publish(Arc::new(frame));

        // The held frame is untouched; new loads see the new frame.
        assert_eq!(held.sequence, 0);
        assert_eq!(held.grayscale[0], 0.0);
        let fresh = store.load();
        assert_eq!(fresh.sequence, 1);
        assert_eq!(fresh.grayscale[0], 200.0);
        assert_eq!(fresh.contrast, 0.5);
    }
}
