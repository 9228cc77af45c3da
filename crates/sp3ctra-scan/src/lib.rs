//! Image-line preprocessing for Sp3ctra.
//!
//! Sits between line ingestion and the synthesis engines. From each
//! assembled RGB line, the [`Preprocessor`] derives:
//!
//! - per-note grayscale volumes (perceptual luminance, optional gamma and
//!   white-background inversion)
//! - a per-pixel signed wave for the wavetable engine
//! - per-note pan positions from color temperature, and constant-power
//!   stereo gains written to the lock-free [`PanGainsTable`]
//! - the RMS contrast factor consumed by the auto-volume controller
//! - optional FFT magnitudes and DMX color samples
//!
//! Results are published wholesale through the [`FrameStore`]; audio-side
//! readers load one `Arc` per block and see either the previous frame in
//! full or the new one in full.

pub mod chroma;
pub mod frame;
pub mod luminance;
pub mod pan_table;
pub mod preprocessor;
pub mod spectrum;

pub use chroma::{ChromaConfig, PanLaw, note_pan, pan_gains};
pub use frame::{DmxColor, FrameStore, PreprocessedFrame};
pub use pan_table::{GainBuffer, PanGainsTable};
pub use preprocessor::{Preprocessor, PreprocessorConfig};
pub use spectrum::SpectrumAnalyzer;
