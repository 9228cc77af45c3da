//! Synthesis engines for Sp3ctra.
//!
//! Two engines turn preprocessed scanner frames into audio blocks:
//!
//! - **LuxStral** ([`luxstral`]): a bank of fixed-frequency sinusoidal
//!   oscillators whose amplitudes track per-note luminance, with
//!   per-oscillator attack/release ramps, chromatic stereo panning and a
//!   dynamics chain. Rendering is partitioned across a worker pool.
//! - **LuxWave** ([`luxwave`]): an 8-voice MIDI-driven synthesizer that
//!   scans the current image line as a one-period wavetable, with ADSR
//!   envelopes, shared vibrato and a per-voice envelope-modulated lowpass.
//!
//! Both engines render into caller-provided block buffers and read exactly
//! one parameter snapshot per block; nothing here allocates after
//! construction (the worker pool recycles its partial buffers through
//! channels).

pub mod adsr;
pub mod luxstral;
pub mod luxwave;
pub mod wavetable;

pub use adsr::{AdsrEnvelope, AdsrTimes, EnvelopeStage};
pub use luxstral::{LuxStral, LuxStralBlockParams, LuxStralConfig};
pub use luxwave::{InterpMode, LuxWave, LuxWaveParams, NoteEvent, midi_to_freq};
pub use wavetable::{ScanMode, sample_wave};
