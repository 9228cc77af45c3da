//! Audio effects for the Sp3ctra output pipeline.
//!
//! Currently a single effect: the feedback-delay-network [`Reverb`] that
//! the real-time callback runs on the summed engine output. Dry/wet mixing
//! belongs to the callback (the host mixer), not the effect.

pub mod reverb;

pub use reverb::{Reverb, ReverbParams};
