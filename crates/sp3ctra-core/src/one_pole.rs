//! One-pole lowpass filter.
//!
//! Difference equation:
//!
//! ```text
//! y[n] = y[n-1] + alpha * (x[n] - y[n-1])
//! alpha = 1 - exp(-2*pi * freq / sample_rate)
//! ```
//!
//! The simplest possible lowpass — 6 dB/octave rolloff, one multiply per
//! sample. Sp3ctra uses it in two places: high-frequency damping inside the
//! reverb's delay lines (fixed cutoff per block) and the per-voice filter of
//! the wavetable engine, where the cutoff moves every sample under envelope
//! modulation via [`set_alpha`](OnePole::set_alpha).

use crate::flush_denormal;
use libm::expf;

/// One-pole (6 dB/oct) lowpass filter.
///
/// # Invariants
///
/// - `alpha` stays in (0, 1]; zero would freeze the filter, above one it
///   overshoots
/// - state is flushed to zero below 1e-20 (denormal protection)
#[derive(Debug, Clone)]
pub struct OnePole {
    state: f32,
    alpha: f32,
    sample_rate: f32,
}

impl OnePole {
    /// Create a filter with the given cutoff.
    pub fn new(sample_rate: f32, freq_hz: f32) -> Self {
        let mut filter = Self {
            state: 0.0,
            alpha: 1.0,
            sample_rate,
        };
        filter.set_frequency(freq_hz);
        filter
    }

    /// Set the cutoff frequency in Hz.
    pub fn set_frequency(&mut self, freq_hz: f32) {
        self.alpha = Self::alpha_for(freq_hz, self.sample_rate);
    }

    /// Smoothing coefficient for a cutoff at a sample rate.
    ///
    /// Exposed so callers that recompute the cutoff every sample (filter
    /// envelope modulation) can derive alpha once and hand it over.
    #[inline]
    pub fn alpha_for(freq_hz: f32, sample_rate: f32) -> f32 {
        let a = 1.0 - expf(-core::f32::consts::TAU * freq_hz / sample_rate);
        a.clamp(1e-5, 1.0)
    }

    /// Set the smoothing coefficient directly.
    #[inline]
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(1e-5, 1.0);
    }

    /// Current smoothing coefficient.
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.state = flush_denormal(self.state + self.alpha * (input - self.state));
        self.state
    }

    /// Clear filter state.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }

    /// Update sample rate. Callers must re-set the frequency afterwards;
    /// alpha is left untouched.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }
}
