//! Sine low-frequency oscillator.
//!
//! Drives the wavetable engine's vibrato. One LFO instance is shared by all
//! voices so they breathe together; the engine advances it once per sample
//! and hands the value to each voice.

use libm::sinf;

/// Phase-accumulator sine LFO.
#[derive(Debug, Clone)]
pub struct Lfo {
    /// Current phase position [0.0, 1.0)
    phase: f32,
    /// Phase increment per sample
    phase_inc: f32,
    sample_rate: f32,
}

impl Lfo {
    /// Create an LFO at the given rate.
    pub fn new(sample_rate: f32, freq_hz: f32) -> Self {
        Self {
            phase: 0.0,
            phase_inc: freq_hz / sample_rate,
            sample_rate,
        }
    }

    /// Set frequency in Hz.
    pub fn set_frequency(&mut self, freq_hz: f32) {
        self.phase_inc = freq_hz.max(0.0) / self.sample_rate;
    }

    /// Current frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.phase_inc * self.sample_rate
    }

    /// Reset phase to zero.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Advance one sample and return the sine value in [-1, 1].
    #[inline]
    pub fn next(&mut self) -> f32 {
        let value = sinf(core::f32::consts::TAU * self.phase);
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }
}
