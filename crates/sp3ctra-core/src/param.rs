//! Parameter smoothing for zipper-free changes.
//!
//! Runtime-tunable values (reverb feedback, master volume, predelay) need
//! smooth transitions to avoid audible "zipper noise". [`SmoothedParam`]
//! implements one-pole exponential smoothing:
//!
//! ```text
//! y[n] = y[n-1] + coeff * (target - y[n-1])
//! coeff = 1 - exp(-1 / (tau * rate))
//! ```
//!
//! where `tau` is the time constant in seconds and `rate` is how often
//! [`advance`](SmoothedParam::advance) is called (audio rate for per-sample
//! smoothing, `1000 / poll_ms` for control-rate smoothing like the
//! auto-volume controller).

use libm::expf;

/// A parameter with built-in exponential smoothing.
///
/// A step change of the target reaches 63.2% after one time constant and is
/// effectively settled (99.3%) after five.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
    rate_hz: f32,
    time_constant_ms: f32,
}

impl SmoothedParam {
    /// Create a smoothed parameter.
    ///
    /// # Arguments
    /// * `initial` - starting value (current and target)
    /// * `rate_hz` - how often `advance` is called, per second
    /// * `time_constant_ms` - smoothing time constant; 0 disables smoothing
    pub fn new(initial: f32, rate_hz: f32, time_constant_ms: f32) -> Self {
        let mut param = Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            rate_hz,
            time_constant_ms,
        };
        param.recalculate_coeff();
        param
    }

    /// Set the value the parameter smooths toward.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Set target and snap to it immediately.
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }

    /// Change the advance rate (recomputes the coefficient).
    pub fn set_rate(&mut self, rate_hz: f32) {
        self.rate_hz = rate_hz;
        self.recalculate_coeff();
    }

    /// Change the smoothing time constant in milliseconds.
    pub fn set_time_constant_ms(&mut self, ms: f32) {
        self.time_constant_ms = ms;
        self.recalculate_coeff();
    }

    /// Advance one step and return the smoothed value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    /// Current smoothed value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// The target being approached.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// True once the value is within 1e-6 of the target.
    #[inline]
    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() < 1e-6
    }

    /// Jump to the target immediately.
    #[inline]
    pub fn snap_to_target(&mut self) {
        self.current = self.target;
    }

    fn recalculate_coeff(&mut self) {
        if self.time_constant_ms <= 0.0 || self.rate_hz <= 0.0 {
            self.coeff = 1.0;
        } else {
            let steps = self.time_constant_ms / 1000.0 * self.rate_hz;
            self.coeff = 1.0 - expf(-1.0 / steps.max(1e-3));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_when_no_smoothing() {
        let mut param = SmoothedParam::new(1.0, 48000.0, 0.0);
        param.set_target(0.5);
        assert!((param.advance() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn converges_to_target() {
        let mut param = SmoothedParam::new(0.0, 48000.0, 10.0);
        param.set_target(1.0);

        // 50 ms = five time constants
        for _ in 0..(48000 * 50 / 1000) {
            param.advance();
        }
        assert!((param.get() - 1.0).abs() < 0.01, "got {}", param.get());
        assert!(param.is_settled() || (param.get() - 1.0).abs() < 0.01);
    }

    #[test]
    fn one_time_constant_is_63_percent() {
        let mut param = SmoothedParam::new(0.0, 48000.0, 10.0);
        param.set_target(1.0);

        for _ in 0..480 {
            param.advance();
        }
        let expected = 1.0 - expf(-1.0);
        assert!(
            (param.get() - expected).abs() < 0.05,
            "expected ~{}, got {}",
            expected,
            param.get()
        );
    }

    #[test]
    fn control_rate_smoothing() {
        // Auto-volume style: 20 Hz polling, 300 ms fade
        let mut param = SmoothedParam::new(1.0, 20.0, 300.0);
        param.set_target(0.0);

        // 2.1 s = seven time constants
        for _ in 0..42 {
            param.advance();
        }
        assert!(param.get() < 0.01, "got {}", param.get());
    }

    #[test]
    fn snap_jumps_immediately() {
        let mut param = SmoothedParam::new(0.0, 48000.0, 100.0);
        param.set_target(1.0);
        param.advance();
        assert!(param.get() < 0.1);
        param.snap_to_target();
        assert_eq!(param.get(), 1.0);
    }
}
