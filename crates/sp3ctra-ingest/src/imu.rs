//! Inertial telemetry: filtering and atomic snapshot publication.
//!
//! Only the accelerometer X axis is consumed. The raw samples are smoothed
//! with a first-order IIR on the network thread; the auto-volume controller
//! reads the filtered value through [`ImuShared`]: two atomics instead of
//! a mutex, since only one scalar and a timestamp are involved.

use sp3ctra_core::AtomicF32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// First-order IIR smoother for raw accelerometer samples.
///
/// Owned by the network thread; not shared.
#[derive(Debug, Clone)]
pub struct ImuFilter {
    alpha: f32,
    state: f32,
    primed: bool,
}

impl ImuFilter {
    /// Create with a smoothing factor in (0, 1]; 1 disables smoothing.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(1e-3, 1.0),
            state: 0.0,
            primed: false,
        }
    }

    /// Feed one raw sample, returning the filtered value.
    ///
    /// The first sample primes the filter directly so startup does not ramp
    /// from zero.
    pub fn feed(&mut self, raw: f32) -> f32 {
        if self.primed {
            self.state += self.alpha * (raw - self.state);
        } else {
            self.state = raw;
            self.primed = true;
        }
        self.state
    }

    /// Current filtered value.
    pub fn value(&self) -> f32 {
        self.state
    }
}

/// Filtered IMU state shared with the auto-volume controller.
#[derive(Debug)]
pub struct ImuShared {
    x_filtered: AtomicF32,
    /// Milliseconds since `epoch` of the last accepted sample.
    last_update_ms: AtomicU64,
    epoch: Instant,
}

impl ImuShared {
    /// Create an empty snapshot anchored at `now`.
    pub fn new() -> Self {
        Self {
            x_filtered: AtomicF32::new(0.0),
            last_update_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Publish a filtered sample (network thread).
    pub fn publish(&self, x_filtered: f32) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.x_filtered.store(x_filtered, Ordering::Release);
        self.last_update_ms.store(ms, Ordering::Release);
    }

    /// Latest filtered X value.
    pub fn x_filtered(&self) -> f32 {
        self.x_filtered.load(Ordering::Acquire)
    }

    /// Time since the last accepted sample.
    pub fn age(&self) -> Duration {
        let last = self.last_update_ms.load(Ordering::Acquire);
        self.epoch
            .elapsed()
            .saturating_sub(Duration::from_millis(last))
    }
}

impl Default for ImuShared {
    fn default() -> Self {
        Self::new()
    }
}
