//! Auto-volume controller.
//!
//! Gates the master volume to an inactive level when the instrument sits
//! untouched: no validated IMU activity for longer than the inactivity
//! timeout fades the output down; any validated movement brings it back.
//!
//! Validation guards against two failure modes:
//! - during a static-image performance the audio may be loud while the
//!   player barely moves; high contrast without contrast *change* is
//!   treated as vibration pickup and ignored;
//! - low-contrast material cannot corroborate, so IMU activity is trusted
//!   as-is below the contrast floor.
//!
//! The decision logic lives in [`AutoVolumeController::tick`], separated
//! from the polling thread so tests drive time deterministically. The only
//! output is one atomic f32 the audio callback reads per block.

use sp3ctra_core::AtomicF32;
use sp3ctra_ingest::ImuShared;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Contrast below which IMU activity needs no corroboration.
const CONTRAST_TRUST_FLOOR: f32 = 0.3;

/// Controller tuning.
#[derive(Debug, Clone, Copy)]
pub struct AutoVolumeConfig {
    /// Master switch; disabled pins the volume at 1.0.
    pub enabled: bool,
    /// Volume reached after the inactivity timeout (typically 0).
    pub inactive_level: f32,
    /// Fade time constant in milliseconds.
    pub fade_ms: f32,
    /// Polling period in milliseconds.
    pub poll_ms: u64,
    /// Divides the base threshold; higher is more sensitive.
    pub sensitivity: f32,
    /// Base IMU activity threshold (filtered |x|).
    pub base_threshold: f32,
    /// Seconds without validated activity before fading out.
    pub inactivity_timeout_s: f32,
    /// Minimum |contrast delta| that corroborates activity on
    /// high-contrast material.
    pub contrast_change_threshold: f32,
}

impl Default for AutoVolumeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inactive_level: 0.0,
            fade_ms: 300.0,
            poll_ms: 50,
            sensitivity: 1.0,
            base_threshold: 0.05,
            inactivity_timeout_s: 30.0,
            contrast_change_threshold: 0.02,
        }
    }
}

/// The controller state machine.
#[derive(Debug)]
pub struct AutoVolumeController {
    cfg: AutoVolumeConfig,
    imu: Arc<ImuShared>,
    contrast: Arc<AtomicF32>,
    master: Arc<AtomicF32>,
    current: f32,
    last_contrast: f32,
    since_activity: Duration,
}

impl AutoVolumeController {
    /// Create a controller publishing to `master`.
    pub fn new(
        cfg: AutoVolumeConfig,
        imu: Arc<ImuShared>,
        contrast: Arc<AtomicF32>,
        master: Arc<AtomicF32>,
    ) -> Self {
        master.store(1.0, Ordering::Release);
        Self {
            cfg,
            imu,
            contrast,
            master,
            current: 1.0,
            last_contrast: 0.0,
            since_activity: Duration::ZERO,
        }
    }

    /// Current master volume.
    pub fn volume(&self) -> f32 {
        self.current
    }

    /// One polling step of `dt`.
    pub fn tick(&mut self, dt: Duration) {
        if !self.cfg.enabled {
            self.current = 1.0;
            self.master.store(1.0, Ordering::Release);
            return;
        }

        let contrast = self.contrast.load(Ordering::Acquire);
        let threshold = self.cfg.base_threshold / self.cfg.sensitivity.max(1e-3);
        let imu_active = self.imu.x_filtered().abs() >= threshold;

        let validated = if imu_active {
            if contrast < CONTRAST_TRUST_FLOOR {
                true
            } else {
                (contrast - self.last_contrast).abs() > self.cfg.contrast_change_threshold
            }
        } else {
            false
        };
        self.last_contrast = contrast;

        let target = if validated {
            self.since_activity = Duration::ZERO;
            1.0
        } else {
            self.since_activity += dt;
            if self.since_activity.as_secs_f32() > self.cfg.inactivity_timeout_s {
                self.cfg.inactive_level
            } else {
                1.0
            }
        };

        // Exponential smoothing with tau = fade_ms.
        let tau = (self.cfg.fade_ms / 1000.0).max(1e-3);
        let alpha = 1.0 - libm::expf(-dt.as_secs_f32() / tau);
        self.current += (target - self.current) * alpha;
        self.master.store(self.current, Ordering::Release);
    }
}

/// Spawn the polling thread.
pub fn spawn_auto_volume(
    mut controller: AutoVolumeController,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("sp3ctra-autovol".into())
        .spawn(move || {
            let dt = Duration::from_millis(controller.cfg.poll_ms.max(1));
            while running.load(Ordering::Relaxed) {
                controller.tick(dt);
                std::thread::sleep(dt);
            }
        })
        .unwrap_or_else(|e| panic!("failed to spawn auto-volume thread: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rig {
        controller: AutoVolumeController,
        imu: Arc<ImuShared>,
        contrast: Arc<AtomicF32>,
        master: Arc<AtomicF32>,
    }

    fn rig(cfg: AutoVolumeConfig) -> Rig {
        let imu = Arc::new(ImuShared::new());
        let contrast = Arc::new(AtomicF32::new(0.0));
        let master = Arc::new(AtomicF32::new(0.0));
        let controller = AutoVolumeController::new(
            cfg,
            Arc::clone(&imu),
            Arc::clone(&contrast),
            Arc::clone(&master),
        );
        Rig {
            controller,
            imu,
            contrast,
            master,
        }
    }

    fn short_timeout_cfg() -> AutoVolumeConfig {
        AutoVolumeConfig {
            inactivity_timeout_s: 1.0,
            fade_ms: 200.0,
            ..AutoVolumeConfig::default()
        }
    }

    #[test]
    fn fades_out_after_inactivity() {
        let mut rig = rig(short_timeout_cfg());
        let dt = Duration::from_millis(50);

        // IMU quiet for timeout + 7 fade time constants.
        rig.imu.publish(0.0);
        let steps = ((1.0 + 0.2 * 7.0) / 0.05) as usize + 5;
        for _ in 0..steps {
            rig.controller.tick(dt);
        }
        let v = rig.master.load(Ordering::Acquire);
        assert!(v <= 0.01, "volume should fade to inactive level, got {v}");
    }

    #[test]
    fn movement_restores_volume() {
        let mut rig = rig(short_timeout_cfg());
        let dt = Duration::from_millis(50);

        rig.imu.publish(0.0);
        for _ in 0..60 {
            rig.controller.tick(dt);
        }
        assert!(rig.controller.volume() < 0.2);

        // Low contrast: IMU movement is trusted directly.
        rig.contrast.store(0.1, Ordering::Release);
        rig.imu.publish(0.5);
        for _ in 0..60 {
            rig.controller.tick(dt);
        }
        assert!(rig.controller.volume() > 0.95);
    }

    #[test]
    fn vibration_on_static_loud_image_is_ignored() {
        let mut rig = rig(short_timeout_cfg());
        let dt = Duration::from_millis(50);

        // High contrast that never changes + persistent "movement".
        rig.contrast.store(0.8, Ordering::Release);
        rig.imu.publish(0.5);
        let steps = ((1.0 + 0.2 * 7.0) / 0.05) as usize + 5;
        for _ in 0..steps {
            rig.controller.tick(dt);
        }
        assert!(
            rig.controller.volume() <= 0.01,
            "unvalidated vibration must not keep the volume up, got {}",
            rig.controller.volume()
        );
    }

    #[test]
    fn contrast_change_validates_activity() {
        let mut rig = rig(short_timeout_cfg());
        let dt = Duration::from_millis(50);

        rig.imu.publish(0.5);
        let mut contrast = 0.5f32;
        for step in 0..40 {
            // Contrast visibly changes every poll: a live performance.
            contrast = 0.5 + 0.1 * (step % 2) as f32;
            rig.contrast.store(contrast, Ordering::Release);
            rig.controller.tick(dt);
        }
        assert!(rig.controller.volume() > 0.95);
    }

    #[test]
    fn sensitivity_scales_the_threshold() {
        let cfg = AutoVolumeConfig {
            sensitivity: 10.0, // effective threshold 0.005
            ..short_timeout_cfg()
        };
        let mut rig = rig(cfg);
        let dt = Duration::from_millis(50);

        rig.contrast.store(0.1, Ordering::Release);
        rig.imu.publish(0.01); // below base threshold, above scaled one
        for _ in 0..20 {
            rig.controller.tick(dt);
        }
        assert!(rig.controller.volume() > 0.95);
    }

    #[test]
    fn disabled_controller_is_inert() {
        let cfg = AutoVolumeConfig {
            enabled: false,
            ..short_timeout_cfg()
        };
        let mut rig = rig(cfg);
        rig.imu.publish(0.0);
        for _ in 0..200 {
            rig.controller.tick(Duration::from_millis(50));
        }
        assert_eq!(rig.master.load(Ordering::Acquire), 1.0);
    }
}
