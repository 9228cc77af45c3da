//! ADSR envelope generator.
//!
//! Exponential attack-decay-sustain-release envelope used by the wavetable
//! engine for both amplitude and filter modulation. The attack stage aims
//! slightly above 1.0 so the exponential actually reaches the peak in the
//! configured time instead of approaching it forever.

use libm::expf;

/// Envelope stages, in transition order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Inactive; output is zero.
    #[default]
    Idle,
    /// Rising toward peak.
    Attack,
    /// Falling from peak toward the sustain level.
    Decay,
    /// Holding the sustain level while the gate is on.
    Sustain,
    /// Decaying to zero after gate release.
    Release,
}

/// Stage times and sustain level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrTimes {
    /// Attack time in milliseconds.
    pub attack_ms: f32,
    /// Decay time in milliseconds.
    pub decay_ms: f32,
    /// Sustain level in [0, 1].
    pub sustain: f32,
    /// Release time in milliseconds.
    pub release_ms: f32,
}

impl Default for AdsrTimes {
    fn default() -> Self {
        Self {
            attack_ms: 10.0,
            decay_ms: 100.0,
            sustain: 0.7,
            release_ms: 200.0,
        }
    }
}

/// Attack target above 1.0 for a snappy, finite-time attack.
const ATTACK_OVERSHOOT: f32 = 1.2;

/// Level below which a release tail counts as finished.
const IDLE_EPSILON: f32 = 1e-4;

/// Exponential ADSR envelope.
///
/// `gate_on` enters ATTACK from any stage without resetting the level, so
/// retriggers are click-free. `gate_off` enters RELEASE from any non-idle
/// stage.
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    stage: EnvelopeStage,
    level: f32,
    sample_rate: f32,
    times: AdsrTimes,
    attack_coeff: f32,
    decay_coeff: f32,
    release_coeff: f32,
}

impl AdsrEnvelope {
    /// Create an idle envelope.
    pub fn new(sample_rate: f32) -> Self {
        let mut env = Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            sample_rate,
            times: AdsrTimes::default(),
            attack_coeff: 0.0,
            decay_coeff: 0.0,
            release_coeff: 0.0,
        };
        env.recalculate_coefficients();
        env
    }

    /// Apply a full set of stage times; coefficients are recomputed only
    /// when something actually changed.
    pub fn set_times(&mut self, times: AdsrTimes) {
        if times != self.times {
            self.times = AdsrTimes {
                attack_ms: times.attack_ms.max(0.1),
                decay_ms: times.decay_ms.max(0.1),
                sustain: times.sustain.clamp(0.0, 1.0),
                release_ms: times.release_ms.max(0.1),
            };
            self.recalculate_coefficients();
        }
    }

    /// Current stage times.
    pub fn times(&self) -> AdsrTimes {
        self.times
    }

    /// Trigger (note on).
    pub fn gate_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    /// Release (note off).
    pub fn gate_off(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Force idle and zero.
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }

    /// Current stage.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current level without advancing.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// True while the envelope produces output.
    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    /// Advance one sample and return the level.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                self.level = ATTACK_OVERSHOOT + (self.level - ATTACK_OVERSHOOT) * self.attack_coeff;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                let sustain = self.times.sustain;
                self.level = sustain + (self.level - sustain) * self.decay_coeff;
                if (self.level - sustain).abs() < IDLE_EPSILON {
                    self.level = sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.times.sustain;
            }
            EnvelopeStage::Release => {
                self.level *= self.release_coeff;
                if self.level < IDLE_EPSILON {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }

    fn recalculate_coefficients(&mut self) {
        self.attack_coeff = Self::coeff(self.times.attack_ms, self.sample_rate);
        self.decay_coeff = Self::coeff(self.times.decay_ms, self.sample_rate);
        self.release_coeff = Self::coeff(self.times.release_ms, self.sample_rate);
    }

    /// `exp(-1 / samples)`: reach ~63% of target per time constant.
    fn coeff(ms: f32, sample_rate: f32) -> f32 {
        let samples = ms * sample_rate / 1000.0;
        expf(-1.0 / samples.max(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(attack: f32, decay: f32, sustain: f32, release: f32) -> AdsrEnvelope {
        let mut env = AdsrEnvelope::new(48000.0);
        env.set_times(AdsrTimes {
            attack_ms: attack,
            decay_ms: decay,
            sustain,
            release_ms: release,
        });
        env
    }

    #[test]
    fn idle_outputs_zero() {
        let mut env = AdsrEnvelope::new(48000.0);
        for _ in 0..100 {
            assert_eq!(env.advance(), 0.0);
        }
    }

    #[test]
    fn full_stage_walk() {
        let mut env = env_with(1.0, 5.0, 0.5, 10.0);

        env.gate_on();
        assert_eq!(env.stage(), EnvelopeStage::Attack);

        for _ in 0..1000 {
            env.advance();
            if env.stage() == EnvelopeStage::Decay {
                break;
            }
        }
        assert_eq!(env.stage(), EnvelopeStage::Decay);

        for _ in 0..5000 {
            env.advance();
            if env.stage() == EnvelopeStage::Sustain {
                break;
            }
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert!((env.level() - 0.5).abs() < 0.01);

        env.gate_off();
        assert_eq!(env.stage(), EnvelopeStage::Release);

        for _ in 0..20000 {
            env.advance();
            if env.stage() == EnvelopeStage::Idle {
                break;
            }
        }
        assert_eq!(env.stage(), EnvelopeStage::Idle);
    }

    #[test]
    fn attack_plus_decay_reaches_sustain_in_time() {
        let attack_ms = 10.0;
        let decay_ms = 50.0;
        let sustain = 0.6;
        let mut env = env_with(attack_ms, decay_ms, sustain, 100.0);
        env.gate_on();

        // attack_ms/decay_ms are time constants: the attack completes in
        // ~1.8 tau (overshoot target) and the decay settles within epsilon
        // of sustain in ~8 tau.
        let budget = ((attack_ms + decay_ms) * 48.0) as usize * 9;
        let mut reached_at = None;
        for n in 0..budget {
            env.advance();
            if env.stage() == EnvelopeStage::Sustain
                || (env.stage() == EnvelopeStage::Decay && env.level() <= sustain / 0.999)
            {
                reached_at = Some(n);
                break;
            }
        }
        assert!(reached_at.is_some(), "never settled near sustain");
    }

    #[test]
    fn release_reaches_silence_within_budget() {
        let release_ms = 100.0;
        let mut env = env_with(1.0, 1.0, 0.8, release_ms);
        env.gate_on();
        for _ in 0..2000 {
            env.advance();
        }
        env.gate_off();

        // Exponential release from 0.8: reaching 1e-3 takes
        // ln(800) ~ 6.7 time constants; allow 7 tau plus 5% headroom.
        let budget = (release_ms * 48.0 * 7.0 * 1.05) as usize;
        let mut done = false;
        for _ in 0..budget {
            if env.advance() < 1e-3 {
                done = true;
                break;
            }
        }
        assert!(done, "release did not reach silence, level {}", env.level());
    }

    #[test]
    fn release_from_attack_stage() {
        let mut env = env_with(100.0, 100.0, 0.7, 10.0);
        env.gate_on();
        for _ in 0..100 {
            env.advance();
        }
        // Still attacking; note off must go straight to release.
        assert_eq!(env.stage(), EnvelopeStage::Attack);
        env.gate_off();
        assert_eq!(env.stage(), EnvelopeStage::Release);
    }

    #[test]
    fn retrigger_keeps_level() {
        let mut env = env_with(5.0, 50.0, 0.7, 50.0);
        env.gate_on();
        for _ in 0..200 {
            env.advance();
        }
        let before = env.level();
        env.gate_on();
        assert_eq!(env.level(), before, "retrigger must not reset the level");
    }

    #[test]
    fn level_bounded() {
        let mut env = env_with(2.0, 10.0, 0.5, 20.0);
        env.gate_on();
        for _ in 0..5000 {
            let level = env.advance();
            assert!((0.0..=1.0).contains(&level), "level {}", level);
        }
        env.gate_off();
        for _ in 0..50000 {
            let level = env.advance();
            assert!((0.0..=1.0).contains(&level));
        }
    }

    #[test]
    fn set_times_is_idempotent() {
        let mut env = AdsrEnvelope::new(48000.0);
        let times = AdsrTimes::default();
        env.set_times(times);
        let coeff = env.attack_coeff;
        env.set_times(times);
        assert_eq!(env.attack_coeff, coeff);
    }
}
