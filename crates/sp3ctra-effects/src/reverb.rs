//! Feedback-delay-network stereo reverb.
//!
//! Eight parallel delay lines with prime lengths (mutually non-resonant),
//! each with a first-order lowpass in its feedback path and a feedback gain
//! derived from the target reverb time:
//!
//! ```text
//! input -> predelay -+-> [delay 0] -> damp -> *g0 -+
//!                    +-> [delay 1] -> damp -> *g1 -+-> back into writes
//!                    ...                           |
//!           wet = 0.25 * sum(line outputs)  <------+
//! ```
//!
//! Room size scales both the line lengths (0.4..1.0 of their maximum) and
//! the decay time T60 (2..8 s); the per-line feedback gain follows
//! `g = 10^(-3 L / (T60 * rate))`, the per-sample decay raised to the line
//! length, close to 0.9 for long tails. Gains and line lengths move
//! through ~300 ms exponential smoothing so parameter steps never zipper.
//!
//! The fixed 0.25 output normalization counteracts the gain buildup of the
//! feedback loop; feedback gains are clamped strictly below 1 so every tail
//! decays.

use libm::powf;
use sp3ctra_core::{DelayRing, OnePole, SmoothedParam, flush_denormal};

/// Number of delay lines.
const LINE_COUNT: usize = 8;

/// Prime line lengths at the 44.1 kHz reference rate.
const LINE_TUNINGS_44K: [usize; LINE_COUNT] = [1117, 1193, 1277, 1361, 1423, 1493, 1559, 1621];

/// Reference rate the tunings were chosen at.
const REFERENCE_RATE: f32 = 44100.0;

/// Maximum predelay in milliseconds.
const MAX_PREDELAY_MS: f32 = 100.0;

/// Output normalization for the 8-line sum.
const OUTPUT_NORM: f32 = 0.25;

/// Smoothing time constant for feedback gains and line scaling.
const SMOOTHING_MS: f32 = 300.0;

/// Hard ceiling keeping every feedback gain strictly below 1.
const MAX_FEEDBACK: f32 = 0.9995;

/// Runtime reverb parameters, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    /// Scales line lengths (0.4..1.0) and T60 (2..8 s).
    pub roomsize: f32,
    /// High-frequency absorption; 0 bright, 1 dark.
    pub damping: f32,
    /// Stereo spread of the wet signal.
    pub width: f32,
    /// Predelay as a fraction of the 100 ms buffer.
    pub predelay: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            roomsize: 0.5,
            damping: 0.5,
            width: 1.0,
            predelay: 0.1,
        }
    }
}

/// The FDN reverb. Renders wet signal only.
pub struct Reverb {
    lines: [DelayRing; LINE_COUNT],
    damping_filters: [OnePole; LINE_COUNT],
    /// Smoothed per-line feedback gains.
    gains: [SmoothedParam; LINE_COUNT],
    /// Full-scale line lengths at the current sample rate.
    base_lengths: [usize; LINE_COUNT],
    /// Smoothed room scaling of the line lengths (0.4..1.0).
    room_scale: SmoothedParam,
    /// Smoothed predelay tap in samples.
    predelay_samples: SmoothedParam,
    predelay_l: DelayRing,
    predelay_r: DelayRing,
    width: f32,
    sample_rate: f32,
    params: ReverbParams,
}

impl std::fmt::Debug for Reverb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reverb")
            .field("sample_rate", &self.sample_rate)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn scale_to_rate(samples: usize, rate: f32) -> usize {
    ((samples as f32 * rate / REFERENCE_RATE) as usize).max(1)
}

/// T60 in seconds for a roomsize in [0, 1].
#[inline]
fn t60_seconds(roomsize: f32) -> f32 {
    2.0 + 6.0 * roomsize.clamp(0.0, 1.0)
}

/// Line-length scale for a roomsize in [0, 1].
#[inline]
fn room_scale_for(roomsize: f32) -> f32 {
    0.4 + 0.6 * roomsize.clamp(0.0, 1.0)
}

/// Damping control to lowpass coefficient: 0 -> 1.0 (open), 1 -> 0.2.
#[inline]
fn damping_alpha(damping: f32) -> f32 {
    1.0 - 0.8 * damping.clamp(0.0, 1.0)
}

impl Reverb {
    /// Allocate all lines at their maximum length for `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        let base_lengths: [usize; LINE_COUNT] =
            core::array::from_fn(|i| scale_to_rate(LINE_TUNINGS_44K[i], sample_rate));
        let lines: [DelayRing; LINE_COUNT] =
            core::array::from_fn(|i| DelayRing::new(base_lengths[i] + 1));
        let damping_filters: [OnePole; LINE_COUNT] = core::array::from_fn(|_| {
            let mut lp = OnePole::new(sample_rate, 4000.0);
            lp.set_alpha(damping_alpha(0.5));
            lp
        });

        let params = ReverbParams::default();
        let gains: [SmoothedParam; LINE_COUNT] = core::array::from_fn(|i| {
            let mut g = SmoothedParam::new(0.0, sample_rate, SMOOTHING_MS);
            g.set_immediate(Self::gain_for(
                base_lengths[i],
                room_scale_for(params.roomsize),
                t60_seconds(params.roomsize),
                sample_rate,
            ));
            g
        });

        let predelay_capacity = ((MAX_PREDELAY_MS / 1000.0 * sample_rate) as usize).max(1);
        let mut room_scale = SmoothedParam::new(0.0, sample_rate, SMOOTHING_MS);
        room_scale.set_immediate(room_scale_for(params.roomsize));
        let mut predelay_samples = SmoothedParam::new(0.0, sample_rate, SMOOTHING_MS);
        predelay_samples.set_immediate(params.predelay * predelay_capacity as f32);

        Self {
            lines,
            damping_filters,
            gains,
            base_lengths,
            room_scale,
            predelay_samples,
            predelay_l: DelayRing::new(predelay_capacity),
            predelay_r: DelayRing::new(predelay_capacity),
            width: params.width,
            sample_rate,
            params,
        }
    }

    /// Per-line feedback gain from line length and decay time.
    fn gain_for(base_length: usize, scale: f32, t60: f32, rate: f32) -> f32 {
        let length = base_length as f32 * scale;
        powf(10.0, -3.0 * length / (t60 * rate)).clamp(0.0, MAX_FEEDBACK)
    }

    /// Apply a parameter snapshot (once per block).
    ///
    /// New values only set smoothing targets; the transition happens over
    /// ~300 ms inside the render loop.
    pub fn apply_params(&mut self, params: &ReverbParams) {
        if *params == self.params {
            return;
        }
        let scale = room_scale_for(params.roomsize);
        let t60 = t60_seconds(params.roomsize);
        self.room_scale.set_target(scale);
        for i in 0..LINE_COUNT {
            self.gains[i].set_target(Self::gain_for(
                self.base_lengths[i],
                scale,
                t60,
                self.sample_rate,
            ));
        }
        let alpha = damping_alpha(params.damping);
        for lp in &mut self.damping_filters {
            lp.set_alpha(alpha);
        }
        self.predelay_samples
            .set_target(params.predelay.clamp(0.0, 1.0) * self.predelay_l.capacity() as f32);
        self.width = params.width.clamp(0.0, 1.0);
        self.params = *params;
    }

    /// Current parameters.
    pub fn params(&self) -> ReverbParams {
        self.params
    }

    /// Clear all delay and filter state.
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        for lp in &mut self.damping_filters {
            lp.reset();
        }
        self.predelay_l.clear();
        self.predelay_r.clear();
        for g in &mut self.gains {
            g.snap_to_target();
        }
        self.room_scale.snap_to_target();
        self.predelay_samples.snap_to_target();
    }

    /// Process one stereo sample; returns the wet pair.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        // Predelay both channels, then collapse to mono for the line bank.
        let pre_tap = self.predelay_samples.advance().max(0.0) as usize;
        self.predelay_l.write(left);
        self.predelay_r.write(right);
        let pre_l = self.predelay_l.read(pre_tap);
        let pre_r = self.predelay_r.read(pre_tap);
        let mono = (pre_l + pre_r) * 0.5;

        let scale = self.room_scale.advance();
        let mut wet_l = 0.0f32;
        let mut wet_r = 0.0f32;
        for i in 0..LINE_COUNT {
            let tap = ((self.base_lengths[i] as f32 * scale) as usize).max(1);
            let out = self.lines[i].read(tap);
            let damped = self.damping_filters[i].process(out);
            let gain = self.gains[i].advance();
            self.lines[i].write(flush_denormal(mono + damped * gain));

            if i % 2 == 0 {
                wet_l += out;
            } else {
                wet_r += out;
            }
        }
        wet_l *= OUTPUT_NORM;
        wet_r *= OUTPUT_NORM;

        // Mid/side width: width = 1 reproduces the raw pair.
        const HALF_SQRT2: f32 = core::f32::consts::FRAC_1_SQRT_2;
        let mid = (wet_l + wet_r) * HALF_SQRT2;
        let side = (wet_l - wet_r) * HALF_SQRT2 * self.width;
        ((mid + side) * HALF_SQRT2, (mid - side) * HALF_SQRT2)
    }

    /// Process a block of stereo samples into wet output buffers.
    pub fn process_block(
        &mut self,
        left_in: &[f32],
        right_in: &[f32],
        left_out: &mut [f32],
        right_out: &mut [f32],
    ) {
        debug_assert_eq!(left_in.len(), right_in.len());
        debug_assert_eq!(left_in.len(), left_out.len());
        for i in 0..left_in.len() {
            let (l, r) = self.process(left_in[i], right_in[i]);
            left_out[i] = l;
            right_out[i] = r;
        }
    }
}
