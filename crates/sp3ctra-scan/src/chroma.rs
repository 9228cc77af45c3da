//! Chromatic stereo panning.
//!
//! Each note's average color is collapsed into a scalar "temperature":
//! blue-leaning notes pan one way, red-leaning the other, with a
//! cyan/yellow axis as a secondary weight. A signed power curve pushes
//! temperatures toward the extremes so mildly tinted material still spreads
//! across the stereo field.
//!
//! ```text
//! T = amp * (w_br * (B - R) + w_cy * ((G+B)/2 - (R+G)/2))
//! pan = clamp(sign(T) * |T|^exponent, -1, 1)
//! ```
//!
//! Channel means are normalized to [0, 1] before weighting.

use sp3ctra_core::{constant_power_gains, signed_pow};

/// Stereo panning law for converting pan positions into channel gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanLaw {
    /// Constant-power: `l = cos(pi/4 (p+1))`, `r = sin(pi/4 (p+1))`.
    #[default]
    ConstantPower,
    /// Linear crossfade: `l = (1-p)/2`, `r = (1+p)/2`.
    Linear,
}

/// Tuning for the color-temperature pan mapping.
#[derive(Debug, Clone, Copy)]
pub struct ChromaConfig {
    /// Weight of the blue-minus-red axis.
    pub blue_red_weight: f32,
    /// Weight of the cyan-minus-yellow axis.
    pub cyan_yellow_weight: f32,
    /// Gain applied to the raw temperature before the curve.
    pub amplification: f32,
    /// Signed power-curve exponent; below 1 pushes toward the extremes.
    pub curve_exponent: f32,
    /// Pan law used for gain conversion.
    pub law: PanLaw,
    /// |pan| below which the center boost applies.
    pub center_threshold: f32,
    /// Gain multiplier inside the center region.
    pub center_boost: f32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            blue_red_weight: 1.0,
            cyan_yellow_weight: 0.5,
            amplification: 2.0,
            curve_exponent: 0.7,
            law: PanLaw::ConstantPower,
            center_threshold: 0.1,
            center_boost: 1.0,
        }
    }
}

/// Pan position in [-1, 1] for a note's average RGB (byte means).
pub fn note_pan(r_mean: f32, g_mean: f32, b_mean: f32, cfg: &ChromaConfig) -> f32 {
    let r = r_mean / 255.0;
    let g = g_mean / 255.0;
    let b = b_mean / 255.0;

    let blue_red = b - r;
    let cyan_yellow = (g + b) * 0.5 - (r + g) * 0.5;
    let temperature = cfg.amplification * (cfg.blue_red_weight * blue_red
        + cfg.cyan_yellow_weight * cyan_yellow);

    signed_pow(temperature.clamp(-1.0, 1.0), cfg.curve_exponent).clamp(-1.0, 1.0)
}

/// Stereo gains for a pan position.
///
/// Inside the center region both channels are boosted by `center_boost` to
/// preserve perceived loudness where constant-power dips.
pub fn pan_gains(pan: f32, cfg: &ChromaConfig) -> (f32, f32) {
    let p = pan.clamp(-1.0, 1.0);
    let (mut left, mut right) = match cfg.law {
        PanLaw::ConstantPower => constant_power_gains(p),
        PanLaw::Linear => ((1.0 - p) * 0.5, (1.0 + p) * 0.5),
    };
    if p.abs() < cfg.center_threshold {
        left *= cfg.center_boost;
        right *= cfg.center_boost;
    }
    (left, right)
}
