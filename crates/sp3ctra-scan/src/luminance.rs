//! Luminance extraction from RGB scanner lines.
//!
//! Grayscale uses the perceptual weights 0.21 R + 0.72 G + 0.07 B. Values
//! stay in the scanner's byte range [0, 255] until the engines scale them;
//! the wavetable engine gets a pre-mapped signed copy instead.

use libm::{powf, sqrtf};

/// Perceptual luminance of one pixel, in [0, 255].
#[inline]
pub fn pixel_luminance(r: u8, g: u8, b: u8) -> f32 {
    0.21 * r as f32 + 0.72 * g as f32 + 0.07 * b as f32
}

/// Average luminance over `pixels_per_note` contiguous pixels per note.
///
/// `out` must hold `r.len() / pixels_per_note` entries; trailing pixels that
/// do not fill a whole note are ignored.
pub fn fill_note_grayscale(r: &[u8], g: &[u8], b: &[u8], pixels_per_note: usize, out: &mut [f32]) {
    debug_assert!(pixels_per_note >= 1);
    for (note, value) in out.iter_mut().enumerate() {
        let start = note * pixels_per_note;
        let mut sum = 0.0;
        for i in start..start + pixels_per_note {
            sum += pixel_luminance(r[i], g[i], b[i]);
        }
        *value = (sum / pixels_per_note as f32).clamp(0.0, 255.0);
    }
}

/// Per-pixel luminance mapped to a signed wavetable sample in [-1, 1].
pub fn fill_wave(r: &[u8], g: &[u8], b: &[u8], out: &mut [f32]) {
    for i in 0..out.len().min(r.len()) {
        out[i] = pixel_luminance(r[i], g[i], b[i]) / 127.5 - 1.0;
    }
}

/// Gamma-correct grayscale values in place: `v = 255 * (v/255)^gamma`.
pub fn apply_gamma(values: &mut [f32], gamma: f32) {
    for v in values.iter_mut() {
        *v = 255.0 * powf((*v / 255.0).clamp(0.0, 1.0), gamma);
    }
}

/// White-background inversion: `v = 255 - v`.
///
/// Selected when the scanned medium is dark marks on white paper, so ink
/// becomes loud instead of the page.
pub fn invert_background(values: &mut [f32]) {
    for v in values.iter_mut() {
        *v = 255.0 - *v;
    }
}

/// RMS contrast of a grayscale line, normalized to [0, 1].
///
/// Standard deviation around the line mean, divided by the maximum possible
/// deviation for byte data (127.5). A uniform line scores 0; a half-black
/// half-white line scores 1.
pub fn rms_contrast(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    (sqrtf(variance) / 127.5).clamp(0.0, 1.0)
}
