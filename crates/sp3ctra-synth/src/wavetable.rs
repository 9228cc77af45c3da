//! Wavetable position transforms and interpolation.
//!
//! The wavetable engine reads the current image line at a fractional
//! position derived from each voice's phase. Three scan modes map phase to
//! position; two interpolators trade smoothness for cost.

/// Direction the wavetable is scanned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Phase 0 at the left edge, increasing rightward.
    #[default]
    LeftToRight,
    /// Phase 0 at the right edge, increasing leftward.
    RightToLeft,
    /// Ping-pong: out and back within one period.
    Dual,
}

/// Map a phase in [0, 1) to a fractional read position in [0, len).
#[inline]
pub fn scan_position(phase: f32, len: usize, direction: ScanMode) -> f32 {
    let n = len as f32;
    let pos = match direction {
        ScanMode::LeftToRight => phase * n,
        ScanMode::RightToLeft => (n - 1.0) - phase * n,
        ScanMode::Dual => {
            if phase < 0.5 {
                2.0 * phase * n
            } else {
                (1.0 - 2.0 * (phase - 0.5)) * n
            }
        }
    };
    pos.clamp(0.0, n - f32::EPSILON * n).max(0.0)
}

/// Sample `wave` at fractional `pos` with linear interpolation.
///
/// The table is treated as one period: reads past the last sample wrap to
/// the first.
#[inline]
pub fn sample_linear(wave: &[f32], pos: f32) -> f32 {
    let len = wave.len();
    let i = pos as usize % len;
    let frac = pos - pos as usize as f32;
    let next = (i + 1) % len;
    wave[i] + (wave[next] - wave[i]) * frac
}

/// Sample `wave` at fractional `pos` with 4-point Catmull-Rom interpolation.
#[inline]
pub fn sample_cubic(wave: &[f32], pos: f32) -> f32 {
    let len = wave.len();
    let i = pos as usize % len;
    let frac = pos - pos as usize as f32;

    let p0 = wave[(i + len - 1) % len];
    let p1 = wave[i];
    let p2 = wave[(i + 1) % len];
    let p3 = wave[(i + 2) % len];

    let t = frac;
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

/// Sample with either interpolator.
#[inline]
pub fn sample_wave(wave: &[f32], pos: f32, cubic: bool) -> f32 {
    if cubic {
        sample_cubic(wave, pos)
    } else {
        sample_linear(wave, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_to_right_spans_table() {
        assert_eq!(scan_position(0.0, 100, ScanMode::LeftToRight), 0.0);
        let end = scan_position(0.999, 100, ScanMode::LeftToRight);
        assert!(end > 99.0 && end < 100.0);
    }

    #[test]
    fn right_to_left_mirrors() {
        let fwd = scan_position(0.25, 100, ScanMode::LeftToRight);
        let rev = scan_position(0.25, 100, ScanMode::RightToLeft);
        assert!((fwd + rev - 99.0).abs() < 1.0);
    }

    #[test]
    fn dual_returns_to_start() {
        let start = scan_position(0.0, 100, ScanMode::Dual);
        let mid = scan_position(0.5, 100, ScanMode::Dual);
        let near_end = scan_position(0.999, 100, ScanMode::Dual);
        assert!(start < 1.0);
        assert!(mid > 99.0);
        assert!(near_end < 1.0, "ping-pong must come back, got {near_end}");
    }

    #[test]
    fn linear_hits_sample_points() {
        let wave = [0.0, 1.0, 0.0, -1.0];
        assert_eq!(sample_linear(&wave, 1.0), 1.0);
        assert_eq!(sample_linear(&wave, 3.0), -1.0);
    }

    #[test]
    fn linear_interpolates_midpoints() {
        let wave = [0.0, 1.0];
        assert!((sample_linear(&wave, 0.5) - 0.5).abs() < 1e-6);
        // Wraps from last back to first
        assert!((sample_linear(&wave, 1.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cubic_hits_sample_points() {
        let wave = [0.3, -0.7, 0.9, 0.1, -0.2];
        for (i, &v) in wave.iter().enumerate() {
            let s = sample_cubic(&wave, i as f32);
            assert!((s - v).abs() < 1e-6, "cubic at integer {} gave {}", i, s);
        }
    }

    #[test]
    fn cubic_smoother_than_linear_on_ramp() {
        // On a pure ramp both should be near-exact mid-segment.
        let wave: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let lin = sample_linear(&wave, 3.5);
        let cub = sample_cubic(&wave, 3.5);
        assert!((lin - 3.5).abs() < 1e-6);
        assert!((cub - 3.5).abs() < 1e-4);
    }

    #[test]
    fn interpolators_bounded_on_signed_wave() {
        let wave: Vec<f32> = (0..64)
            .map(|i| (i as f32 * 0.37).sin())
            .collect();
        for step in 0..640 {
            let pos = step as f32 * 0.1;
            assert!(sample_linear(&wave, pos).abs() <= 1.0);
            // Catmull-Rom can overshoot slightly between points
            assert!(sample_cubic(&wave, pos).abs() <= 1.2);
        }
    }
}
