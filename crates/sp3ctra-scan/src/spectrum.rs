//! FFT magnitudes of the luminance line.
//!
//! Optional preprocessor output for hosts that visualize or analyze the
//! scanned material. Runs on the network thread, never in the audio path.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Forward FFT with a Hann window and preallocated scratch.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    size: usize,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl SpectrumAnalyzer {
    /// Create an analyzer for transforms of `size` points.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let window = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect();
        Self {
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); size],
            size,
        }
    }

    /// Transform size in points.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of magnitude bins produced (`size / 2`).
    pub fn bins(&self) -> usize {
        self.size / 2
    }

    /// Compute windowed magnitudes of `input` into a fresh buffer.
    ///
    /// Input shorter than the transform size is zero-padded; longer input
    /// is truncated. Magnitudes are normalized by the transform size.
    pub fn magnitudes(&mut self, input: &[f32]) -> Box<[f32]> {
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = input.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let norm = 1.0 / self.size as f32;
        self.scratch[..self.bins()]
            .iter()
            .map(|c| c.norm() * norm)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_line_concentrates_in_bin_zero() {
        let mut analyzer = SpectrumAnalyzer::new(64);
        let mags = analyzer.magnitudes(&[1.0; 64]);
        let rest: f32 = mags[1..].iter().sum();
        assert!(mags[0] > rest, "DC bin {} vs rest {}", mags[0], rest);
    }

    #[test]
    fn sinusoid_peaks_at_its_bin() {
        let size = 128;
        let mut analyzer = SpectrumAnalyzer::new(size);
        let cycles = 8.0;
        let input: Vec<f32> = (0..size)
            .map(|i| (2.0 * PI * cycles * i as f32 / size as f32).sin())
            .collect();
        let mags = analyzer.magnitudes(&input);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 8);
    }

    #[test]
    fn short_input_zero_padded() {
        let mut analyzer = SpectrumAnalyzer::new(64);
        let mags = analyzer.magnitudes(&[1.0; 16]);
        assert_eq!(mags.len(), 32);
        assert!(mags.iter().all(|m| m.is_finite()));
    }
}
