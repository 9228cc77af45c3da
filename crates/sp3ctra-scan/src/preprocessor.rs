//! The preprocessing stage.
//!
//! Runs on the network thread as the [`LineSink`] of the UDP receiver.
//! Ordering is fixed: raw RGB first (copy out of the line double-buffer),
//! then every derived quantity from that one copy, so grayscale and pan are
//! always computed from the same pixels, so panning can never desynchronize
//! from color.

use crate::chroma::{ChromaConfig, note_pan, pan_gains};
use crate::frame::{DmxColor, FrameStore, PreprocessedFrame};
use crate::luminance;
use crate::pan_table::PanGainsTable;
use crate::spectrum::SpectrumAnalyzer;
use sp3ctra_ingest::{LineDoubleBuffer, LineSink};
use std::sync::Arc;

/// Static preprocessing configuration.
#[derive(Debug, Clone)]
pub struct PreprocessorConfig {
    /// Contiguous pixels averaged into one note.
    pub pixels_per_note: usize,
    /// Optional gamma correction exponent.
    pub gamma: Option<f32>,
    /// Invert luminance for white-background material.
    pub invert_background: bool,
    /// Enable chromatic stereo panning; disabled pins every note center.
    pub stereo_enabled: bool,
    /// Color-temperature pan tuning.
    pub chroma: ChromaConfig,
    /// FFT size for the optional spectrum output; `None` disables it.
    pub spectrum_size: Option<usize>,
    /// Number of DMX lighting zones to sample; 0 disables.
    pub dmx_zones: usize,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            pixels_per_note: 2,
            gamma: None,
            invert_background: false,
            stereo_enabled: true,
            chroma: ChromaConfig::default(),
            spectrum_size: None,
            dmx_zones: 0,
        }
    }
}

/// Converts assembled RGB lines into published frames and pan gains.
pub struct Preprocessor {
    cfg: PreprocessorConfig,
    pixels: usize,
    notes: usize,

    // Scratch, allocated once.
    r: Vec<u8>,
    g: Vec<u8>,
    b: Vec<u8>,
    grayscale: Vec<f32>,
    wave: Vec<f32>,
    pans: Vec<f32>,
    gains_left: Vec<f32>,
    gains_right: Vec<f32>,

    pan_table: Arc<PanGainsTable>,
    frames: Arc<FrameStore>,
    analyzer: Option<SpectrumAnalyzer>,
    sequence: u64,
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor")
            .field("pixels", &self.pixels)
            .field("notes", &self.notes)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl Preprocessor {
    /// Create a preprocessor for lines of `pixels` pixels.
    ///
    /// `notes = pixels / pixels_per_note`; the config is validated upstream
    /// so the division is exact.
    pub fn new(
        cfg: PreprocessorConfig,
        pixels: usize,
        pan_table: Arc<PanGainsTable>,
        frames: Arc<FrameStore>,
    ) -> Self {
        let notes = pixels / cfg.pixels_per_note;
        let analyzer = cfg.spectrum_size.map(SpectrumAnalyzer::new);
        Self {
            pixels,
            notes,
            r: vec![0; pixels],
            g: vec![0; pixels],
            b: vec![0; pixels],
            grayscale: vec![0.0; notes],
            wave: vec![0.0; pixels],
            pans: vec![0.0; notes],
            gains_left: vec![0.0; notes],
            gains_right: vec![0.0; notes],
            pan_table,
            frames,
            analyzer,
            sequence: 0,
            cfg,
        }
    }

    /// Notes derived per line.
    pub fn notes(&self) -> usize {
        self.notes
    }

    /// Run the full pipeline on the copied RGB scratch and publish.
    fn process_current_line(&mut self) {
        luminance::fill_note_grayscale(
            &self.r,
            &self.g,
            &self.b,
            self.cfg.pixels_per_note,
            &mut self.grayscale,
        );
        if let Some(gamma) = self.cfg.gamma {
            luminance::apply_gamma(&mut self.grayscale, gamma);
        }
        if self.cfg.invert_background {
            luminance::invert_background(&mut self.grayscale);
        }
        luminance::fill_wave(&self.r, &self.g, &self.b, &mut self.wave);
        if self.cfg.invert_background {
            for w in &mut self.wave {
                *w = -*w;
            }
        }
        let contrast = luminance::rms_contrast(&self.grayscale);

        self.compute_pans();
        self.pan_table.write(&self.gains_left, &self.gains_right);

        let spectrum = self
            .analyzer
            .as_mut()
            .map(|analyzer| analyzer.magnitudes(&self.wave));

        self.sequence += 1;
        let frame = PreprocessedFrame {
            grayscale: self.grayscale.clone().into_boxed_slice(),
            wave: self.wave.clone().into_boxed_slice(),
            pan: self.pans.clone().into_boxed_slice(),
            contrast,
            sequence: self.sequence,
            spectrum,
            dmx: self.sample_dmx(),
        };
        self.frames.publish(Arc::new(frame));
    }

    fn compute_pans(&mut self) {
        let ppn = self.cfg.pixels_per_note;
        for note in 0..self.notes {
            let pan = if self.cfg.stereo_enabled {
                let start = note * ppn;
                let mut r_sum = 0.0;
                let mut g_sum = 0.0;
                let mut b_sum = 0.0;
                for i in start..start + ppn {
                    r_sum += self.r[i] as f32;
                    g_sum += self.g[i] as f32;
                    b_sum += self.b[i] as f32;
                }
                let inv = 1.0 / ppn as f32;
                note_pan(r_sum * inv, g_sum * inv, b_sum * inv, &self.cfg.chroma)
            } else {
                0.0
            };
            self.pans[note] = pan;
            let (l, r) = pan_gains(pan, &self.cfg.chroma);
            self.gains_left[note] = l;
            self.gains_right[note] = r;
        }
    }

    fn sample_dmx(&self) -> Box<[DmxColor]> {
        if self.cfg.dmx_zones == 0 {
            return Box::default();
        }
        let zone_width = self.pixels / self.cfg.dmx_zones;
        (0..self.cfg.dmx_zones)
            .map(|zone| {
                let start = zone * zone_width;
                let end = start + zone_width;
                let mut r = 0u32;
                let mut g = 0u32;
                let mut b = 0u32;
                for i in start..end {
                    r += u32::from(self.r[i]);
                    g += u32::from(self.g[i]);
                    b += u32::from(self.b[i]);
                }
                let n = zone_width as u32;
                DmxColor {
                    r: (r / n) as u8,
                    g: (g / n) as u8,
                    b: (b / n) as u8,
                }
            })
            .collect()
    }
}

impl LineSink for Preprocessor {
    fn line_ready(&mut self, buffer: &LineDoubleBuffer) {
        buffer
            .read()
            .copy_into(&mut self.r, &mut self.g, &mut self.b);
        self.process_current_line();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_line(cfg: PreprocessorConfig, pixels: usize, fill: impl Fn(usize) -> (u8, u8, u8)) -> (Arc<PreprocessedFrame>, Arc<PanGainsTable>) {
        let notes = pixels / cfg.pixels_per_note;
        let pan_table = Arc::new(PanGainsTable::new(notes));
        let frames = Arc::new(FrameStore::new(notes, pixels));
        let mut pre = Preprocessor::new(cfg, pixels, Arc::clone(&pan_table), Arc::clone(&frames));

        for i in 0..pixels {
            let (r, g, b) = fill(i);
            pre.r[i] = r;
            pre.g[i] = g;
            pre.b[i] = b;
        }
        pre.process_current_line();
        (frames.load(), pan_table)
    }

    #[test]
    fn uniform_gray_line_centers_and_flattens() {
        let (frame, gains) = run_line(PreprocessorConfig::default(), 32, |_| (128, 128, 128));

        assert_eq!(frame.sequence, 1);
        assert!(frame.contrast < 1e-6);
        for &v in frame.grayscale.iter() {
            assert!((v - 128.0).abs() < 0.5);
        }
        let g = gains.load();
        for i in 0..g.len() {
            assert!(
                (g.left(i) - g.right(i)).abs() < 1e-6,
                "gray must pan center"
            );
        }
    }

    #[test]
    fn red_left_blue_right_splits_the_field() {
        let (frame, _) = run_line(PreprocessorConfig::default(), 32, |i| {
            if i < 16 { (255, 0, 0) } else { (0, 0, 255) }
        });

        let notes = frame.pan.len();
        for note in 0..notes / 2 {
            assert!(frame.pan[note] < -0.3, "left half warm, got {}", frame.pan[note]);
        }
        for note in notes / 2..notes {
            assert!(frame.pan[note] > 0.3, "right half cold, got {}", frame.pan[note]);
        }
    }

    #[test]
    fn stereo_disabled_pins_center() {
        let cfg = PreprocessorConfig {
            stereo_enabled: false,
            ..PreprocessorConfig::default()
        };
        let (frame, _) = run_line(cfg, 16, |i| if i % 2 == 0 { (255, 0, 0) } else { (0, 0, 255) });
        assert!(frame.pan.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn inversion_turns_black_loud() {
        let cfg = PreprocessorConfig {
            invert_background: true,
            ..PreprocessorConfig::default()
        };
        let (frame, _) = run_line(cfg, 16, |_| (0, 0, 0));
        assert!(frame.grayscale.iter().all(|&v| (v - 255.0).abs() < 0.01));
    }

    #[test]
    fn spectrum_present_when_enabled() {
        let cfg = PreprocessorConfig {
            spectrum_size: Some(16),
            ..PreprocessorConfig::default()
        };
        let (frame, _) = run_line(cfg, 32, |i| ((i * 8) as u8, 0, 0));
        let spectrum = frame.spectrum.as_ref().expect("spectrum enabled");
        assert_eq!(spectrum.len(), 8);
    }

    #[test]
    fn dmx_zones_average_colors() {
        let cfg = PreprocessorConfig {
            dmx_zones: 2,
            ..PreprocessorConfig::default()
        };
        let (frame, _) = run_line(cfg, 32, |i| {
            if i < 16 { (200, 0, 0) } else { (0, 0, 200) }
        });
        assert_eq!(frame.dmx.len(), 2);
        assert_eq!(frame.dmx[0], DmxColor { r: 200, g: 0, b: 0 });
        assert_eq!(frame.dmx[1], DmxColor { r: 0, g: 0, b: 200 });
    }

    #[test]
    fn sink_reads_published_line() {
        use sp3ctra_ingest::packet::ImageFragment;
        use sp3ctra_ingest::{IngestStats, LineAssembler};

        let pixels = 16;
        let buffer = Arc::new(LineDoubleBuffer::new(pixels));
        let stats = Arc::new(IngestStats::default());
        let mut asm = LineAssembler::new(Arc::clone(&buffer), stats);

        let pan_table = Arc::new(PanGainsTable::new(8));
        let frames = Arc::new(FrameStore::new(8, pixels));
        let mut pre = Preprocessor::new(
            PreprocessorConfig::default(),
            pixels,
            pan_table,
            Arc::clone(&frames),
        );

        let payload = [200u8; 16];
        asm.accept(&ImageFragment {
            line_id: 1,
            fragment_id: 0,
            total_fragments: 1,
            fragment_size: 16,
            r: &payload,
            g: &payload,
            b: &payload,
        });
        pre.line_ready(&buffer);

        let frame = frames.load();
        assert_eq!(frame.sequence, 1);
        assert!((frame.grayscale[0] - 200.0).abs() < 0.5);
    }
}
