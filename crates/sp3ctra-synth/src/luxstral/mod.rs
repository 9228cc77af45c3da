//! LuxStral - the additive synthesis engine.
//!
//! A bank of N fixed-frequency sinusoidal oscillators whose amplitudes
//! track per-note luminance. Per block:
//!
//! 1. load one preprocessed frame and one pan-gains snapshot
//! 2. optional relative mode: shift the quietest note to zero
//! 3. publish the frame's contrast factor for the auto-volume controller
//! 4. render all oscillators across the worker pool (volume ramps, integer
//!    phase table lookups, stereo accumulation)
//! 5. normalize by the precomputed bank gain, apply the perceptual
//!    volume-weighting exponent, then the soft limiter
//!
//! The normalization happens before the weighting and limiter so the
//! output bound is independent of the bank size.

mod bank;
mod worker;

pub use bank::{BankSpec, MIN_TABLE_LEN, Partition, WAVE_AMP, note_frequency, partition_counts};

use sp3ctra_core::{AtomicF32, signed_pow, soft_limit};
use sp3ctra_scan::{GainBuffer, PreprocessedFrame};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use worker::WorkerPool;

/// Construction-time configuration of the engine.
#[derive(Debug, Clone, Copy)]
pub struct LuxStralConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f32,
    /// Number of oscillators (one per note).
    pub notes: usize,
    /// Lowest fundamental in Hz.
    pub low_freq: f32,
    /// Highest fundamental in Hz.
    pub high_freq: f32,
    /// Initial attack time constant in ms.
    pub attack_ms: f32,
    /// Initial release time constant in ms.
    pub release_ms: f32,
    /// Worker threads; clamped to at least 1.
    pub workers: usize,
    /// Largest block the engine will be asked to render.
    pub max_block: usize,
}

impl Default for LuxStralConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            notes: 864,
            low_freq: 65.0,
            high_freq: 12000.0,
            attack_ms: 10.0,
            release_ms: 50.0,
            workers: default_workers(),
            max_block: 1024,
        }
    }
}

/// Default worker count: hardware parallelism capped at 8.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

/// Runtime parameters read once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuxStralBlockParams {
    /// Grayscale-to-volume scale (default 1/255 maps 255 to unit volume).
    pub volume_scale: f32,
    /// Subtract the bank minimum before scaling (contrast enhancement).
    pub relative_mode: bool,
    /// Contrast floor below which relative mode stands down, so flat lines
    /// are not stretched into noise.
    pub contrast_min: f32,
    /// Perceptual volume-weighting exponent applied post-normalization.
    pub volume_weighting_exp: f32,
    /// Soft limiter threshold.
    pub soft_limit_threshold: f32,
    /// Soft limiter knee width.
    pub soft_limit_knee: f32,
    /// Attack time constant in ms.
    pub attack_ms: f32,
    /// Release time constant in ms.
    pub release_ms: f32,
}

impl Default for LuxStralBlockParams {
    fn default() -> Self {
        Self {
            volume_scale: 1.0 / 255.0,
            relative_mode: false,
            contrast_min: 0.0,
            volume_weighting_exp: 1.0,
            soft_limit_threshold: 0.8,
            soft_limit_knee: 0.2,
            attack_ms: 10.0,
            release_ms: 50.0,
        }
    }
}

/// The additive engine.
pub struct LuxStral {
    pool: WorkerPool,
    notes: usize,
    /// 1 / (N * WAVE_AMP): maps the full-scale bank sum into [-1, 1].
    norm_gain: f32,
    /// Contrast of the last rendered frame, for the auto-volume controller.
    contrast_out: Arc<AtomicF32>,
    /// Sequence of the last frame seen, to spot stale feeds in telemetry.
    last_sequence: u64,
    stale_blocks: u64,
}

impl std::fmt::Debug for LuxStral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuxStral")
            .field("notes", &self.notes)
            .field("workers", &self.pool.workers())
            .finish_non_exhaustive()
    }
}

impl LuxStral {
    /// Build the oscillator bank and spawn the worker pool.
    pub fn new(cfg: &LuxStralConfig) -> Self {
        let workers = cfg.workers.max(1);
        let spec = BankSpec {
            sample_rate: cfg.sample_rate,
            notes: cfg.notes,
            low_freq: cfg.low_freq,
            high_freq: cfg.high_freq,
            attack_ms: cfg.attack_ms,
            release_ms: cfg.release_ms,
        };
        let partitions: Vec<Partition> = partition_counts(cfg.notes, workers)
            .into_iter()
            .map(|(start, count)| Partition::build(start, count, &spec))
            .collect();

        tracing::info!(
            notes = cfg.notes,
            workers,
            low_freq = cfg.low_freq,
            high_freq = cfg.high_freq,
            "luxstral bank initialized"
        );

        Self {
            pool: WorkerPool::spawn(partitions, cfg.max_block),
            notes: cfg.notes,
            norm_gain: 1.0 / (cfg.notes as f32 * WAVE_AMP),
            contrast_out: Arc::new(AtomicF32::new(0.0)),
            last_sequence: 0,
            stale_blocks: 0,
        }
    }

    /// Handle the auto-volume controller reads contrast from.
    pub fn contrast_handle(&self) -> Arc<AtomicF32> {
        Arc::clone(&self.contrast_out)
    }

    /// Number of oscillators.
    pub fn notes(&self) -> usize {
        self.notes
    }

    /// Blocks rendered from an unchanged frame (stale feed telemetry).
    pub fn stale_blocks(&self) -> u64 {
        self.stale_blocks
    }

    /// Blocks where a worker failed to deliver its partial.
    pub fn worker_incidents(&self) -> u64 {
        self.pool.incident_count()
    }

    /// Render one stereo block into `out_l` / `out_r` (overwritten).
    pub fn render_block(
        &mut self,
        frame: &Arc<PreprocessedFrame>,
        gains: &Arc<GainBuffer>,
        params: &LuxStralBlockParams,
        out_l: &mut [f32],
        out_r: &mut [f32],
    ) {
        debug_assert_eq!(out_l.len(), out_r.len());
        out_l.fill(0.0);
        out_r.fill(0.0);

        if frame.sequence == self.last_sequence {
            self.stale_blocks += 1;
        } else {
            self.last_sequence = frame.sequence;
        }

        let floor = if params.relative_mode && frame.contrast >= params.contrast_min {
            frame
                .grayscale
                .iter()
                .copied()
                .fold(f32::INFINITY, f32::min)
                .max(0.0)
        } else {
            0.0
        };

        self.contrast_out.store(frame.contrast, Ordering::Release);

        self.pool
            .render_block(frame, gains, params, floor, out_l, out_r);

        let norm = self.norm_gain;
        let w = params.volume_weighting_exp;
        let threshold = params.soft_limit_threshold;
        let knee = params.soft_limit_knee;
        let shape = (w - 1.0).abs() > 1e-6;
        for n in 0..out_l.len() {
            let mut l = out_l[n] * norm;
            let mut r = out_r[n] * norm;
            if shape {
                l = signed_pow(l, w);
                r = signed_pow(r, w);
            }
            out_l[n] = soft_limit(l, threshold, knee);
            out_r[n] = soft_limit(r, threshold, knee);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp3ctra_scan::{FrameStore, PanGainsTable};

    fn frame_with_grayscale(notes: usize, value: f32) -> Arc<PreprocessedFrame> {
        let mut frame = PreprocessedFrame::silent(notes, notes * 2);
        for v in frame.grayscale.iter_mut() {
            *v = value;
        }
        frame.sequence = 1;
        frame.contrast = 0.25;
        Arc::new(frame)
    }

    fn small_engine(notes: usize, workers: usize) -> LuxStral {
        LuxStral::new(&LuxStralConfig {
            notes,
            workers,
            attack_ms: 1.0,
            release_ms: 5.0,
            ..LuxStralConfig::default()
        })
    }

    fn render_blocks(
        engine: &mut LuxStral,
        frame: &Arc<PreprocessedFrame>,
        gains: &Arc<sp3ctra_scan::GainBuffer>,
        blocks: usize,
        block_len: usize,
    ) -> (Vec<f32>, Vec<f32>) {
        let mut all_l = Vec::new();
        let mut all_r = Vec::new();
        let mut l = vec![0.0; block_len];
        let mut r = vec![0.0; block_len];
        let params = LuxStralBlockParams::default();
        for _ in 0..blocks {
            engine.render_block(frame, gains, &params, &mut l, &mut r);
            all_l.extend_from_slice(&l);
            all_r.extend_from_slice(&r);
        }
        (all_l, all_r)
    }

    #[test]
    fn uniform_line_is_audible_bounded_and_centered() {
        // End-to-end scenario: DPI 200, pixels_per_note 2 -> N = 864.
        let notes = 864;
        let mut engine = small_engine(notes, 4);
        let frame = frame_with_grayscale(notes, 128.0);
        let gains = Arc::new(PanGainsTable::new(notes)).load();

        let (l, r) = render_blocks(&mut engine, &frame, &gains, 40, 128);

        let peak_l = l.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(peak_l > 1e-4, "output should be non-silent, peak {peak_l}");
        assert!(peak_l < 1.0, "output must stay below full scale");

        // Constant color means center pan: channels identical.
        for (a, b) in l.iter().zip(r.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn full_scale_bank_stays_limited() {
        let notes = 32;
        let mut engine = small_engine(notes, 2);
        let frame = frame_with_grayscale(notes, 255.0);
        // Hard-panned everything fully left to stress one channel.
        let table = PanGainsTable::new(notes);
        table.write(&vec![1.0; notes], &vec![0.0; notes]);
        let gains = table.load();

        let (l, _r) = render_blocks(&mut engine, &frame, &gains, 100, 128);
        let peak = l.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(peak <= 1.0, "soft limiter must bound output, peak {peak}");
    }

    #[test]
    fn relative_mode_silences_the_floor() {
        let notes = 8;
        let mut engine = small_engine(notes, 1);
        let gains = Arc::new(PanGainsTable::new(notes)).load();

        // All notes equal: relative mode shifts everything to zero.
        let frame = frame_with_grayscale(notes, 100.0);
        let params = LuxStralBlockParams {
            relative_mode: true,
            ..LuxStralBlockParams::default()
        };
        let mut l = vec![0.0; 256];
        let mut r = vec![0.0; 256];
        for _ in 0..50 {
            engine.render_block(&frame, &gains, &params, &mut l, &mut r);
        }
        let peak = l.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(peak < 1e-4, "uniform line in relative mode is silent, got {peak}");
    }

    #[test]
    fn relative_mode_stands_down_below_contrast_floor() {
        let notes = 8;
        let mut engine = small_engine(notes, 1);
        let gains = Arc::new(PanGainsTable::new(notes)).load();

        let mut frame = PreprocessedFrame::silent(notes, notes * 2);
        for v in frame.grayscale.iter_mut() {
            *v = 100.0;
        }
        frame.sequence = 1;
        frame.contrast = 0.01; // flat material
        let frame = Arc::new(frame);

        let params = LuxStralBlockParams {
            relative_mode: true,
            contrast_min: 0.1,
            ..LuxStralBlockParams::default()
        };
        let mut l = vec![0.0; 256];
        let mut r = vec![0.0; 256];
        for _ in 0..50 {
            engine.render_block(&frame, &gains, &params, &mut l, &mut r);
        }
        let peak = l.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(
            peak > 1e-4,
            "below the contrast floor the bank must keep its absolute volumes"
        );
    }

    #[test]
    fn contrast_published_each_block() {
        let notes = 8;
        let mut engine = small_engine(notes, 1);
        let contrast = engine.contrast_handle();
        let frame = frame_with_grayscale(notes, 50.0);
        let gains = Arc::new(PanGainsTable::new(notes)).load();

        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        engine.render_block(&frame, &gains, &LuxStralBlockParams::default(), &mut l, &mut r);
        assert!((contrast.load(Ordering::Acquire) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn stale_frames_counted_but_rendered() {
        let notes = 8;
        let mut engine = small_engine(notes, 1);
        let frame = frame_with_grayscale(notes, 128.0);
        let gains = Arc::new(PanGainsTable::new(notes)).load();

        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        for _ in 0..10 {
            engine.render_block(&frame, &gains, &LuxStralBlockParams::default(), &mut l, &mut r);
        }
        // First block saw sequence 1 as fresh, the other nine were stale.
        assert_eq!(engine.stale_blocks(), 9);
        // Still rendering audio from the last good line.
        assert!(l.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn pan_gains_split_the_image() {
        let notes = 16;
        let mut engine = small_engine(notes, 2);
        let frame = frame_with_grayscale(notes, 200.0);

        // Left half hard left, right half hard right.
        let table = PanGainsTable::new(notes);
        let mut left = vec![0.0; notes];
        let mut right = vec![0.0; notes];
        for i in 0..notes / 2 {
            left[i] = 1.0;
        }
        for i in notes / 2..notes {
            right[i] = 1.0;
        }
        table.write(&left, &right);
        let gains = table.load();

        let (l, r) = render_blocks(&mut engine, &frame, &gains, 30, 128);
        let energy_l: f32 = l.iter().map(|x| x * x).sum();
        let energy_r: f32 = r.iter().map(|x| x * x).sum();
        // Lower-frequency notes (left half of the bank) carry more energy
        // per oscillator count, but both channels must be non-silent and
        // same order of magnitude.
        assert!(energy_l > 0.0 && energy_r > 0.0);
    }

    #[test]
    fn frame_store_integration() {
        // The engine consumes whatever the store currently publishes.
        let notes = 8;
        let pixels = 16;
        let store = FrameStore::new(notes, pixels);
        let mut engine = small_engine(notes, 1);
        let gains = Arc::new(PanGainsTable::new(notes)).load();

        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        // Silent boot frame renders silence.
        let frame = store.load();
        for _ in 0..20 {
            engine.render_block(&frame, &gains, &LuxStralBlockParams::default(), &mut l, &mut r);
        }
        assert!(l.iter().all(|&x| x.abs() < 1e-6));

        store.publish(frame_with_grayscale(notes, 255.0));
        let frame = store.load();
        for _ in 0..20 {
            engine.render_block(&frame, &gains, &LuxStralBlockParams::default(), &mut l, &mut r);
        }
        assert!(l.iter().any(|&x| x.abs() > 1e-3));
    }
}
