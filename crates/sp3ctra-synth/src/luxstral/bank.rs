//! Oscillator bank construction and per-partition rendering.
//!
//! Each note owns a precomputed one-period sine table whose integer length
//! `W = round(sample_rate / f)` makes the phase wrap exact: the oscillator's
//! real frequency is `sample_rate / W`, and the table is read-only after
//! init. Frequencies are log-spaced so equal note spans cover equal musical
//! intervals.

use libm::{expf, powf, sinf};

/// Peak amplitude of the precomputed tables.
pub const WAVE_AMP: f32 = 32767.0;

/// Minimum table length, bounding the highest playable note.
pub const MIN_TABLE_LEN: usize = 4;

/// Volume floor below which a fully released oscillator snaps to silence.
const SILENCE_EPSILON: f32 = 1e-5;

/// Log-spaced fundamental for note `i` of `n` in [low, high].
#[inline]
pub fn note_frequency(i: usize, n: usize, low: f32, high: f32) -> f32 {
    if n <= 1 {
        return low;
    }
    low * powf(high / low, i as f32 / (n - 1) as f32)
}

/// Per-sample smoothing coefficient for a time constant in milliseconds.
#[inline]
fn ramp_alpha(tau_ms: f32, sample_rate: f32) -> f32 {
    let samples = tau_ms / 1000.0 * sample_rate;
    1.0 - expf(-1.0 / samples.max(1.0))
}

/// Bank-wide construction parameters shared by every partition.
#[derive(Debug, Clone, Copy)]
pub struct BankSpec {
    /// Output sample rate in Hz.
    pub sample_rate: f32,
    /// Total notes in the bank.
    pub notes: usize,
    /// Lowest fundamental in Hz.
    pub low_freq: f32,
    /// Highest fundamental in Hz.
    pub high_freq: f32,
    /// Volume-ramp attack time constant in ms.
    pub attack_ms: f32,
    /// Volume-ramp release time constant in ms.
    pub release_ms: f32,
}

/// A contiguous range of the oscillator bank, owned by one worker.
///
/// Holds everything the range needs to render: tables, integer phase
/// accumulators, slewed volumes and per-note ramp coefficients. Mutable
/// state never crosses worker boundaries.
#[derive(Debug)]
pub struct Partition {
    /// Global index of the first note in this partition.
    start: usize,
    tables: Vec<Box<[f32]>>,
    phases: Vec<usize>,
    volumes: Vec<f32>,
    attack_alpha: Vec<f32>,
    release_alpha: Vec<f32>,
    frequencies: Vec<f32>,
    sample_rate: f32,
    attack_ms: f32,
    release_ms: f32,
}

impl Partition {
    /// Build the partition covering notes `start..start + count`.
    pub fn build(start: usize, count: usize, spec: &BankSpec) -> Self {
        let mut tables = Vec::with_capacity(count);
        let mut frequencies = Vec::with_capacity(count);
        for local in 0..count {
            let freq = note_frequency(start + local, spec.notes, spec.low_freq, spec.high_freq);
            let period = ((spec.sample_rate / freq).round() as usize).max(MIN_TABLE_LEN);
            let table: Box<[f32]> = (0..period)
                .map(|k| WAVE_AMP * sinf(core::f32::consts::TAU * k as f32 / period as f32))
                .collect();
            tables.push(table);
            frequencies.push(spec.sample_rate / period as f32);
        }

        let a = ramp_alpha(spec.attack_ms, spec.sample_rate);
        let r = ramp_alpha(spec.release_ms, spec.sample_rate);
        Self {
            start,
            tables,
            phases: vec![0; count],
            volumes: vec![0.0; count],
            attack_alpha: vec![a; count],
            release_alpha: vec![r; count],
            frequencies,
            sample_rate: spec.sample_rate,
            attack_ms: spec.attack_ms,
            release_ms: spec.release_ms,
        }
    }

    /// Global index of the first note.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Notes in this partition.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when the partition holds no notes.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Effective oscillator frequency of local note `i` (after integer
    /// period rounding).
    pub fn frequency(&self, i: usize) -> f32 {
        self.frequencies[i]
    }

    /// Update ramp coefficients when envelope times change.
    pub fn set_envelope_times(&mut self, attack_ms: f32, release_ms: f32) {
        if attack_ms == self.attack_ms && release_ms == self.release_ms {
            return;
        }
        self.attack_ms = attack_ms;
        self.release_ms = release_ms;
        let a = ramp_alpha(attack_ms, self.sample_rate);
        let r = ramp_alpha(release_ms, self.sample_rate);
        self.attack_alpha.fill(a);
        self.release_alpha.fill(r);
    }

    /// Render this partition's notes, accumulating into `l` / `r`.
    ///
    /// `grayscale` and the gain lookup are indexed globally; `floor` is the
    /// relative-mode minimum already computed over the whole bank.
    pub fn render(
        &mut self,
        grayscale: &[f32],
        floor: f32,
        volume_scale: f32,
        gains: impl Fn(usize) -> (f32, f32),
        l: &mut [f32],
        r: &mut [f32],
    ) {
        let block = l.len();
        for local in 0..self.len() {
            let global = self.start + local;
            let target = (grayscale.get(global).copied().unwrap_or(0.0) - floor).max(0.0)
                * volume_scale;

            let attack = self.attack_alpha[local];
            let release = self.release_alpha[local];
            let (gl, gr) = gains(global);
            let table = &self.tables[local];
            let period = table.len();
            let mut phase = self.phases[local];
            let mut volume = self.volumes[local];

            // Fully silent and staying silent: skip the sample loop but
            // keep the phase advancing so re-entry is continuous.
            if volume < SILENCE_EPSILON && target == 0.0 {
                self.phases[local] = (phase + block) % period;
                self.volumes[local] = 0.0;
                continue;
            }

            for n in 0..block {
                let alpha = if target > volume { attack } else { release };
                volume += (target - volume) * alpha;
                let sample = table[phase];
                phase += 1;
                if phase == period {
                    phase = 0;
                }
                let weighted = sample * volume;
                l[n] += weighted * gl;
                r[n] += weighted * gr;
            }

            if volume < SILENCE_EPSILON && target == 0.0 {
                volume = 0.0;
            }
            self.phases[local] = phase;
            self.volumes[local] = volume;
        }
    }
}

/// Split `notes` into `workers` contiguous partitions of near-equal size.
pub fn partition_counts(notes: usize, workers: usize) -> Vec<(usize, usize)> {
    let workers = workers.max(1);
    let base = notes / workers;
    let extra = notes % workers;
    let mut out = Vec::with_capacity(workers);
    let mut start = 0;
    for w in 0..workers {
        let count = base + usize::from(w < extra);
        out.push((start, count));
        start += count;
    }
    out
}
