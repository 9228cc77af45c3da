//! LuxWave - polyphonic photo-wavetable engine.
//!
//! Eight voices scan the current image line as a one-period wavetable at
//! MIDI-controlled rates. Each voice carries a volume ADSR, a filter ADSR
//! modulating a one-pole lowpass, and shares a global vibrato LFO so the
//! whole instrument breathes together.
//!
//! Voice allocation: lowest-indexed free voice first; when all eight are
//! busy, the voice with the smallest trigger order (oldest) is stolen. The
//! trigger order is a monotonically increasing u64; wraparound is
//! practically unreachable and harmless for min-comparison.

use crate::adsr::{AdsrEnvelope, AdsrTimes};
use crate::wavetable::{ScanMode, sample_wave, scan_position};
use libm::exp2f;
use sp3ctra_core::{Lfo, OnePole};

/// Polyphony of the engine.
pub const VOICE_COUNT: usize = 8;

/// Contribution floor below which a voice's tail is skipped.
const MIN_AUDIBLE: f32 = 1e-4;

/// Wavetable interpolation quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpMode {
    /// Two-point linear interpolation.
    #[default]
    Linear,
    /// Four-point Catmull-Rom.
    Cubic,
}

impl InterpMode {
    /// CC74 mapping: 0..63 linear, 64..127 cubic.
    pub fn from_cc(value: u8) -> Self {
        if value < 64 { Self::Linear } else { Self::Cubic }
    }
}

impl ScanMode {
    /// CC1 mapping: thirds of the controller range.
    pub fn from_cc(value: u8) -> Self {
        match value {
            0..=42 => Self::LeftToRight,
            43..=84 => Self::RightToLeft,
            _ => Self::Dual,
        }
    }
}

/// Per-block parameter snapshot for the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuxWaveParams {
    /// Wavetable scan direction.
    pub scan_mode: ScanMode,
    /// Interpolation quality.
    pub interp: InterpMode,
    /// Master amplitude in [0, 1].
    pub amplitude: f32,
    /// Volume envelope times.
    pub volume_adsr: AdsrTimes,
    /// Filter envelope times.
    pub filter_adsr: AdsrTimes,
    /// Vibrato LFO rate in Hz.
    pub vibrato_rate_hz: f32,
    /// Vibrato depth in semitones.
    pub vibrato_depth_semitones: f32,
    /// Base lowpass cutoff in Hz.
    pub filter_cutoff_hz: f32,
    /// Filter-envelope modulation depth in Hz.
    pub filter_env_depth_hz: f32,
}

impl Default for LuxWaveParams {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::LeftToRight,
            interp: InterpMode::Linear,
            amplitude: 0.8,
            volume_adsr: AdsrTimes::default(),
            filter_adsr: AdsrTimes::default(),
            vibrato_rate_hz: 5.0,
            vibrato_depth_semitones: 0.0,
            filter_cutoff_hz: 8000.0,
            filter_env_depth_hz: 0.0,
        }
    }
}

/// Note event delivered from the MIDI router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    /// Key pressed.
    On {
        /// MIDI note number.
        note: u8,
        /// Velocity 1..127 (0 is routed as `Off`).
        velocity: u8,
    },
    /// Key released.
    Off {
        /// MIDI note number.
        note: u8,
    },
}

/// Convert a MIDI note number to frequency (A4 = 440 Hz).
#[inline]
pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * exp2f((note as f32 - 69.0) / 12.0)
}

/// One polyphonic voice.
#[derive(Debug, Clone)]
struct Voice {
    active: bool,
    note: u8,
    velocity_gain: f32,
    trigger_order: u64,
    phase: f32,
    frequency: f32,
    volume_env: AdsrEnvelope,
    filter_env: AdsrEnvelope,
    lowpass: OnePole,
}

impl Voice {
    fn new(sample_rate: f32) -> Self {
        Self {
            active: false,
            note: 0,
            velocity_gain: 0.0,
            trigger_order: 0,
            phase: 0.0,
            frequency: 0.0,
            volume_env: AdsrEnvelope::new(sample_rate),
            filter_env: AdsrEnvelope::new(sample_rate),
            lowpass: OnePole::new(sample_rate, 8000.0),
        }
    }

    fn note_on(&mut self, note: u8, velocity: u8, order: u64) {
        self.active = true;
        self.note = note;
        self.velocity_gain = velocity as f32 / 127.0;
        self.trigger_order = order;
        self.phase = 0.0;
        self.frequency = midi_to_freq(note);
        self.lowpass.reset();
        self.volume_env.gate_on();
        self.filter_env.gate_on();
    }

    fn note_off(&mut self) {
        self.volume_env.gate_off();
        self.filter_env.gate_off();
    }
}

/// The polyphonic photo-wavetable engine.
///
/// Owned by its producer thread; note events arrive through a channel the
/// thread drains before each block.
#[derive(Debug)]
pub struct LuxWave {
    voices: Vec<Voice>,
    lfo: Lfo,
    trigger_counter: u64,
    sample_rate: f32,
    params: LuxWaveParams,
}

impl LuxWave {
    /// Create an engine with all voices idle.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            voices: (0..VOICE_COUNT).map(|_| Voice::new(sample_rate)).collect(),
            lfo: Lfo::new(sample_rate, 5.0),
            trigger_counter: 0,
            sample_rate,
            params: LuxWaveParams::default(),
        }
    }

    /// Number of currently sounding voices.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Notes of the currently sounding voices (test and telemetry helper).
    pub fn active_notes(&self) -> Vec<u8> {
        self.voices
            .iter()
            .filter(|v| v.active)
            .map(|v| v.note)
            .collect()
    }

    /// Handle a note event.
    pub fn handle_event(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::On { note, velocity } => self.note_on(note, velocity),
            NoteEvent::Off { note } => self.note_off(note),
        }
    }

    /// Start a note, stealing the oldest voice when saturated.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(note);
            return;
        }
        let idx = self
            .voices
            .iter()
            .position(|v| !v.active)
            .unwrap_or_else(|| self.oldest_voice());
        self.trigger_counter += 1;
        let order = self.trigger_counter;
        self.voices[idx].note_on(note, velocity, order);
    }

    /// Release every voice playing `note`.
    pub fn note_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.active && voice.note == note {
                voice.note_off();
            }
        }
    }

    /// Silence everything immediately.
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
            voice.volume_env.reset();
            voice.filter_env.reset();
        }
    }

    fn oldest_voice(&self) -> usize {
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.trigger_order)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Apply a parameter snapshot (once per block).
    pub fn apply_params(&mut self, params: &LuxWaveParams) {
        if *params == self.params {
            return;
        }
        self.lfo.set_frequency(params.vibrato_rate_hz);
        for voice in &mut self.voices {
            voice.volume_env.set_times(params.volume_adsr);
            voice.filter_env.set_times(params.filter_adsr);
        }
        self.params = *params;
    }

    /// Render one block, adding into zeroed `out_l` / `out_r`.
    ///
    /// `wave` is the current image line as signed samples; an empty line
    /// renders silence but still advances envelopes.
    pub fn render_block(&mut self, wave: &[f32], out_l: &mut [f32], out_r: &mut [f32]) {
        debug_assert_eq!(out_l.len(), out_r.len());
        let params = self.params;
        let depth = params.vibrato_depth_semitones;
        let nyquist_guard = self.sample_rate * 0.5;

        for n in 0..out_l.len() {
            let lfo_value = self.lfo.next();
            let vibrato = if depth > 0.0 {
                exp2f(lfo_value * depth / 12.0)
            } else {
                1.0
            };

            let mut mix = 0.0f32;
            for voice in &mut self.voices {
                if !voice.active {
                    continue;
                }
                let v_env = voice.volume_env.advance();
                let f_env = voice.filter_env.advance();

                if !voice.volume_env.is_active() {
                    voice.active = false;
                    continue;
                }

                // Phase advances even for inaudible tails so retriggered
                // material stays in time.
                voice.phase += voice.frequency * vibrato / self.sample_rate;
                voice.phase -= voice.phase.floor();

                let gain = v_env * voice.velocity_gain;
                if gain < MIN_AUDIBLE || wave.is_empty() {
                    continue;
                }

                let pos = scan_position(voice.phase, wave.len(), params.scan_mode);
                let raw = sample_wave(
                    wave,
                    pos,
                    matches!(params.interp, InterpMode::Cubic),
                );

                let cutoff = (params.filter_cutoff_hz + f_env * params.filter_env_depth_hz)
                    .clamp(20.0, nyquist_guard);
                voice
                    .lowpass
                    .set_alpha(OnePole::alpha_for(cutoff, self.sample_rate));
                let filtered = voice.lowpass.process(raw);

                mix += filtered * gain;
            }

            // Mono mix to both channels; stereo width belongs to the mixer.
            let sample = mix * params.amplitude;
            out_l[n] += sample;
            out_r[n] += sample;
        }
    }
}
