//! The root engine.
//!
//! `Engine::new` builds every component from a validated [`Config`] or
//! fails with a structured error leaving no partial running state; the
//! instance owns all threads, the MIDI connection and the output stream.
//! There are no process-wide globals: everything the callback needs is
//! moved into it, everything a control path needs hangs off the `Engine`.
//!
//! Shutdown ordering (also the `Drop` path):
//!
//! 1. drop the output stream: the real-time callback stops first
//! 2. clear `running`; every producer loop observes it within 100 ms
//! 3. join the threads
//!
//! Only after that can synthesized state drop safely.

use crate::auto_volume::{self, AutoVolumeController, spawn_auto_volume};
use crate::midi::MidiRouter;
use crate::output::{CallbackState, OutputConfig, build_output_stream};
use crate::params::{ParamSnapshot, ParameterStore};
use crate::producer::{spawn_luxstral_producer, spawn_luxwave_producer};
use crate::ring::AudioRing;
use crate::{Error, Result};
use sp3ctra_config::Config;
use sp3ctra_core::AtomicF32;
use sp3ctra_effects::{Reverb, ReverbParams};
use sp3ctra_ingest::{
    ImuShared, IngestStats, IngressSocket, LineDoubleBuffer, ReceiverParts, spawn_receiver,
};
use sp3ctra_scan::{
    ChromaConfig, FrameStore, PanGainsTable, PanLaw, Preprocessor, PreprocessorConfig,
};
use sp3ctra_synth::{
    AdsrTimes, InterpMode, LuxStral, LuxStralBlockParams, LuxWave, LuxWaveParams, ScanMode,
    luxstral,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Bound on joining each thread at shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A running Sp3ctra instance.
pub struct Engine {
    running: Arc<AtomicBool>,
    stream: Option<cpal::Stream>,
    threads: Vec<JoinHandle<()>>,
    _midi: Option<MidiRouter>,

    store: Arc<ParameterStore>,
    stats: Arc<IngestStats>,
    line_buffer: Arc<LineDoubleBuffer>,
    luxstral_ring: Arc<AudioRing>,
    luxwave_ring: Arc<AudioRing>,
    master_volume: Arc<AtomicF32>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("threads", &self.threads.len())
            .finish_non_exhaustive()
    }
}

/// Translate the config tree into the initial parameter snapshot.
fn initial_snapshot(config: &Config) -> ParamSnapshot {
    let lw = &config.luxwave;
    ParamSnapshot {
        version: 0,
        luxstral: LuxStralBlockParams {
            volume_scale: 1.0 / 255.0,
            relative_mode: config.luxstral.relative_mode,
            contrast_min: config.luxstral.contrast_min,
            volume_weighting_exp: config.luxstral.volume_weighting_exp,
            soft_limit_threshold: config.luxstral.soft_limit_threshold,
            soft_limit_knee: config.luxstral.soft_limit_knee,
            attack_ms: config.luxstral.attack_ms,
            release_ms: config.luxstral.release_ms,
        },
        luxwave: LuxWaveParams {
            scan_mode: match lw.scan_mode.as_str() {
                "right_to_left" => ScanMode::RightToLeft,
                "dual" => ScanMode::Dual,
                _ => ScanMode::LeftToRight,
            },
            interp: match lw.interp_mode.as_str() {
                "cubic" => InterpMode::Cubic,
                _ => InterpMode::Linear,
            },
            amplitude: lw.amplitude,
            volume_adsr: AdsrTimes {
                attack_ms: lw.volume_adsr.attack_ms,
                decay_ms: lw.volume_adsr.decay_ms,
                sustain: lw.volume_adsr.sustain,
                release_ms: lw.volume_adsr.release_ms,
            },
            filter_adsr: AdsrTimes {
                attack_ms: lw.filter_adsr.attack_ms,
                decay_ms: lw.filter_adsr.decay_ms,
                sustain: lw.filter_adsr.sustain,
                release_ms: lw.filter_adsr.release_ms,
            },
            vibrato_rate_hz: lw.vibrato_rate,
            vibrato_depth_semitones: lw.vibrato_depth,
            filter_cutoff_hz: lw.filter_cutoff,
            filter_env_depth_hz: lw.filter_env_depth,
        },
        reverb: ReverbParams {
            roomsize: config.reverb.roomsize,
            damping: config.reverb.damping,
            width: config.reverb.width,
            predelay: config.reverb.predelay,
        },
        reverb_enabled: config.reverb.enabled,
        reverb_mix: config.reverb.mix,
    }
}

impl Engine {
    /// Build and start everything.
    ///
    /// The configuration is re-validated here so a hand-constructed
    /// `Config` cannot bypass the range checks.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let sample_rate = config.audio.sampling_frequency as f32;
        let block = config.audio.buffer_size as usize;
        let pixels = config.scanner.pixel_count();
        let notes = config.scanner.note_count();

        tracing::info!(
            sample_rate,
            block,
            pixels,
            notes,
            "building sp3ctra engine"
        );

        // Shared state, all preallocated before any thread starts.
        let running = Arc::new(AtomicBool::new(true));
        let store = Arc::new(ParameterStore::new(initial_snapshot(config)));
        let stats = Arc::new(IngestStats::default());
        let line_buffer = Arc::new(LineDoubleBuffer::new(pixels));
        let frames = Arc::new(FrameStore::new(notes, pixels));
        let pan_table = Arc::new(PanGainsTable::new(notes));
        let imu = Arc::new(ImuShared::new());
        let master_volume = Arc::new(AtomicF32::new(1.0));
        let luxstral_ring = Arc::new(AudioRing::new(block));
        let luxwave_ring = Arc::new(AudioRing::new(block));

        // Ingestion socket binds before anything spawns; a bind failure
        // leaves nothing running.
        let multicast_interface = config
            .network
            .multicast_interface
            .as_deref()
            .map(|s| {
                s.parse()
                    .map_err(|_| Error::Ingest(sp3ctra_ingest::Error::InvalidAddress(s.into())))
            })
            .transpose()?;
        let socket = IngressSocket::bind(
            &config.network.udp_address,
            config.network.udp_port,
            multicast_interface,
        )?;

        let preprocessor = Preprocessor::new(
            PreprocessorConfig {
                pixels_per_note: config.scanner.pixels_per_note,
                gamma: config
                    .luxstral
                    .gamma_enable
                    .then_some(config.luxstral.gamma_value),
                invert_background: config.luxstral.invert_background,
                stereo_enabled: config.stereo.enabled,
                chroma: ChromaConfig {
                    blue_red_weight: config.stereo.blue_red_weight,
                    cyan_yellow_weight: config.stereo.cyan_yellow_weight,
                    amplification: config.stereo.temperature_amplification,
                    curve_exponent: config.stereo.temperature_curve_exponent,
                    law: PanLaw::ConstantPower,
                    center_threshold: 0.1,
                    center_boost: 1.0,
                },
                spectrum_size: None,
                dmx_zones: 0,
            },
            pixels,
            Arc::clone(&pan_table),
            Arc::clone(&frames),
        );

        // Engines.
        let workers = if config.luxstral.num_workers == 0 {
            luxstral::default_workers()
        } else {
            config.luxstral.num_workers
        };
        let luxstral_engine = LuxStral::new(&sp3ctra_synth::LuxStralConfig {
            sample_rate,
            notes,
            low_freq: config.luxstral.low_freq,
            high_freq: config.luxstral.high_freq,
            attack_ms: config.luxstral.attack_ms,
            release_ms: config.luxstral.release_ms,
            workers,
            max_block: block,
        });
        let contrast = luxstral_engine.contrast_handle();
        let luxwave_engine = LuxWave::new(sample_rate);

        // Threads.
        let mut threads = Vec::new();
        threads.push(spawn_receiver(
            ReceiverParts {
                socket,
                buffer: Arc::clone(&line_buffer),
                stats: Arc::clone(&stats),
                imu_alpha: config.network.imu_filter_alpha,
                imu: Arc::clone(&imu),
                sink: Box::new(preprocessor),
            },
            Arc::clone(&running),
        ));
        threads.push(spawn_luxstral_producer(
            luxstral_engine,
            Arc::clone(&frames),
            Arc::clone(&pan_table),
            Arc::clone(&store),
            Arc::clone(&luxstral_ring),
            sample_rate,
            Arc::clone(&running),
        ));

        let (notes_tx, notes_rx) = crossbeam_channel::bounded(256);
        threads.push(spawn_luxwave_producer(
            luxwave_engine,
            Arc::clone(&frames),
            Arc::clone(&store),
            Arc::clone(&luxwave_ring),
            notes_rx,
            sample_rate,
            Arc::clone(&running),
        ));

        let controller = AutoVolumeController::new(
            auto_volume::AutoVolumeConfig {
                enabled: config.auto_volume.enabled,
                inactive_level: config.auto_volume.inactive_level,
                fade_ms: config.auto_volume.fade_ms,
                poll_ms: config.auto_volume.poll_ms,
                sensitivity: config.auto_volume.imu_sensitivity,
                base_threshold: config.auto_volume.imu_base_threshold,
                inactivity_timeout_s: config.auto_volume.imu_inactivity_timeout_s,
                contrast_change_threshold: config.auto_volume.contrast_change_threshold,
            },
            Arc::clone(&imu),
            contrast,
            Arc::clone(&master_volume),
        );
        threads.push(spawn_auto_volume(controller, Arc::clone(&running)));

        // Best effort: a missing controller is not an init failure.
        let midi = match MidiRouter::connect(
            config.midi.port.as_deref(),
            notes_tx,
            Arc::clone(&store),
        ) {
            Ok(router) => router,
            Err(e) => {
                tracing::warn!(error = %e, "MIDI unavailable, continuing without it");
                None
            }
        };

        // The real-time consumer starts last, once every producer exists.
        let stream = match build_output_stream(
            &OutputConfig {
                sample_rate: config.audio.sampling_frequency,
                buffer_size: config.audio.buffer_size,
                channels: config.audio.channels,
                device_name: config.audio.device.clone(),
            },
            CallbackState {
                luxstral_ring: Arc::clone(&luxstral_ring),
                luxwave_ring: Arc::clone(&luxwave_ring),
                master_volume: Arc::clone(&master_volume),
                store: Arc::clone(&store),
                reverb: Reverb::new(sample_rate),
            },
        ) {
            Ok(stream) => stream,
            Err(e) => {
                // Unwind cleanly: stop the threads we already spawned.
                running.store(false, Ordering::Relaxed);
                for handle in threads {
                    let _ = handle.join();
                }
                return Err(e);
            }
        };

        tracing::info!("sp3ctra engine running");
        Ok(Self {
            running,
            stream: Some(stream),
            threads,
            _midi: midi,
            store,
            stats,
            line_buffer,
            luxstral_ring,
            luxwave_ring,
            master_volume,
        })
    }

    /// Runtime parameter store (host setters and the MIDI router share it).
    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    /// Ingestion counters.
    pub fn ingest_stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Lines published so far.
    pub fn lines_received(&self) -> u64 {
        self.line_buffer.sequence()
    }

    /// Consumer underruns across both rings.
    pub fn underruns(&self) -> u64 {
        self.luxstral_ring.underruns() + self.luxwave_ring.underruns()
    }

    /// Current master volume (auto-volume output).
    pub fn master_volume(&self) -> f32 {
        self.master_volume.load(Ordering::Acquire)
    }

    /// Stop the stream and join every thread. Idempotent.
    pub fn shutdown(&mut self) {
        if self.stream.is_none() && self.threads.is_empty() {
            return;
        }
        tracing::info!("sp3ctra engine stopping");

        // RT consumer first.
        self.stream = None;
        self.running.store(false, Ordering::Relaxed);

        let deadline = std::time::Instant::now() + JOIN_TIMEOUT * self.threads.len() as u32;
        for handle in self.threads.drain(..) {
            if std::time::Instant::now() > deadline {
                tracing::warn!("thread join timed out during shutdown");
                break;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_snapshot_maps_config() {
        let mut config = Config::default();
        config.luxwave.scan_mode = "dual".to_string();
        config.luxwave.interp_mode = "cubic".to_string();
        config.reverb.mix = 0.7;
        config.luxstral.relative_mode = true;

        let snap = initial_snapshot(&config);
        assert_eq!(snap.luxwave.scan_mode, ScanMode::Dual);
        assert_eq!(snap.luxwave.interp, InterpMode::Cubic);
        assert_eq!(snap.reverb_mix, 0.7);
        assert!(snap.luxstral.relative_mode);
        assert_eq!(snap.version, 0);
    }

    #[test]
    fn invalid_config_fails_before_any_state() {
        let mut config = Config::default();
        config.scanner.sensor_dpi = 300;
        let result = Engine::new(&config);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    // Engine construction against real audio hardware is exercised by the
    // host binary; CI boxes routinely have no output device.
}
