//! cpal output stream and the real-time callback.
//!
//! The callback is the only real-time code in the system. Its entire
//! contract with the rest of the engine is wait-free: two audio rings, the
//! master-volume atomic and the parameter snapshot pointer. It allocates
//! nothing, locks nothing and logs nothing; underruns render silence and
//! are counted by the rings.

use crate::params::ParameterStore;
use crate::ring::AudioRing;
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use sp3ctra_core::AtomicF32;
use sp3ctra_effects::Reverb;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Scratch capacity in frames; host callbacks larger than this are
/// processed in chunks.
const SCRATCH_FRAMES: usize = 4096;

/// Output stream configuration.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Requested callback size in frames.
    pub buffer_size: u32,
    /// Output channel count (stereo pair lands in the first two).
    pub channels: u16,
    /// Case-insensitive device-name substring; `None` takes the default.
    pub device_name: Option<String>,
}

/// Everything the callback owns.
pub struct CallbackState {
    /// LuxStral's ring.
    pub luxstral_ring: Arc<AudioRing>,
    /// LuxWave's ring.
    pub luxwave_ring: Arc<AudioRing>,
    /// Master volume from the auto-volume controller.
    pub master_volume: Arc<AtomicF32>,
    /// Runtime parameters (reverb settings and mix).
    pub store: Arc<ParameterStore>,
    /// The reverb, owned and run by the callback.
    pub reverb: Reverb,
}

/// Per-ring read cursor carrying partial blocks across callbacks.
struct RingCursor {
    buf: Vec<f32>,
    pos: usize,
}

impl RingCursor {
    fn new(frames_per_block: usize) -> Self {
        let len = frames_per_block * 2;
        Self {
            buf: vec![0.0; len],
            pos: len, // exhausted: first fill pulls a block
        }
    }

    /// Fill `frames` planar frames from the ring; silence after the first
    /// failed read so one stall is one underrun.
    fn fill(&mut self, ring: &AudioRing, frames: usize, left: &mut [f32], right: &mut [f32]) {
        let mut n = 0;
        while n < frames {
            if self.pos >= self.buf.len() {
                match ring.try_read() {
                    Some(slot) => {
                        slot.copy_to(&mut self.buf);
                        self.pos = 0;
                    }
                    None => {
                        left[n..frames].fill(0.0);
                        right[n..frames].fill(0.0);
                        return;
                    }
                }
            }
            left[n] = self.buf[self.pos];
            right[n] = self.buf[self.pos + 1];
            self.pos += 2;
            n += 1;
        }
    }
}

/// The mixing core, separated from cpal for testability.
struct Mixer {
    state: CallbackState,
    luxstral_cursor: RingCursor,
    luxwave_cursor: RingCursor,
    scratch_a_l: Vec<f32>,
    scratch_a_r: Vec<f32>,
    scratch_b_l: Vec<f32>,
    scratch_b_r: Vec<f32>,
}

impl Mixer {
    fn new(state: CallbackState) -> Self {
        let a = state.luxstral_ring.frames_per_block();
        let b = state.luxwave_ring.frames_per_block();
        Self {
            state,
            luxstral_cursor: RingCursor::new(a),
            luxwave_cursor: RingCursor::new(b),
            scratch_a_l: vec![0.0; SCRATCH_FRAMES],
            scratch_a_r: vec![0.0; SCRATCH_FRAMES],
            scratch_b_l: vec![0.0; SCRATCH_FRAMES],
            scratch_b_r: vec![0.0; SCRATCH_FRAMES],
        }
    }

    /// Render one host buffer of interleaved output.
    fn render(&mut self, data: &mut [f32], channels: usize) {
        let snapshot = self.state.store.load();
        self.state.reverb.apply_params(&snapshot.reverb);
        let mix = if snapshot.reverb_enabled {
            snapshot.reverb_mix.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let master = self.state.master_volume.load(Ordering::Acquire);

        let total_frames = data.len() / channels;
        let mut done = 0;
        while done < total_frames {
            let chunk = (total_frames - done).min(SCRATCH_FRAMES);
            self.luxstral_cursor.fill(
                &self.state.luxstral_ring,
                chunk,
                &mut self.scratch_a_l[..chunk],
                &mut self.scratch_a_r[..chunk],
            );
            self.luxwave_cursor.fill(
                &self.state.luxwave_ring,
                chunk,
                &mut self.scratch_b_l[..chunk],
                &mut self.scratch_b_r[..chunk],
            );

            for n in 0..chunk {
                let dry_l = (self.scratch_a_l[n] + self.scratch_b_l[n]) * master;
                let dry_r = (self.scratch_a_r[n] + self.scratch_b_r[n]) * master;

                let (out_l, out_r) = if mix > 0.0 {
                    let (wet_l, wet_r) = self.state.reverb.process(dry_l, dry_r);
                    (
                        dry_l * (1.0 - mix) + wet_l * mix,
                        dry_r * (1.0 - mix) + wet_r * mix,
                    )
                } else {
                    (dry_l, dry_r)
                };

                let frame = (done + n) * channels;
                match channels {
                    1 => data[frame] = (out_l + out_r) * 0.5,
                    _ => {
                        data[frame] = out_l;
                        data[frame + 1] = out_r;
                        for extra in 2..channels {
                            data[frame + extra] = 0.0;
                        }
                    }
                }
            }
            done += chunk;
        }
    }
}

/// Find an output device by name substring, or the default.
fn find_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        Some(search) => {
            let needle = search.to_lowercase();
            let devices = host
                .output_devices()
                .map_err(|e| Error::Stream(e.to_string()))?;
            for device in devices {
                if let Ok(device_name) = device.name()
                    && device_name.to_lowercase().contains(&needle)
                {
                    return Ok(device);
                }
            }
            Err(Error::DeviceNotFound(search.to_string()))
        }
        None => host.default_output_device().ok_or(Error::NoDevice),
    }
}

/// Names of the available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Build and start the output stream.
///
/// The returned stream must be dropped before any state the producer
/// threads feed is torn down; the engine enforces that ordering.
pub fn build_output_stream(cfg: &OutputConfig, state: CallbackState) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = find_output_device(&host, cfg.device_name.as_deref())?;

    let stream_config = cpal::StreamConfig {
        channels: cfg.channels,
        sample_rate: cfg.sample_rate,
        buffer_size: cpal::BufferSize::Fixed(cfg.buffer_size),
    };
    let channels = cfg.channels as usize;
    let mut mixer = Mixer::new(state);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer.render(data, channels);
            },
            |err| {
                // cpal invokes this on its own (non-RT) error thread.
                tracing::error!(error = %err, "output stream error");
            },
            None,
        )
        .map_err(|e| Error::Stream(e.to_string()))?;

    stream.play().map_err(|e| Error::Stream(e.to_string()))?;
    tracing::info!(
        sample_rate = cfg.sample_rate,
        buffer_size = cfg.buffer_size,
        channels = cfg.channels,
        "output stream started"
    );
    Ok(stream)
}
