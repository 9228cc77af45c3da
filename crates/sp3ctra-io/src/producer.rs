//! Engine producer threads.
//!
//! Each engine renders on its own non-real-time thread, one block at a
//! time, into its audio ring. Pacing comes from ring backpressure: after
//! publishing, the producer sleeps in short slices until a slot frees up
//! or two block durations pass, at which point it renders anyway and the
//! ring's freshest-audio overwrite rule applies.
//!
//! Per block, a producer loads exactly one parameter snapshot, one frame
//! and one pan-gains buffer; new values apply at the next block boundary,
//! never mid-block.

use crate::params::ParameterStore;
use crate::ring::AudioRing;
use crossbeam_channel::Receiver;
use sp3ctra_scan::{FrameStore, PanGainsTable};
use sp3ctra_synth::{LuxStral, LuxWave, NoteEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Elevate the current thread above normal scheduling, best effort.
fn elevate_priority(name: &str) {
    use thread_priority::{ThreadPriority, ThreadPriorityValue, set_current_thread_priority};
    if let Ok(value) = ThreadPriorityValue::try_from(40u8) {
        if let Err(e) = set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
            tracing::debug!(thread = name, error = ?e, "thread priority unchanged");
        }
    }
}

/// Sleep until the ring has a free slot, the deadline passes, or shutdown.
fn pace(ring: &AudioRing, running: &AtomicBool, block_duration: Duration) {
    let deadline = Instant::now() + block_duration * 2;
    let slice = (block_duration / 4).max(Duration::from_micros(250));
    while running.load(Ordering::Relaxed)
        && !ring.has_empty_slot()
        && Instant::now() < deadline
    {
        std::thread::sleep(slice);
    }
}

/// Spawn the LuxStral render thread.
pub fn spawn_luxstral_producer(
    mut engine: LuxStral,
    frames: Arc<FrameStore>,
    pan_table: Arc<PanGainsTable>,
    store: Arc<ParameterStore>,
    ring: Arc<AudioRing>,
    sample_rate: f32,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("sp3ctra-luxstral".into())
        .spawn(move || {
            elevate_priority("luxstral");
            let block = ring.frames_per_block();
            let block_duration = Duration::from_secs_f32(block as f32 / sample_rate);
            let mut left = vec![0.0f32; block];
            let mut right = vec![0.0f32; block];
            let mut interleaved = vec![0.0f32; block * 2];
            let mut counter = 0u64;

            while running.load(Ordering::Relaxed) {
                let snapshot = store.load();
                let frame = frames.load();
                let gains = pan_table.load();
                engine.render_block(&frame, &gains, &snapshot.luxstral, &mut left, &mut right);

                interleave(&left, &right, &mut interleaved);
                counter += 1;
                if let Some(slot) = ring.begin_write() {
                    slot.fill(&interleaved);
                    slot.commit(counter);
                }

                pace(&ring, &running, block_duration);
            }
            tracing::debug!("luxstral producer stopping");
        })
        .unwrap_or_else(|e| panic!("failed to spawn luxstral producer: {e}"))
}

/// Spawn the LuxWave render thread.
pub fn spawn_luxwave_producer(
    mut engine: LuxWave,
    frames: Arc<FrameStore>,
    store: Arc<ParameterStore>,
    ring: Arc<AudioRing>,
    notes: Receiver<NoteEvent>,
    sample_rate: f32,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("sp3ctra-luxwave".into())
        .spawn(move || {
            elevate_priority("luxwave");
            let block = ring.frames_per_block();
            let block_duration = Duration::from_secs_f32(block as f32 / sample_rate);
            let mut left = vec![0.0f32; block];
            let mut right = vec![0.0f32; block];
            let mut interleaved = vec![0.0f32; block * 2];
            let mut counter = 0u64;

            while running.load(Ordering::Relaxed) {
                // Note events apply at block boundaries.
                while let Ok(event) = notes.try_recv() {
                    engine.handle_event(event);
                }

                let snapshot = store.load();
                engine.apply_params(&snapshot.luxwave);
                let frame = frames.load();
                left.fill(0.0);
                right.fill(0.0);
                engine.render_block(&frame.wave, &mut left, &mut right);

                interleave(&left, &right, &mut interleaved);
                counter += 1;
                if let Some(slot) = ring.begin_write() {
                    slot.fill(&interleaved);
                    slot.commit(counter);
                }

                pace(&ring, &running, block_duration);
            }
            tracing::debug!("luxwave producer stopping");
        })
        .unwrap_or_else(|e| panic!("failed to spawn luxwave producer: {e}"))
}

/// Interleave planar stereo into L/R pairs.
fn interleave(left: &[f32], right: &[f32], out: &mut [f32]) {
    for (i, (&l, &r)) in left.iter().zip(right.iter()).enumerate() {
        out[2 * i] = l;
        out[2 * i + 1] = r;
    }
}
