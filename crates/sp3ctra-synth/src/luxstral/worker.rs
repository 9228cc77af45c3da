//! LuxStral worker pool.
//!
//! The oscillator bank is partitioned across a fixed set of worker threads.
//! Each block, the coordinator sends every worker a job carrying the shared
//! inputs (frame, gains, parameters) plus a recycled pair of partial
//! buffers; workers render their partition and send the buffers back. The
//! collect step is the block barrier.
//!
//! Buffer recycling keeps the steady state allocation-free: each worker has
//! exactly one L/R pair ping-ponging between coordinator and worker.
//!
//! A worker that dies (panic, channel closed) leaves its range silent; the
//! condition is counted and logged by the coordinator after the block, not
//! from the render path.

use super::LuxStralBlockParams;
use super::bank::Partition;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use sp3ctra_scan::{GainBuffer, PreprocessedFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bound on waiting for one worker's partial.
const PARTIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Work order for one block.
struct BlockJob {
    /// Coordinator's block sequence, echoed back in the partial.
    sequence: u64,
    frame: Arc<PreprocessedFrame>,
    gains: Arc<GainBuffer>,
    params: LuxStralBlockParams,
    floor: f32,
    block_len: usize,
    l: Box<[f32]>,
    r: Box<[f32]>,
}

/// A worker's rendered partial for one block.
struct Partial {
    worker: usize,
    sequence: u64,
    l: Box<[f32]>,
    r: Box<[f32]>,
}

/// Fixed pool of render workers, one partition each.
pub struct WorkerPool {
    job_senders: Vec<Sender<BlockJob>>,
    results: Receiver<Partial>,
    /// Recycled partial buffers, indexed by worker.
    spare: Vec<Option<(Box<[f32]>, Box<[f32]>)>>,
    handles: Vec<std::thread::JoinHandle<()>>,
    /// Coordinator block sequence; stale partials are recognized by it.
    sequence: u64,
    /// Blocks where at least one worker failed to deliver.
    incidents: Arc<AtomicU64>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.job_senders.len())
            .field("incidents", &self.incidents.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Spawn one thread per partition. `max_block` sizes the partial
    /// buffers; blocks up to that length render without reallocation.
    pub fn spawn(partitions: Vec<Partition>, max_block: usize) -> Self {
        let workers = partitions.len();
        let (result_tx, results) = bounded::<Partial>(workers);
        let mut job_senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        let mut spare = Vec::with_capacity(workers);

        for (index, mut partition) in partitions.into_iter().enumerate() {
            let (job_tx, job_rx) = bounded::<BlockJob>(1);
            let tx = result_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("luxstral-{index}"))
                .spawn(move || worker_loop(index, &mut partition, &job_rx, &tx))
                .unwrap_or_else(|e| panic!("failed to spawn luxstral worker: {e}"));
            job_senders.push(job_tx);
            handles.push(handle);
            spare.push(Some((
                vec![0.0; max_block].into_boxed_slice(),
                vec![0.0; max_block].into_boxed_slice(),
            )));
        }

        Self {
            job_senders,
            results,
            spare,
            handles,
            sequence: 0,
            incidents: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.job_senders.len()
    }

    /// Blocks that lost at least one worker's partial.
    pub fn incident_count(&self) -> u64 {
        self.incidents.load(Ordering::Relaxed)
    }

    /// Render one block across all workers, summing into `out_l` / `out_r`.
    ///
    /// The collect loop is the end-of-block barrier. A missing partial
    /// leaves its range silent for the block.
    pub fn render_block(
        &mut self,
        frame: &Arc<PreprocessedFrame>,
        gains: &Arc<GainBuffer>,
        params: &LuxStralBlockParams,
        floor: f32,
        out_l: &mut [f32],
        out_r: &mut [f32],
    ) {
        let block_len = out_l.len();
        self.sequence += 1;
        let sequence = self.sequence;
        let mut dispatched = 0usize;
        let mut trouble = false;

        for worker in 0..self.job_senders.len() {
            let Some((l, r)) = self.spare[worker].take() else {
                // Buffer never came back from a previous block.
                trouble = true;
                continue;
            };
            let job = BlockJob {
                sequence,
                frame: Arc::clone(frame),
                gains: Arc::clone(gains),
                params: *params,
                floor,
                block_len,
                l,
                r,
            };
            if let Err(e) = self.job_senders[worker].send(job) {
                // Worker is gone; reclaim its buffers for bookkeeping.
                let job = e.into_inner();
                self.spare[worker] = Some((job.l, job.r));
                trouble = true;
                continue;
            }
            dispatched += 1;
        }

        let mut collected = 0usize;
        while collected < dispatched {
            match self.results.recv_timeout(PARTIAL_TIMEOUT) {
                Ok(partial) => {
                    let worker = partial.worker;
                    if partial.sequence == sequence {
                        for n in 0..block_len {
                            out_l[n] += partial.l[n];
                            out_r[n] += partial.r[n];
                        }
                        collected += 1;
                    }
                    // A stale sequence is a straggler from a timed-out
                    // block: recycle its buffers, drop its audio.
                    self.spare[worker] = Some((partial.l, partial.r));
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    trouble = true;
                    break;
                }
            }
        }

        if trouble {
            self.incidents.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("luxstral worker failed to deliver; range silenced for one block");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.job_senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    index: usize,
    partition: &mut Partition,
    jobs: &Receiver<BlockJob>,
    results: &Sender<Partial>,
) {
    while let Ok(mut job) = jobs.recv() {
        partition.set_envelope_times(job.params.attack_ms, job.params.release_ms);

        let block = job.block_len.min(job.l.len());
        job.l[..block].fill(0.0);
        job.r[..block].fill(0.0);

        let gains = Arc::clone(&job.gains);
        partition.render(
            &job.frame.grayscale,
            job.floor,
            job.params.volume_scale,
            |i| (gains.left(i), gains.right(i)),
            &mut job.l[..block],
            &mut job.r[..block],
        );

        let partial = Partial {
            worker: index,
            sequence: job.sequence,
            l: job.l,
            r: job.r,
        };
        if results.send(partial).is_err() {
            break;
        }
    }
}

// Tests live at the engine level (mod.rs) where the pool is exercised
// through the public render path.
