//! Ingestion statistics.
//!
//! Transient wire errors are recovered locally and reported through these
//! counters; nothing in the receive path logs or propagates per-packet
//! errors. Hosts sample [`IngestStats::snapshot`] at their own pace.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters maintained by the receive path.
#[derive(Debug, Default)]
pub struct IngestStats {
    complete_lines: AtomicU64,
    incomplete_lines: AtomicU64,
    dropped_fragments: AtomicU64,
    malformed_packets: AtomicU64,
    imu_packets: AtomicU64,
}

impl IngestStats {
    /// Count a fully assembled, published line.
    pub fn complete_line(&self) {
        self.complete_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a line discarded before completion (loss or reorder).
    pub fn incomplete_line(&self) {
        self.incomplete_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a fragment dropped by validation.
    pub fn dropped_fragment(&self) {
        self.dropped_fragments.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a datagram that failed to parse.
    pub fn malformed_packet(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an accepted IMU datagram.
    pub fn imu_packet(&self) {
        self.imu_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters at once.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            complete_lines: self.complete_lines.load(Ordering::Relaxed),
            incomplete_lines: self.incomplete_lines.load(Ordering::Relaxed),
            dropped_fragments: self.dropped_fragments.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            imu_packets: self.imu_packets.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lines fully assembled and published.
    pub complete_lines: u64,
    /// Lines discarded before completion.
    pub incomplete_lines: u64,
    /// Fragments dropped by validation.
    pub dropped_fragments: u64,
    /// Datagrams that failed to parse.
    pub malformed_packets: u64,
    /// IMU datagrams accepted.
    pub imu_packets: u64,
}
