//! Scanner line ingestion for Sp3ctra.
//!
//! This crate owns everything between the UDP socket and the audio-side
//! consumers of scanner data:
//!
//! - **Wire protocol**: [`packet`] parses `IMAGE_DATA` and `IMU_DATA`
//!   datagrams into borrowed, validated views.
//! - **Line double-buffer**: [`line`] reassembles fragmented lines and
//!   exposes the most recent *complete* line to any number of readers
//!   without blocking.
//! - **IMU telemetry**: [`imu`] smooths the accelerometer X axis and
//!   publishes an atomic snapshot for the auto-volume controller.
//! - **Receiver thread**: [`receiver`] runs the socket loop with a 100 ms
//!   timeout so shutdown is always prompt.
//!
//! Transient wire errors (malformed packets, dropped fragments, incomplete
//! lines) never interrupt the stream: they are counted in [`IngestStats`]
//! and reported by non-real-time threads.

pub mod imu;
pub mod line;
pub mod packet;
pub mod receiver;
pub mod stats;

pub use imu::{ImuFilter, ImuShared};
pub use line::{LineAssembler, LineDoubleBuffer, LineView};
pub use packet::{IMAGE_DATA, IMU_DATA, MAX_FRAGMENTS_PER_LINE, Packet, PacketError};
pub use receiver::{IngressSocket, LineSink, ReceiverParts, spawn_receiver};
pub use stats::{IngestStats, StatsSnapshot};

/// Errors raised while setting up the ingestion path.
///
/// Runtime wire errors are deliberately *not* here: they are counted, not
/// propagated (see [`IngestStats`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured UDP endpoint could not be parsed.
    #[error("invalid UDP address '{0}'")]
    InvalidAddress(String),

    /// Binding the ingestion socket failed.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A socket option (timeout, multicast membership) could not be applied.
    #[error("failed to configure UDP socket: {0}")]
    SocketOption(#[source] std::io::Error),
}

/// Convenience result type for ingestion setup.
pub type Result<T> = std::result::Result<T, Error>;
