//! UDP receive loop.
//!
//! Binds the ingestion socket (unicast or multicast), then reads datagrams
//! until the engine's `running` flag clears. The read timeout is 100 ms so
//! shutdown is noticed promptly; dropping the socket on exit releases the
//! port immediately (UDP carries no lingering send queue).
//!
//! Complete lines are announced to a [`LineSink`] so the preprocessing
//! stage can be wired in without this crate knowing anything about DSP.

use crate::imu::{ImuFilter, ImuShared};
use crate::line::{Assembled, LineAssembler, LineDoubleBuffer};
use crate::packet::Packet;
use crate::stats::IngestStats;
use crate::{Error, Result};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Largest datagram the scanner emits (header + 3 channels of a full line
/// fragment, with headroom).
const RECV_BUFFER_LEN: usize = 16384;

/// Read timeout so the loop can observe shutdown.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Consumer of completed lines.
///
/// Called from the network thread immediately after a line is published;
/// implementations read the fresh line via [`LineDoubleBuffer::read`].
pub trait LineSink: Send {
    /// A new complete line has been published to `buffer`.
    fn line_ready(&mut self, buffer: &LineDoubleBuffer);
}

/// A bound and configured ingestion socket.
#[derive(Debug)]
pub struct IngressSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl IngressSocket {
    /// Bind the ingestion endpoint.
    ///
    /// Addresses in 224.0.0.0/4 are joined as multicast groups (with
    /// loopback enabled) on `multicast_interface`, or on the unspecified
    /// interface when none is given.
    pub fn bind(address: &str, port: u16, multicast_interface: Option<Ipv4Addr>) -> Result<Self> {
        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| Error::InvalidAddress(address.to_string()))?;

        let (bind_ip, group) = if ip.is_multicast() {
            (Ipv4Addr::UNSPECIFIED, Some(ip))
        } else {
            (ip, None)
        };

        let bind_addr = SocketAddr::from((bind_ip, port));
        let socket = UdpSocket::bind(bind_addr).map_err(|source| Error::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;

        if let Some(group) = group {
            let iface = multicast_interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
            socket
                .join_multicast_v4(&group, &iface)
                .map_err(Error::SocketOption)?;
            socket
                .set_multicast_loop_v4(true)
                .map_err(Error::SocketOption)?;
            tracing::info!(%group, %iface, "joined multicast group");
        }

        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(Error::SocketOption)?;

        let local_addr = socket.local_addr().map_err(Error::SocketOption)?;
        tracing::info!(%local_addr, "scanner ingestion listening");

        Ok(Self { socket, local_addr })
    }

    /// The address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Everything the receive loop needs, bundled for the spawn call.
pub struct ReceiverParts {
    /// Bound ingestion socket.
    pub socket: IngressSocket,
    /// Destination line double-buffer.
    pub buffer: Arc<LineDoubleBuffer>,
    /// Shared counters.
    pub stats: Arc<IngestStats>,
    /// IMU smoothing factor in (0, 1].
    pub imu_alpha: f32,
    /// Published IMU snapshot.
    pub imu: Arc<ImuShared>,
    /// Completed-line consumer (the preprocessor).
    pub sink: Box<dyn LineSink>,
}

/// Spawn the network thread.
///
/// The loop exits when `running` clears; the caller joins the handle during
/// engine shutdown.
pub fn spawn_receiver(parts: ReceiverParts, running: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("sp3ctra-udp".into())
        .spawn(move || run(parts, &running))
        .unwrap_or_else(|e| panic!("failed to spawn network thread: {e}"))
}

fn run(mut parts: ReceiverParts, running: &AtomicBool) {
    let mut assembler = LineAssembler::new(Arc::clone(&parts.buffer), Arc::clone(&parts.stats));
    let mut imu_filter = ImuFilter::new(parts.imu_alpha);
    let mut recv_buf = vec![0u8; RECV_BUFFER_LEN];

    while running.load(Ordering::Relaxed) {
        let len = match parts.socket.socket.recv_from(&mut recv_buf) {
            Ok((len, _peer)) => len,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Idle feed: engines keep rendering the last good line.
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "UDP receive error");
                continue;
            }
        };

        match Packet::parse(&recv_buf[..len]) {
            Ok(Packet::Image(fragment)) => {
                if assembler.accept(&fragment) == Assembled::LineComplete {
                    parts.sink.line_ready(&parts.buffer);
                }
            }
            Ok(Packet::Imu { acc }) => {
                parts.stats.imu_packet();
                parts.imu.publish(imu_filter.feed(acc[0]));
            }
            Err(_) => {
                parts.stats.malformed_packet();
            }
        }
    }

    tracing::debug!("network thread stopping");
    // Socket drops here; the port is released immediately.
}
