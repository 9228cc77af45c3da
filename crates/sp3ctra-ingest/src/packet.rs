//! Wire protocol for scanner datagrams.
//!
//! Two packet kinds share one UDP port, distinguished by a leading type
//! byte. All multi-byte fields are little-endian.
//!
//! ```text
//! IMAGE_DATA: | type u8 | line_id u32 | fragment_id u32 |
//!             | total_fragments u32 | fragment_size u32 |
//!             | R[fragment_size] | G[fragment_size] | B[fragment_size] |
//!
//! IMU_DATA:   | type u8 | acc_x f32 | acc_y f32 | acc_z f32 |
//! ```
//!
//! Parsing returns borrowed views into the receive buffer; nothing is
//! copied until a fragment is accepted into the line double-buffer.

/// Type byte of an image fragment datagram.
///
/// Project constant; must match the scanner firmware bit-for-bit.
pub const IMAGE_DATA: u8 = 0x01;

/// Type byte of an inertial telemetry datagram.
pub const IMU_DATA: u8 = 0x02;

/// Upper bound on fragments per line accepted from the wire.
pub const MAX_FRAGMENTS_PER_LINE: u32 = 64;

/// Byte length of the IMAGE_DATA header (type + four u32 fields).
pub const IMAGE_HEADER_LEN: usize = 17;

/// Byte length of an IMU_DATA datagram (type + three f32 fields).
pub const IMU_PACKET_LEN: usize = 13;

/// Parse failures for a single datagram.
///
/// These are transient: the receiver counts them and keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// Datagram too short to contain its declared header.
    #[error("truncated header: {got} bytes")]
    TruncatedHeader {
        /// Bytes actually received.
        got: usize,
    },

    /// Payload shorter than `3 * fragment_size`.
    #[error("truncated payload: expected {expected} bytes, got {got}")]
    TruncatedPayload {
        /// Bytes required by the header.
        expected: usize,
        /// Bytes actually received.
        got: usize,
    },

    /// Leading type byte matched no known packet kind.
    #[error("unknown packet type {0:#04x}")]
    UnknownType(u8),

    /// `fragment_id >= total_fragments`.
    #[error("fragment id {fragment_id} out of range (total {total_fragments})")]
    FragmentOutOfRange {
        /// Offending fragment index.
        fragment_id: u32,
        /// Declared fragment count.
        total_fragments: u32,
    },

    /// Declared fragment count exceeds [`MAX_FRAGMENTS_PER_LINE`] or is zero.
    #[error("invalid fragment count {0}")]
    InvalidFragmentCount(u32),

    /// Declared fragment size is zero.
    #[error("zero fragment size")]
    ZeroFragmentSize,
}

/// One image fragment, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFragment<'a> {
    /// Identifier of the line this fragment belongs to.
    pub line_id: u32,
    /// Index of this fragment within the line.
    pub fragment_id: u32,
    /// Total fragments making up the line.
    pub total_fragments: u32,
    /// Bytes per channel in this fragment.
    pub fragment_size: u32,
    /// Red channel bytes.
    pub r: &'a [u8],
    /// Green channel bytes.
    pub g: &'a [u8],
    /// Blue channel bytes.
    pub b: &'a [u8],
}

/// One parsed datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet<'a> {
    /// Image line fragment.
    Image(ImageFragment<'a>),
    /// Accelerometer sample; only X is consumed downstream.
    Imu {
        /// Raw acceleration, X/Y/Z.
        acc: [f32; 3],
    },
}

impl<'a> Packet<'a> {
    /// Parse one datagram.
    pub fn parse(data: &'a [u8]) -> Result<Packet<'a>, PacketError> {
        let Some(&kind) = data.first() else {
            return Err(PacketError::TruncatedHeader { got: 0 });
        };
        match kind {
            IMAGE_DATA => parse_image(data),
            IMU_DATA => parse_imu(data),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(data, offset))
}

fn parse_image(data: &[u8]) -> Result<Packet<'_>, PacketError> {
    if data.len() < IMAGE_HEADER_LEN {
        return Err(PacketError::TruncatedHeader { got: data.len() });
    }
    let line_id = read_u32(data, 1);
    let fragment_id = read_u32(data, 5);
    let total_fragments = read_u32(data, 9);
    let fragment_size = read_u32(data, 13);

    if total_fragments == 0 || total_fragments > MAX_FRAGMENTS_PER_LINE {
        return Err(PacketError::InvalidFragmentCount(total_fragments));
    }
    if fragment_id >= total_fragments {
        return Err(PacketError::FragmentOutOfRange {
            fragment_id,
            total_fragments,
        });
    }
    if fragment_size == 0 {
        return Err(PacketError::ZeroFragmentSize);
    }

    let size = fragment_size as usize;
    let expected = IMAGE_HEADER_LEN + 3 * size;
    if data.len() < expected {
        return Err(PacketError::TruncatedPayload {
            expected,
            got: data.len(),
        });
    }

    let payload = &data[IMAGE_HEADER_LEN..];
    Ok(Packet::Image(ImageFragment {
        line_id,
        fragment_id,
        total_fragments,
        fragment_size,
        r: &payload[..size],
        g: &payload[size..2 * size],
        b: &payload[2 * size..3 * size],
    }))
}

fn parse_imu(data: &[u8]) -> Result<Packet<'_>, PacketError> {
    if data.len() < IMU_PACKET_LEN {
        return Err(PacketError::TruncatedHeader { got: data.len() });
    }
    Ok(Packet::Imu {
        acc: [read_f32(data, 1), read_f32(data, 5), read_f32(data, 9)],
    })
}

/// Serialize an image fragment (test fixtures and the packet format's
/// single source of truth for byte layout).
pub fn encode_image_fragment(fragment: &ImageFragment<'_>) -> Vec<u8> {
    let size = fragment.fragment_size as usize;
    let mut out = Vec::with_capacity(IMAGE_HEADER_LEN + 3 * size);
    out.push(IMAGE_DATA);
    out.extend_from_slice(&fragment.line_id.to_le_bytes());
    out.extend_from_slice(&fragment.fragment_id.to_le_bytes());
    out.extend_from_slice(&fragment.total_fragments.to_le_bytes());
    out.extend_from_slice(&fragment.fragment_size.to_le_bytes());
    out.extend_from_slice(fragment.r);
    out.extend_from_slice(fragment.g);
    out.extend_from_slice(fragment.b);
    out
}

/// Serialize an IMU datagram.
pub fn encode_imu(acc: [f32; 3]) -> Vec<u8> {
    let mut out = Vec::with_capacity(IMU_PACKET_LEN);
    out.push(IMU_DATA);
    for axis in acc {
        out.extend_from_slice(&axis.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fragment(r: &[u8], g: &[u8], b: &[u8]) -> Vec<u8> {
        encode_image_fragment(&ImageFragment {
            line_id: 42,
            fragment_id: 1,
            total_fragments: 4,
            fragment_size: r.len() as u32,
            r,
            g,
            b,
        })
    }

    #[test]
    fn parses_image_fragment() {
        let data = sample_fragment(&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]);
        let Packet::Image(frag) = Packet::parse(&data).unwrap() else {
            panic!("expected image packet");
        };
        assert_eq!(frag.line_id, 42);
        assert_eq!(frag.fragment_id, 1);
        assert_eq!(frag.total_fragments, 4);
        assert_eq!(frag.r, &[1, 2, 3]);
        assert_eq!(frag.g, &[4, 5, 6]);
        assert_eq!(frag.b, &[7, 8, 9]);
    }

    #[test]
    fn parses_imu_packet() {
        let data = encode_imu([0.5, -1.0, 9.81]);
        let Packet::Imu { acc } = Packet::parse(&data).unwrap() else {
            panic!("expected imu packet");
        };
        assert_eq!(acc, [0.5, -1.0, 9.81]);
    }

    #[test]
    fn rejects_unknown_type() {
        assert_eq!(
            Packet::parse(&[0xEE, 0, 0]),
            Err(PacketError::UnknownType(0xEE))
        );
    }

    #[test]
    fn rejects_empty_datagram() {
        assert_eq!(
            Packet::parse(&[]),
            Err(PacketError::TruncatedHeader { got: 0 })
        );
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut data = sample_fragment(&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]);
        data.truncate(data.len() - 2);
        assert!(matches!(
            Packet::parse(&data),
            Err(PacketError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn rejects_fragment_id_out_of_range() {
        let mut data = sample_fragment(&[1], &[2], &[3]);
        // fragment_id field at offset 5: set to total_fragments
        data[5..9].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            Packet::parse(&data),
            Err(PacketError::FragmentOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_excessive_fragment_count() {
        let mut data = sample_fragment(&[1], &[2], &[3]);
        data[9..13].copy_from_slice(&(MAX_FRAGMENTS_PER_LINE + 1).to_le_bytes());
        assert!(matches!(
            Packet::parse(&data),
            Err(PacketError::InvalidFragmentCount(_))
        ));
    }

    #[test]
    fn rejects_zero_fragment_size() {
        let mut data = sample_fragment(&[1], &[2], &[3]);
        data[13..17].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(Packet::parse(&data), Err(PacketError::ZeroFragmentSize));
    }
}
