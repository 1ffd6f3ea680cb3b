/// Link frame format and checksum.
///
/// Every datagram on the wire is one frame (big-endian):
///
/// ```text
/// [0..2]  Destination tag (u16) — vestigial, see `LinkEndpoint`
/// [2..4]  Total length (u16), header + payload
/// [4]     Checksum: XOR of every frame byte with this field zeroed
/// [5]     Reserved, zero on send
/// [6..]   Payload (up to 1466 bytes)
/// ```
///
/// Max frame = 1472 bytes (1500 MTU - 20 IP - 8 UDP), so a full frame
/// never fragments on an Ethernet path.
use crate::error::LinkError;

/// Frame header size in bytes.
pub const LINK_HEADER: usize = 6;

/// Maximum frame size (header + payload).
pub const FRAME_MAX: usize = 1472;

/// Maximum payload bytes per frame.
pub const LINK_PAYLOAD_MAX: usize = FRAME_MAX - LINK_HEADER;

/// Byte offset of the checksum field.
const CHECKSUM_OFFSET: usize = 4;

/// XOR all bytes of `frame`, treating the checksum field as zero.
///
/// XORing the carried checksum back out is equivalent to zeroing it first,
/// so validation never needs a mutable copy of the datagram.
pub fn frame_checksum(frame: &[u8]) -> u8 {
    let mut sum = frame.iter().fold(0u8, |acc, b| acc ^ b);
    if frame.len() > CHECKSUM_OFFSET {
        sum ^= frame[CHECKSUM_OFFSET];
    }
    sum
}

/// A frame header (parsed from wire format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub dest_tag: u16,
    pub total_len: u16,
    pub checksum: u8,
}

impl FrameHeader {
    /// Serialize into the first `LINK_HEADER` bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= LINK_HEADER);
        buf[0..2].copy_from_slice(&self.dest_tag.to_be_bytes());
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4] = self.checksum;
        buf[5] = 0;
    }

    /// Parse a header from raw bytes. Returns None if the buffer is too short.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < LINK_HEADER {
            return None;
        }
        Some(FrameHeader {
            dest_tag: u16::from_be_bytes([buf[0], buf[1]]),
            total_len: u16::from_be_bytes([buf[2], buf[3]]),
            checksum: buf[4],
        })
    }
}

/// Encode a frame into `buf`: header, payload copy, then the checksum over
/// the finished frame. Returns the total frame length.
///
/// # Panics
/// Panics if `buf` is smaller than `LINK_HEADER + payload.len()` or the
/// payload exceeds `LINK_PAYLOAD_MAX`.
pub fn encode_frame(buf: &mut [u8], dest_tag: u16, payload: &[u8]) -> usize {
    let total = LINK_HEADER + payload.len();
    assert!(buf.len() >= total);
    assert!(payload.len() <= LINK_PAYLOAD_MAX);

    FrameHeader {
        dest_tag,
        total_len: total as u16,
        checksum: 0,
    }
    .write_to(buf);
    buf[LINK_HEADER..total].copy_from_slice(payload);
    buf[CHECKSUM_OFFSET] = frame_checksum(&buf[..total]);
    total
}

/// Validate a received datagram and return its header and payload slice.
///
/// Rejects datagrams shorter than the header, frames whose declared total
/// length disagrees with the datagram, and frames whose checksum does not
/// re-compute. Rejected frames are dropped by the caller; nothing here is
/// surfaced as data.
pub fn decode_frame(datagram: &[u8]) -> Result<(FrameHeader, &[u8]), LinkError> {
    let header = FrameHeader::parse(datagram).ok_or(LinkError::TooShort(datagram.len()))?;

    let want = frame_checksum(datagram);
    if header.checksum != want {
        return Err(LinkError::Checksum {
            got: header.checksum,
            want,
        });
    }

    let declared = header.total_len as usize;
    if declared < LINK_HEADER || declared != datagram.len() {
        return Err(LinkError::LengthMismatch {
            declared,
            received: datagram.len(),
        });
    }

    Ok((header, &datagram[LINK_HEADER..declared]))
}
