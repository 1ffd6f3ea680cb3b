/// ARQ packet format, carried inside a link-layer payload.
///
/// ```text
/// [0]   Type: DATA=1, ACK=2, RESET=3
/// [1]   Sequence number (0 or 1)
/// [2]   Acknowledgment number (0 or 1, meaningful on ACK)
/// [3]   Reserved, must be zero
/// [4..] Payload (DATA only, up to 1462 bytes)
/// ```
///
/// An ACK confirms a DATA frame by carrying the complement of its sequence
/// bit in the acknowledgment field.
use skiff_link::{LINK_HEADER, LINK_PAYLOAD_MAX};

/// Packet header size in bytes.
pub const ARQ_HEADER: usize = 4;

/// Maximum payload bytes per packet.
pub const ARQ_PAYLOAD_MAX: usize = LINK_PAYLOAD_MAX - ARQ_HEADER;

// A full ARQ packet plus both headers must fit one link frame.
const _: () = assert!(ARQ_PAYLOAD_MAX + ARQ_HEADER + LINK_HEADER <= skiff_link::FRAME_MAX);

/// Packet types on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 1,
    Ack = 2,
    Reset = 3,
}

impl PacketType {
    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(PacketType::Data),
            2 => Some(PacketType::Ack),
            3 => Some(PacketType::Reset),
            _ => None,
        }
    }
}

/// An ARQ packet header (parsed from wire format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub ty: PacketType,
    pub seq: u8,
    pub ack: u8,
    /// Carried so receivers can drop packets that violate the
    /// must-be-zero rule.
    pub reserved: u8,
}

impl PacketHeader {
    pub fn data(seq: u8) -> Self {
        PacketHeader {
            ty: PacketType::Data,
            seq,
            ack: 0,
            reserved: 0,
        }
    }

    /// ACK for a DATA packet carrying `seq`: the acknowledgment number is
    /// the complement of the acknowledged sequence bit.
    pub fn ack_for(seq: u8) -> Self {
        PacketHeader {
            ty: PacketType::Ack,
            seq: 0,
            ack: seq ^ 1,
            reserved: 0,
        }
    }

    pub fn reset() -> Self {
        PacketHeader {
            ty: PacketType::Reset,
            seq: 0,
            ack: 0,
            reserved: 0,
        }
    }

    /// Serialize into the first `ARQ_HEADER` bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= ARQ_HEADER);
        buf[0] = self.ty as u8;
        buf[1] = self.seq;
        buf[2] = self.ack;
        buf[3] = 0;
    }

    /// Parse a header from raw bytes. Returns None if the buffer is too
    /// short or the type byte is unknown.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ARQ_HEADER {
            return None;
        }
        Some(PacketHeader {
            ty: PacketType::from_wire(buf[0])?,
            seq: buf[1],
            ack: buf[2],
            reserved: buf[3],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_header() {
        let hdr = PacketHeader::data(1);
        let mut buf = [0u8; ARQ_HEADER];
        hdr.write_to(&mut buf);
        assert_eq!(buf, [1, 1, 0, 0]);
        assert_eq!(PacketHeader::parse(&buf), Some(hdr));
    }

    #[test]
    fn ack_carries_complement() {
        assert_eq!(PacketHeader::ack_for(0).ack, 1);
        assert_eq!(PacketHeader::ack_for(1).ack, 0);
        let mut buf = [0u8; ARQ_HEADER];
        PacketHeader::ack_for(0).write_to(&mut buf);
        assert_eq!(buf, [2, 0, 1, 0]);
    }

    #[test]
    fn reject_unknown_type() {
        assert!(PacketHeader::parse(&[9, 0, 0, 0]).is_none());
    }

    #[test]
    fn reject_short_buffer() {
        assert!(PacketHeader::parse(&[1, 0, 0]).is_none());
    }

    #[test]
    fn nonzero_reserved_survives_parse() {
        // The receive loop, not the codec, enforces must-be-zero.
        let hdr = PacketHeader::parse(&[3, 0, 0, 7]).unwrap();
        assert_eq!(hdr.ty, PacketType::Reset);
        assert_eq!(hdr.reserved, 7);
    }
}
