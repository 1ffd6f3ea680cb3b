/// Link endpoint: one UDP socket bound to one remote peer.
///
/// Turns an outgoing payload into a checksummed frame and emits it as a
/// single datagram; turns an incoming datagram into a validated payload or
/// a distinguished timeout. Strictly blocking — a call occupies the thread
/// until data, deadline, or error.
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::error::LinkError;
use crate::frame::{self, FRAME_MAX, LINK_PAYLOAD_MAX};

/// A framing endpoint. Exactly one peer per endpoint — no multiplexing.
///
/// Dropping the endpoint closes the socket; there are no partial states.
pub struct LinkEndpoint {
    socket: UdpSocket,
    peer: SocketAddr,
    /// Low 16 bits of the peer's IPv4 address. The field survives on the
    /// wire for compatibility but cannot identify a peer and is never read
    /// for routing — receivers ignore it.
    dest_tag: u16,
    send_buf: Vec<u8>,
    recv_buf: Vec<u8>,
}

impl LinkEndpoint {
    /// Open a UDP socket and point it at `peer_ip:peer_port`.
    pub fn connect(peer_ip: &str, peer_port: u16) -> Result<Self, LinkError> {
        let ip: Ipv4Addr = peer_ip
            .parse()
            .map_err(|_| LinkError::Address(peer_ip.to_string()))?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(LinkError::Channel)?;
        socket.set_nonblocking(false).map_err(LinkError::Channel)?;
        socket
            .bind(&SocketAddr::from(([0, 0, 0, 0], 0)).into())
            .map_err(LinkError::Channel)?;

        Self::from_socket(socket.into(), SocketAddr::V4(SocketAddrV4::new(ip, peer_port)))
    }

    /// Wrap a pre-bound socket. Lets the caller learn its own port before
    /// the peer starts, avoiding port races between cooperating endpoints.
    pub fn from_socket(socket: UdpSocket, peer: SocketAddr) -> Result<Self, LinkError> {
        let dest_tag = match peer {
            SocketAddr::V4(v4) => (u32::from(*v4.ip()) & 0xFFFF) as u16,
            SocketAddr::V6(_) => 0,
        };
        info!(%peer, local = ?socket.local_addr().ok(), "link endpoint up");
        Ok(LinkEndpoint {
            socket,
            peer,
            dest_tag,
            send_buf: vec![0u8; FRAME_MAX],
            recv_buf: vec![0u8; FRAME_MAX],
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Remote peer this endpoint is fixed to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Frame `payload` and transmit it as one atomic datagram.
    ///
    /// Returns the payload length accepted. Payloads over `LINK_PAYLOAD_MAX`
    /// are rejected, never split or truncated here.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        if payload.len() > LINK_PAYLOAD_MAX {
            return Err(LinkError::PayloadTooLarge {
                len: payload.len(),
                max: LINK_PAYLOAD_MAX,
            });
        }

        let total = frame::encode_frame(&mut self.send_buf, self.dest_tag, payload);
        let sent = self.socket.send_to(&self.send_buf[..total], self.peer)?;
        debug_assert_eq!(sent, total, "UDP send must not split a frame");
        debug!(bytes = payload.len(), frame = total, "frame sent");
        Ok(payload.len())
    }

    /// Wait for one valid frame, at most until `deadline` elapses.
    ///
    /// `Ok(Some(n))` — a frame arrived and `n` payload bytes were copied
    /// into `buf`. `Ok(None)` — the deadline passed with no datagram
    /// (a signal, not an error). Corrupted or malformed datagrams are
    /// dropped and reported as errors; they never come back as data.
    /// A `None` deadline blocks indefinitely.
    pub fn recv_deadline(
        &mut self,
        buf: &mut [u8],
        deadline: Option<Duration>,
    ) -> Result<Option<usize>, LinkError> {
        self.socket.set_read_timeout(deadline)?;

        let (received, from) = match self.socket.recv_from(&mut self.recv_buf) {
            Ok(ok) => ok,
            Err(e) if deadline.is_some() && wait_expired(&e) => {
                debug!("receive deadline elapsed");
                return Ok(None);
            }
            Err(e) => return Err(LinkError::Io(e)),
        };

        let (_, payload) = frame::decode_frame(&self.recv_buf[..received]).inspect_err(
            |e| debug!(%from, bytes = received, "dropping bad frame: {e}"),
        )?;
        if payload.len() > buf.len() {
            return Err(LinkError::BufferTooSmall {
                len: payload.len(),
                capacity: buf.len(),
            });
        }

        buf[..payload.len()].copy_from_slice(payload);
        debug!(%from, bytes = payload.len(), "frame received");
        Ok(Some(payload.len()))
    }

    /// Wait indefinitely for one valid frame.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.recv_deadline(buf, None)? {
            Some(n) => Ok(n),
            // A wait without a deadline cannot time out.
            None => unreachable!("indefinite receive reported a timeout"),
        }
    }
}

/// True when `recv_from` gave up because the read timeout elapsed.
/// Unix reports `WouldBlock`, Windows `TimedOut`.
fn wait_expired(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_frame, LINK_HEADER};

    fn pair() -> (LinkEndpoint, LinkEndpoint) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        (
            LinkEndpoint::from_socket(a, b_addr).unwrap(),
            LinkEndpoint::from_socket(b, a_addr).unwrap(),
        )
    }

    #[test]
    fn loopback_roundtrip() {
        let (mut a, mut b) = pair();
        let mut buf = [0u8; LINK_PAYLOAD_MAX];

        assert_eq!(a.send(b"over the wire").unwrap(), 13);
        let n = b
            .recv_deadline(&mut buf, Some(Duration::from_secs(2)))
            .unwrap()
            .expect("frame should arrive on loopback");
        assert_eq!(&buf[..n], b"over the wire");
    }

    #[test]
    fn max_payload_accepted_one_over_rejected() {
        let (mut a, mut b) = pair();
        let payload = [0xA5u8; LINK_PAYLOAD_MAX];

        assert_eq!(a.send(&payload).unwrap(), LINK_PAYLOAD_MAX);
        let mut buf = [0u8; LINK_PAYLOAD_MAX];
        let n = b
            .recv_deadline(&mut buf, Some(Duration::from_secs(2)))
            .unwrap()
            .unwrap();
        assert_eq!(n, LINK_PAYLOAD_MAX);

        let oversized = [0u8; LINK_PAYLOAD_MAX + 1];
        assert!(matches!(
            a.send(&oversized),
            Err(LinkError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn indefinite_recv_returns_first_frame() {
        let (mut a, mut b) = pair();
        a.send(b"no deadline needed").unwrap();

        let mut buf = [0u8; LINK_PAYLOAD_MAX];
        let n = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"no deadline needed");
    }

    #[test]
    fn deadline_elapses_without_peer() {
        let (mut a, _b) = pair();
        let mut buf = [0u8; 16];
        let got = a
            .recv_deadline(&mut buf, Some(Duration::from_millis(40)))
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn corrupted_datagram_reported_not_delivered() {
        let (mut a, _b) = pair();
        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();

        let mut frame = [0u8; FRAME_MAX];
        let total = encode_frame(&mut frame, 0, b"payload");
        frame[LINK_HEADER] ^= 0x01; // corrupt after sealing the checksum
        raw.send_to(&frame[..total], a.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 64];
        assert!(matches!(
            a.recv_deadline(&mut buf, Some(Duration::from_secs(2))),
            Err(LinkError::Checksum { .. })
        ));
    }

    #[test]
    fn runt_datagram_rejected() {
        let (mut a, _b) = pair();
        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(&[1, 2, 3], a.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 64];
        assert!(matches!(
            a.recv_deadline(&mut buf, Some(Duration::from_secs(2))),
            Err(LinkError::TooShort(3))
        ));
    }

    #[test]
    fn caller_buffer_too_small() {
        let (mut a, mut b) = pair();
        a.send(b"twelve bytes").unwrap();

        let mut tiny = [0u8; 4];
        assert!(matches!(
            b.recv_deadline(&mut tiny, Some(Duration::from_secs(2))),
            Err(LinkError::BufferTooSmall { len: 12, capacity: 4 })
        ));
    }

    #[test]
    fn bad_address_rejected() {
        assert!(matches!(
            LinkEndpoint::connect("not-an-ip", 5000),
            Err(LinkError::Address(_))
        ));
    }
}
