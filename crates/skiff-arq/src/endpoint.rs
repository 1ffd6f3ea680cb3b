/// ARQ endpoint: stop-and-wait reliable delivery over a link endpoint.
///
/// ```text
/// send():  DATA(seq) --->            recv():            <--- DATA(seq)
///          wait 1s for ACK(!seq)     ACK(!seq) --->
///          retransmit on timeout     flip expected bit
///          up to 5 attempts          re-ACK duplicates, deliver once
/// ```
///
/// One DATA frame in flight at a time; the alternating sequence bit tells a
/// frame from its own retransmission. A DATA frame that arrives while a
/// send is awaiting its ACK (piggy-back collision) is acknowledged at once
/// and parked in a single pending slot for the next `recv`.
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, info, warn};

use skiff_link::{LinkEndpoint, LinkError};

use crate::error::ArqError;
use crate::packet::{ARQ_HEADER, ARQ_PAYLOAD_MAX, PacketHeader, PacketType};

/// Tuning knobs for the retry machinery. The defaults are the protocol's
/// fixed reference values; tests shrink the timeout to keep runs fast.
#[derive(Debug, Clone)]
pub struct ArqConfig {
    /// How long one attempt waits for a reply.
    pub ack_timeout: Duration,
    /// Transmission attempts before a send is declared failed.
    pub max_attempts: u32,
    /// Whether a malformed or undecodable reply burns an attempt (the
    /// reference behavior) or merely restarts the wait.
    pub malformed_reply_consumes_attempt: bool,
    /// RESET packets emitted by `shutdown`.
    pub shutdown_resets: u32,
}

impl Default for ArqConfig {
    fn default() -> Self {
        ArqConfig {
            ack_timeout: Duration::from_secs(1),
            max_attempts: 5,
            malformed_reply_consumes_attempt: true,
            shutdown_resets: 3,
        }
    }
}

/// Result of a completed `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Payload delivered and acknowledged; carries the accepted length
    /// (silently truncated to `ARQ_PAYLOAD_MAX`).
    Accepted(usize),
    /// The peer tore the session down; stop sending on this endpoint.
    PeerReset,
}

/// Result of a completed `recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// Payload bytes copied into the caller's buffer.
    Data(usize),
    /// The peer tore the session down.
    PeerReset,
}

/// One DATA packet parked while a send was in flight. The payload bytes
/// live in the endpoint's reusable pending buffer.
struct PendingFrame {
    header: PacketHeader,
    len: usize,
}

/// A reliable stop-and-wait endpoint. Owns its link endpoint exclusively;
/// dropping the ARQ endpoint releases the socket.
///
/// Not reentrant: `send` and `recv` take `&mut self`, so concurrent use
/// from several threads needs external mutual exclusion by construction.
pub struct ArqEndpoint {
    link: LinkEndpoint,
    config: ArqConfig,
    send_seq: u8,
    expected_seq: u8,
    pending: Option<PendingFrame>,
    // Reusable buffers, sized once — no per-call allocation.
    packet_buf: Vec<u8>,
    recv_buf: Vec<u8>,
    pending_buf: Vec<u8>,
}

impl ArqEndpoint {
    /// Connect to a peer with the default configuration.
    pub fn connect(peer_ip: &str, peer_port: u16) -> Result<Self, ArqError> {
        Self::connect_with(peer_ip, peer_port, ArqConfig::default())
    }

    /// Connect to a peer. Ports below 1024 are refused — this protocol has
    /// no business on privileged ports.
    pub fn connect_with(
        peer_ip: &str,
        peer_port: u16,
        config: ArqConfig,
    ) -> Result<Self, ArqError> {
        if peer_port < 1024 {
            return Err(ArqError::PrivilegedPort(peer_port));
        }
        Ok(Self::wrap(LinkEndpoint::connect(peer_ip, peer_port)?, config))
    }

    /// Wrap a pre-bound socket, so cooperating endpoints can learn each
    /// other's ports before either starts.
    pub fn from_socket(
        socket: UdpSocket,
        peer: SocketAddr,
        config: ArqConfig,
    ) -> Result<Self, ArqError> {
        Ok(Self::wrap(LinkEndpoint::from_socket(socket, peer)?, config))
    }

    fn wrap(link: LinkEndpoint, config: ArqConfig) -> Self {
        info!(peer = %link.peer_addr(), "arq endpoint up");
        ArqEndpoint {
            link,
            config,
            send_seq: 0,
            expected_seq: 0,
            pending: None,
            packet_buf: vec![0u8; ARQ_HEADER + ARQ_PAYLOAD_MAX],
            recv_buf: vec![0u8; ARQ_HEADER + ARQ_PAYLOAD_MAX],
            pending_buf: vec![0u8; ARQ_PAYLOAD_MAX],
        }
    }

    /// Local address of the owned socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.link.local_addr()
    }

    /// Current (send, expected-receive) sequence bits.
    pub fn sequence_bits(&self) -> (u8, u8) {
        (self.send_seq, self.expected_seq)
    }

    /// True when a piggy-backed DATA frame is parked for the next `recv`.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Send `data` reliably. Blocks until the matching ACK arrives, the
    /// peer resets the session, or the attempt budget runs out.
    ///
    /// Payloads over `ARQ_PAYLOAD_MAX` are silently truncated — a defined
    /// policy, not an error. On `RetriesExhausted` the sequence bit is
    /// unchanged and the caller may retry the whole send.
    pub fn send(&mut self, data: &[u8]) -> Result<SendOutcome, ArqError> {
        let len = data.len().min(ARQ_PAYLOAD_MAX);
        if len < data.len() {
            debug!(given = data.len(), accepted = len, "payload truncated");
        }

        PacketHeader::data(self.send_seq).write_to(&mut self.packet_buf);
        self.packet_buf[ARQ_HEADER..ARQ_HEADER + len].copy_from_slice(&data[..len]);
        let packet_len = ARQ_HEADER + len;

        for attempt in 1..=self.config.max_attempts {
            self.link.send(&self.packet_buf[..packet_len])?;
            debug!(attempt, seq = self.send_seq, bytes = len, "data transmitted");

            // One bounded wait per attempt. Only a malformed reply can
            // restart it, and only when configured not to burn the attempt.
            loop {
                let reply_len = match self
                    .link
                    .recv_deadline(&mut self.recv_buf, Some(self.config.ack_timeout))
                {
                    Ok(Some(n)) => n,
                    Ok(None) => {
                        debug!(attempt, "no reply within deadline");
                        break;
                    }
                    Err(e) if dropped_frame(&e) => {
                        if self.config.malformed_reply_consumes_attempt {
                            break;
                        }
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                let Some(header) = PacketHeader::parse(&self.recv_buf[..reply_len]) else {
                    debug!(bytes = reply_len, "ignoring undecodable reply");
                    if self.config.malformed_reply_consumes_attempt {
                        break;
                    }
                    continue;
                };

                match header.ty {
                    PacketType::Reset => {
                        info!("peer reset during send");
                        return Ok(SendOutcome::PeerReset);
                    }
                    PacketType::Ack if header.ack == (self.send_seq ^ 1) => {
                        self.send_seq ^= 1;
                        debug!(attempt, bytes = len, "acknowledged");
                        return Ok(SendOutcome::Accepted(len));
                    }
                    PacketType::Ack => {
                        debug!(ack = header.ack, "stale ack ignored");
                        break;
                    }
                    PacketType::Data => {
                        // Piggy-back collision: the peer is sending too.
                        // ACK at once so it is not stuck retransmitting,
                        // park the frame for the next recv if the slot is
                        // free.
                        debug!(seq = header.seq, "data while awaiting ack");
                        self.acknowledge(header.seq)?;
                        self.park_pending(header, reply_len - ARQ_HEADER);
                        break;
                    }
                }
            }
        }

        warn!(
            attempts = self.config.max_attempts,
            "send failed, no acknowledgment"
        );
        Err(ArqError::RetriesExhausted(self.config.max_attempts))
    }

    /// Receive one payload reliably. Blocks indefinitely until in-sequence
    /// DATA arrives or the peer resets the session.
    ///
    /// Duplicated retransmissions are re-acknowledged but delivered exactly
    /// once. A frame parked during a previous `send` is drained before the
    /// socket is touched.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, ArqError> {
        if let Some(parked) = self.pending.take() {
            if parked.header.seq == self.expected_seq {
                let n = parked.len.min(buf.len());
                buf[..n].copy_from_slice(&self.pending_buf[..n]);
                self.acknowledge(parked.header.seq)?;
                self.expected_seq ^= 1;
                debug!(bytes = n, "delivered parked frame");
                return Ok(RecvOutcome::Data(n));
            }
            // Stale duplicate parked during a send: ack it again so the
            // peer makes progress, deliver nothing.
            debug!(seq = parked.header.seq, "re-acking stale parked frame");
            self.acknowledge(parked.header.seq)?;
        }

        loop {
            let n = match self.link.recv(&mut self.recv_buf) {
                Ok(n) => n,
                Err(e) if dropped_frame(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            let Some(header) = PacketHeader::parse(&self.recv_buf[..n]) else {
                debug!(bytes = n, "ignoring undecodable packet");
                continue;
            };
            if header.reserved != 0 {
                debug!("dropping packet with nonzero reserved byte");
                continue;
            }

            match header.ty {
                PacketType::Reset => {
                    info!("peer reset during recv");
                    return Ok(RecvOutcome::PeerReset);
                }
                PacketType::Data if header.seq == self.expected_seq => {
                    let copy = (n - ARQ_HEADER).min(buf.len());
                    buf[..copy].copy_from_slice(&self.recv_buf[ARQ_HEADER..ARQ_HEADER + copy]);
                    self.acknowledge(header.seq)?;
                    self.expected_seq ^= 1;
                    debug!(bytes = copy, "delivered");
                    return Ok(RecvOutcome::Data(copy));
                }
                PacketType::Data => {
                    // The peer missed our ACK and retransmitted.
                    debug!(seq = header.seq, "re-acking duplicate data");
                    self.acknowledge(header.seq)?;
                }
                PacketType::Ack => {
                    debug!(ack = header.ack, "stray ack ignored");
                }
            }
        }
    }

    /// Signal session teardown: transmit a burst of RESET packets so the
    /// peer's blocked `send`/`recv` return `PeerReset`. Distinct from
    /// resource release — dropping the endpoint only closes the socket.
    pub fn shutdown(&mut self) -> Result<(), ArqError> {
        let mut packet = [0u8; ARQ_HEADER];
        PacketHeader::reset().write_to(&mut packet);
        for _ in 0..self.config.shutdown_resets {
            self.link.send(&packet)?;
        }
        info!(resets = self.config.shutdown_resets, "session teardown signaled");
        Ok(())
    }

    /// Transmit an ACK for a DATA packet carrying `seq`.
    fn acknowledge(&mut self, seq: u8) -> Result<(), ArqError> {
        let mut packet = [0u8; ARQ_HEADER];
        PacketHeader::ack_for(seq).write_to(&mut packet);
        self.link.send(&packet)?;
        debug!(ack = seq ^ 1, "ack transmitted");
        Ok(())
    }

    /// Park an unsolicited DATA frame for the next `recv`. The slot holds
    /// at most one frame; later arrivals are dropped (they were already
    /// acknowledged, so the peer is not blocked).
    fn park_pending(&mut self, header: PacketHeader, payload_len: usize) {
        if self.pending.is_some() {
            debug!("pending slot occupied, dropping extra frame");
            return;
        }
        self.pending_buf[..payload_len]
            .copy_from_slice(&self.recv_buf[ARQ_HEADER..ARQ_HEADER + payload_len]);
        self.pending = Some(PendingFrame {
            header,
            len: payload_len,
        });
    }
}

/// Corruption-class link errors mean the datagram was dropped on the floor;
/// the retransmission cycle is the recovery path, so the state machine
/// keeps going. Anything else (socket i/o) is fatal to the endpoint.
fn dropped_frame(e: &LinkError) -> bool {
    match e {
        LinkError::Checksum { .. }
        | LinkError::TooShort(_)
        | LinkError::LengthMismatch { .. }
        | LinkError::BufferTooSmall { .. } => {
            debug!("link dropped a frame: {e}");
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privileged_port_refused() {
        assert!(matches!(
            ArqEndpoint::connect("127.0.0.1", 80),
            Err(ArqError::PrivilegedPort(80))
        ));
    }

    #[test]
    fn fresh_endpoint_state() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer = "127.0.0.1:9999".parse().unwrap();
        let ep = ArqEndpoint::from_socket(socket, peer, ArqConfig::default()).unwrap();
        assert_eq!(ep.sequence_bits(), (0, 0));
        assert!(!ep.has_pending());
    }

    #[test]
    fn reference_defaults() {
        let config = ArqConfig::default();
        assert_eq!(config.ack_timeout, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 5);
        assert!(config.malformed_reply_consumes_attempt);
    }
}
