use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::protocol::{MAX_PACKET_SIZE, Packet};
use crate::subject::{InsertOutcome, SubjectRegistry};

/// Shared ingestion counters, written by the receive loop and read from the
/// publish side without locking.
#[derive(Debug, Default)]
pub struct ReceiverCounters {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    malformed_packets: AtomicU64,
    frames_accepted: AtomicU64,
    duplicates_dropped: AtomicU64,
    frames_evicted: AtomicU64,
    rigs_received: AtomicU64,
}

impl ReceiverCounters {
    pub fn snapshot(&self) -> ReceiverStats {
        ReceiverStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            rigs_received: self.rigs_received.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub malformed_packets: u64,
    pub frames_accepted: u64,
    pub duplicates_dropped: u64,
    pub frames_evicted: u64,
    pub rigs_received: u64,
}

/// Owns the UDP socket and feeds decoded packets into the subject registry.
///
/// The socket blocks with a short read timeout rather than spinning
/// non-blocking, so the owning loop can run liveness ticks at a steady
/// cadence even when the sender goes silent.
pub struct ReceiverEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    counters: Arc<ReceiverCounters>,
}

impl ReceiverEndpoint {
    pub fn bind(addr: SocketAddr, recv_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(recv_timeout))?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            counters: Arc::new(ReceiverCounters::default()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn counters(&self) -> Arc<ReceiverCounters> {
        Arc::clone(&self.counters)
    }

    /// Waits up to the read timeout for one datagram and routes it into the
    /// registry. Returns `Ok(false)` when the wait timed out; socket errors
    /// other than would-block/timeout are handed back to the caller.
    pub fn recv_once(&mut self, registry: &SubjectRegistry) -> io::Result<bool> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((size, addr)) => {
                let data = &self.recv_buffer[..size];
                self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_received
                    .fetch_add(size as u64, Ordering::Relaxed);

                match Packet::decode(data) {
                    Ok(Packet::Pose(frame)) => {
                        match registry.insert_frame(frame, Instant::now()) {
                            InsertOutcome::Accepted { evicted } => {
                                self.counters.frames_accepted.fetch_add(1, Ordering::Relaxed);
                                if evicted > 0 {
                                    self.counters
                                        .frames_evicted
                                        .fetch_add(evicted as u64, Ordering::Relaxed);
                                    log::trace!("evicted {} buffered frames", evicted);
                                }
                            }
                            InsertOutcome::Duplicate => {
                                self.counters
                                    .duplicates_dropped
                                    .fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    Ok(Packet::Rig(rig)) => {
                        registry.set_rig(rig, Instant::now());
                        self.counters.rigs_received.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        self.counters
                            .malformed_packets
                            .fetch_add(1, Ordering::Relaxed);
                        log::debug!("dropping malformed packet from {}: {}", addr, err);
                    }
                }
                Ok(true)
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceConfig;
    use crate::net::protocol::PoseFrame;

    fn loopback_endpoint() -> (ReceiverEndpoint, UdpSocket) {
        let endpoint = ReceiverEndpoint::bind(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(200),
        )
        .unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.connect(endpoint.local_addr()).unwrap();
        (endpoint, sender)
    }

    #[test]
    fn decoded_frame_reaches_registry() {
        let (mut endpoint, sender) = loopback_endpoint();
        let registry = SubjectRegistry::new(&SourceConfig::default());

        let frame = PoseFrame::new(3, 1, 1000);
        sender.send(&frame.encode()).unwrap();

        assert!(endpoint.recv_once(&registry).unwrap());
        assert_eq!(endpoint.counters().snapshot().frames_accepted, 1);
        assert!(registry.contains(3));
    }

    #[test]
    fn malformed_packet_counted_not_routed() {
        let (mut endpoint, sender) = loopback_endpoint();
        let registry = SubjectRegistry::new(&SourceConfig::default());

        sender.send(&[0u8; 8]).unwrap();

        assert!(endpoint.recv_once(&registry).unwrap());
        let stats = endpoint.counters().snapshot();
        assert_eq!(stats.malformed_packets, 1);
        assert_eq!(stats.frames_accepted, 0);
        assert_eq!(registry.subject_count(), 0);
    }

    #[test]
    fn silent_socket_times_out_cleanly() {
        let (mut endpoint, _sender) = loopback_endpoint();
        let registry = SubjectRegistry::new(&SourceConfig::default());

        assert!(!endpoint.recv_once(&registry).unwrap());
    }
}
