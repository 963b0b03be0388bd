//! UDP transport for the control and video endpoints
//!
//! The drone speaks from a fixed address with no session layer: both
//! endpoints bind a well-known local port and fire datagrams at the peer.
//!
//! # Socket sharing
//!
//! Each endpoint keeps its `UdpSocket` inside a `Mutex<Arc<UdpSocket>>`
//! slot. Callers clone the `Arc` under a momentary lock and then perform
//! I/O on the clone, so no lock is ever held across a syscall and the
//! watchdog can swap in a freshly bound socket at any time. Receive loops
//! pick up the replacement within one read timeout.
//!
//! # Send ordering
//!
//! All control-port sends pass through one FIFO serializer lock. A command
//! triple holds it across its three packets, which keeps the triple
//! contiguous ahead of the next control frame.

use super::stats::LinkStats;
use crate::error::{Error, Result};
use crate::protocol::constants::{HEARTBEAT_PACKET, TRIPLE_SPACING_MS};
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Read timeout on both sockets. Bounds how long a receive loop can miss
/// a shutdown flag or a rebound socket.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Rebind retry schedule for a lingering port reservation
const REBIND_RETRIES: u32 = 5;
const REBIND_RETRY_DELAY_MS: u64 = 100;

/// One UDP endpoint: a local well-known port and the drone-side peer
pub struct UdpEndpoint {
    slot: Mutex<Arc<UdpSocket>>,
    local_port: u16,
    peer: SocketAddr,
}

impl UdpEndpoint {
    pub fn bind(local_port: u16, peer: SocketAddr) -> Result<Self> {
        let socket = Self::open_socket(local_port)?;
        log::info!("bound UDP {} -> {}", local_port, peer);
        Ok(Self {
            slot: Mutex::new(Arc::new(socket)),
            local_port,
            peer,
        })
    }

    fn open_socket(local_port: u16) -> Result<UdpSocket> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(socket)
    }

    /// Current socket handle (receive loops re-fetch this every iteration)
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.slot.lock())
    }

    /// Replace the socket with a freshly bound one.
    ///
    /// The old port may linger briefly in the kernel after the previous
    /// socket drops, so `AddrInUse` is retried on a short schedule.
    pub fn rebind(&self) -> Result<()> {
        let mut attempt = 0;
        let socket = loop {
            match Self::open_socket(self.local_port) {
                Ok(s) => break s,
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::AddrInUse => {
                    attempt += 1;
                    if attempt > REBIND_RETRIES {
                        return Err(Error::Io(e));
                    }
                    thread::sleep(Duration::from_millis(REBIND_RETRY_DELAY_MS));
                }
                Err(e) => return Err(e),
            }
        };
        *self.slot.lock() = Arc::new(socket);
        log::info!("rebound UDP {}", self.local_port);
        Ok(())
    }

    /// Send one datagram to the peer
    pub fn send(&self, bytes: &[u8]) -> io::Result<usize> {
        self.socket().send_to(bytes, self.peer)
    }

    /// Receive one datagram; `Ok(None)` on read timeout
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.socket().recv_from(buf) {
            Ok((n, _from)) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Both drone endpoints plus the shared statistics block
pub struct UdpLink {
    ctl: UdpEndpoint,
    video: UdpEndpoint,
    stats: Arc<LinkStats>,
    /// FIFO serializer for all control-port sends
    send_lock: Mutex<()>,
}

impl UdpLink {
    pub fn open(drone_ip: std::net::IpAddr, ctl_port: u16, video_port: u16) -> Result<Self> {
        let ctl = UdpEndpoint::bind(ctl_port, SocketAddr::new(drone_ip, ctl_port))?;
        let video = UdpEndpoint::bind(video_port, SocketAddr::new(drone_ip, video_port))?;
        Ok(Self {
            ctl,
            video,
            stats: Arc::new(LinkStats::new()),
            send_lock: Mutex::new(()),
        })
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Send one 20-byte control frame (fire-and-forget, counted)
    pub fn send_control(&self, frame: &[u8]) -> Result<()> {
        let _guard = self.send_lock.lock();
        match self.ctl.send(frame) {
            Ok(_) => {
                self.stats.note_tx();
                Ok(())
            }
            Err(e) => {
                let failures = self.stats.note_send_failure();
                log::warn!("control send failed ({} consecutive): {}", failures, e);
                Err(Error::Io(e))
            }
        }
    }

    /// Send the single-byte keep-alive
    pub fn send_heartbeat(&self) -> Result<()> {
        let _guard = self.send_lock.lock();
        self.ctl.send(&HEARTBEAT_PACKET)?;
        log::trace!("heartbeat sent");
        Ok(())
    }

    /// Send a command triple contiguously with the wire spacing.
    ///
    /// Holds the serializer across all three packets so no control frame
    /// interleaves (triples complete before any subsequent frame).
    pub fn send_triple(&self, triple: &[[u8; 7]; 3]) -> Result<()> {
        let _guard = self.send_lock.lock();
        for (i, pkt) in triple.iter().enumerate() {
            self.ctl.send(pkt)?;
            if i < 2 {
                thread::sleep(Duration::from_millis(TRIPLE_SPACING_MS));
            }
        }
        Ok(())
    }

    /// Send a raw singleton on the control port (video start/stop)
    pub fn send_ctl_raw(&self, bytes: &[u8]) -> Result<()> {
        let _guard = self.send_lock.lock();
        self.ctl.send(bytes)?;
        Ok(())
    }

    /// Receive from the control port; updates rx counters on data
    pub fn recv_ctl(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        let n = self.ctl.recv(buf)?;
        if n.is_some() {
            self.stats.note_rx();
        }
        Ok(n)
    }

    /// Receive from the video port
    pub fn recv_video(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        let n = self.video.recv(buf)?;
        if n.is_some() {
            self.stats.note_video_rx();
        }
        Ok(n)
    }

    /// Rebind both endpoints (watchdog recovery path)
    pub fn rebind(&self) -> Result<()> {
        self.ctl.rebind()?;
        self.video.rebind()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    /// Bind on ephemeral loopback ports so tests never collide
    fn loopback_link() -> (UdpLink, UdpSocket) {
        let peer_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer = peer_socket.local_addr().unwrap();

        // A zero local port makes the OS pick; the peer is the test socket
        let ctl = UdpEndpoint::bind(0, peer).unwrap();
        let video = UdpEndpoint::bind(0, peer).unwrap();
        let link = UdpLink {
            ctl,
            video,
            stats: Arc::new(LinkStats::new()),
            send_lock: Mutex::new(()),
        };
        (link, peer_socket)
    }

    #[test]
    fn test_control_send_counts() {
        let (link, peer) = loopback_link();
        peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();

        link.send_control(&[0x66; 20]).unwrap();
        let mut buf = [0u8; 64];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(n, 20);
        assert_eq!(link.stats.counts().0, 1);
    }

    #[test]
    fn test_triple_arrives_in_order() {
        let (link, peer) = loopback_link();
        peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();

        let triple = crate::protocol::codec::command_triple(0x01, 0x01);
        link.send_triple(&triple).unwrap();

        let mut buf = [0u8; 64];
        for expected in &triple {
            let (n, _) = peer.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], expected.as_slice());
        }
    }

    #[test]
    fn test_recv_timeout_is_none() {
        let (link, _peer) = loopback_link();
        let mut buf = [0u8; 64];
        assert!(link.recv_ctl(&mut buf).unwrap().is_none());
        assert_eq!(link.stats.counts().1, 0);
    }

    #[test]
    fn test_rebind_swaps_socket() {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9);
        let ep = UdpEndpoint::bind(0, peer).unwrap();
        let before = Arc::as_ptr(&ep.socket());
        ep.rebind().unwrap();
        assert_ne!(before, Arc::as_ptr(&ep.socket()));
    }
}
