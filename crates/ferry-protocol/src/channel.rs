/// Datagram plumbing shared by both endpoints.
///
/// Wraps a blocking `UdpSocket` so the state machines see exactly one
/// receive primitive: a datagram or a timeout, nothing else. Delivery is
/// best-effort; the relay between the endpoints may drop, duplicate,
/// delay, or corrupt anything it forwards.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// OS receive buffer size. One segment is in flight at a time, so this
/// only has to absorb relay duplicates.
const RECV_BUF_SIZE: usize = 1024 * 1024;

pub struct DatagramChannel {
    socket: UdpSocket,
}

impl DatagramChannel {
    /// Bind a UDP socket with a receive timeout.
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> io::Result<DatagramChannel> {
        let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        sock.set_reuse_address(true)?;
        sock.set_recv_buffer_size(RECV_BUF_SIZE)?;
        sock.set_read_timeout(Some(read_timeout))?;
        sock.bind(&addr.into())?;
        let socket: UdpSocket = sock.into();
        Ok(DatagramChannel { socket })
    }

    /// Change the receive timeout. `timeout` must be non-zero.
    pub fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Best-effort send. The ARQ loop recovers if the channel eats it.
    pub fn send_to(&self, data: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, dest)
    }

    /// Receive one datagram, or `None` when the read timeout expires.
    pub fn recv_timeout(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, src)) => Ok(Some((len, src))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            // On Windows an ICMP port-unreachable surfaces as ConnectionReset
            // on the next recv. The peer simply isn't up yet; retry covers it.
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_recv_timeout_elapses_as_none() {
        let channel = DatagramChannel::bind(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(30),
        )
        .unwrap();
        let mut buf = [0u8; 16];
        let start = Instant::now();
        let received = channel.recv_timeout(&mut buf).unwrap();
        assert!(received.is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_datagram_round_trip() {
        let a = DatagramChannel::bind(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(500),
        )
        .unwrap();
        let b = DatagramChannel::bind(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(500),
        )
        .unwrap();

        a.send_to(b"ping", b.local_addr().unwrap()).unwrap();
        let mut buf = [0u8; 16];
        let (len, src) = b.recv_timeout(&mut buf).unwrap().expect("datagram lost");
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(src, a.local_addr().unwrap());
    }
}
