//! Live UDP input

use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;

use crate::error::{Error, Result};

const MAX_DATAGRAM: usize = 65_536;

/// Creates a blocking UDP socket bound to `addr`, joining the group when
/// the address is multicast.
pub fn create_udp_socket(addr: &str) -> Result<Socket> {
    let sock_addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    let IpAddr::V4(ip) = sock_addr.ip() else {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            "only IPv4 is supported",
        )));
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&sock_addr.into())?;

    if ip.is_multicast() {
        socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
        info!(%ip, "joined multicast group");
    }
    Ok(socket)
}

/// Byte stream over received datagrams. Each datagram is served whole
/// before the next one is received.
pub struct UdpTsReader {
    socket: Socket,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl UdpTsReader {
    pub fn bind(addr: &str) -> Result<Self> {
        Ok(Self::new(create_udp_socket(addr)?))
    }

    pub fn new(socket: Socket) -> Self {
        Self {
            socket,
            buf: vec![0; MAX_DATAGRAM],
            pos: 0,
            len: 0,
        }
    }
}

impl Read for UdpTsReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        // empty datagrams would read as end of stream
        while self.pos == self.len {
            self.len = (&self.socket).read(&mut self.buf)?;
            self.pos = 0;
        }
        let n = out.len().min(self.len - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ipv6() {
        assert!(create_udp_socket("[::1]:1234").is_err());
    }

    #[test]
    fn serves_datagrams_as_a_stream() {
        let mut rdr = UdpTsReader::bind("127.0.0.1:0").unwrap();
        let local = rdr.socket.local_addr().unwrap().as_socket().unwrap();
        let tx = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        tx.send_to(&[0x47, 1, 2, 3, 4], local).unwrap();

        let mut first = [0u8; 2];
        rdr.read_exact(&mut first).unwrap();
        assert_eq!(first, [0x47, 1]);
        let mut rest = [0u8; 3];
        rdr.read_exact(&mut rest).unwrap();
        assert_eq!(rest, [2, 3, 4]);
    }
}
