use socket2::Protocol;
use std::io;
use std::net::SocketAddr;

/// Bind a non-blocking UDP socket on exactly `addr`.
///
/// The address is never shared with another socket (no `SO_REUSEADDR`), so a
/// port held by someone else surfaces as [`io::ErrorKind::AddrInUse`].
pub fn bind_udp(addr: SocketAddr) -> io::Result<tokio::net::UdpSocket> {
    let socket = bind_udp_ops(addr, true)?;
    tokio::net::UdpSocket::from_std(socket.into())
}

pub(crate) fn bind_udp_ops(addr: SocketAddr, only_v6: bool) -> io::Result<socket2::Socket> {
    let socket = if addr.is_ipv4() {
        socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(Protocol::UDP),
        )?
    } else {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV6,
            socket2::Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket.set_only_v6(only_v6)?;
        socket
    };
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket)
}

/// Whether a bind failure is port contention rather than a real fault.
pub fn is_addr_in_use(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::AddrInUse
}
