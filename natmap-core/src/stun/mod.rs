//! Reflection (STUN) client used to learn the external address of a local one.
//!
//! The [`Reflector`] trait is the seam the resolver depends on; [`StunReflector`]
//! is the network implementation. Message encoding is left to `stun-format`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use natmap_core::stun::{Reflector, StunReflector};
//!
//! # #[tokio::main]
//! # async fn main() -> std::io::Result<()> {
//! let reflector = StunReflector::default();
//! let servers = vec!["stun.l.google.com:19302".to_string()];
//! let external = reflector
//!     .probe("192.168.1.10:0".parse().unwrap(), &servers)
//!     .await?;
//! println!("192.168.1.10 is seen as {external}");
//! # Ok(())
//! # }
//! ```

use crate::socket::bind_udp;
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;
use stun_format::{Attr, Msg, MsgBuilder, MsgType};
use tokio::net::UdpSocket;

pub const DEFAULT_STUN_PORT: u16 = 3478;
pub const DEFAULT_STUN_TIMEOUT: Duration = Duration::from_secs(3);

const STUN_HEADER_LEN: usize = 20;

/// Reports the address a local UDP endpoint is seen from by the reflection servers.
#[async_trait]
pub trait Reflector: Send + Sync {
    /// Bind `local` and ask `servers` which address the request came from.
    ///
    /// A bind refused because the port is taken must be reported as
    /// [`io::ErrorKind::AddrInUse`]; callers move on to another port then.
    async fn probe(&self, local: SocketAddr, servers: &[String]) -> io::Result<IpAddr>;
}

#[derive(Clone, Debug)]
pub struct StunReflector {
    timeout: Duration,
}

impl Default for StunReflector {
    fn default() -> Self {
        Self::new(DEFAULT_STUN_TIMEOUT)
    }
}

impl StunReflector {
    /// `timeout` bounds the wait for each server's response.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
    async fn query(&self, socket: &UdpSocket, server: &str, v4: bool) -> io::Result<SocketAddr> {
        let target = resolve_server(server, v4).await?;
        let request = send_stun_request();
        socket.send_to(&request, target).await?;
        let mut buf = [0u8; 1500];
        let rs = tokio::time::timeout(self.timeout, async {
            loop {
                let (len, from) = socket.recv_from(&mut buf).await?;
                if from != target {
                    log::debug!("ignore datagram from {from}, waiting for {target}");
                    continue;
                }
                return recv_stun_response(&buf[..len]).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("malformed stun response from {target}"),
                    )
                });
            }
        })
        .await;
        match rs {
            Ok(rs) => rs,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("stun server {target} did not answer"),
            )),
        }
    }
}

#[async_trait]
impl Reflector for StunReflector {
    async fn probe(&self, local: SocketAddr, servers: &[String]) -> io::Result<IpAddr> {
        let socket = bind_udp(local)?;
        let mut last_err = io::Error::new(io::ErrorKind::InvalidInput, "no stun server");
        for server in servers {
            match self.query(&socket, server, local.is_ipv4()).await {
                Ok(addr) => return Ok(addr.ip()),
                Err(e) => {
                    log::debug!("stun query {server} from {local}: {e:?}");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

/// Resolve `host[:port]`, accepting an optional `stun:` scheme, and keep the
/// first address of the wanted family.
pub async fn resolve_server(server: &str, v4: bool) -> io::Result<SocketAddr> {
    let server = server.strip_prefix("stun:").unwrap_or(server);
    let addrs: Vec<SocketAddr> = if let Ok(addr) = server.parse::<SocketAddr>() {
        vec![addr]
    } else if let Ok(ip) = server.parse::<IpAddr>() {
        vec![SocketAddr::new(ip, DEFAULT_STUN_PORT)]
    } else if server.contains(':') {
        tokio::net::lookup_host(server).await?.collect()
    } else {
        tokio::net::lookup_host((server, DEFAULT_STUN_PORT))
            .await?
            .collect()
    };
    addrs
        .into_iter()
        .find(|addr| addr.is_ipv4() == v4)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!(
                    "stun server {server} has no {} address",
                    if v4 { "IPv4" } else { "IPv6" }
                ),
            )
        })
}

/// A binding request with a random transaction id.
pub fn send_stun_request() -> Vec<u8> {
    let mut buf = [0u8; STUN_HEADER_LEN];
    {
        let mut msg = MsgBuilder::from(buf.as_mut_slice());
        msg.typ(MsgType::BindingRequest).unwrap();
        msg.tid(rand::random::<u128>() & 0xFFFF_FFFF_FFFF_FFFF_FFFF_FFFF)
            .unwrap();
    }
    buf.to_vec()
}

/// The mapped address carried by a binding response, if `buf` is one.
pub fn recv_stun_response(buf: &[u8]) -> Option<SocketAddr> {
    if buf.len() < STUN_HEADER_LEN {
        return None;
    }
    let msg = Msg::from(buf);
    if let Some(MsgType::BindingResponse) = msg.typ() {
        for attr in msg.attrs_iter() {
            match attr {
                Attr::XorMappedAddress(addr) | Attr::MappedAddress(addr) => {
                    return Some(convert(addr));
                }
                _ => {}
            }
        }
    }
    None
}

fn convert(addr: stun_format::SocketAddr) -> SocketAddr {
    match addr {
        stun_format::SocketAddr::V4(ip, port) => SocketAddrV4::new(Ipv4Addr::from(ip), port).into(),
        stun_format::SocketAddr::V6(ip, port) => {
            SocketAddrV6::new(Ipv6Addr::from(ip), port, 0, 0).into()
        }
    }
}
