use crate::filter::InterfaceFilter;
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::io;
use std::net::IpAddr;

/// Enumerate the IPv4 addresses of the local interfaces.
///
/// Loopback addresses are appended only when `include_loopback` is set, unless
/// they are all there is, in which case they are returned on their own.
pub fn local_ip_addresses(
    include_loopback: bool,
    interface_filter: Option<&InterfaceFilter>,
) -> io::Result<Vec<IpAddr>> {
    select_local_addresses(interface_addresses()?, include_loopback, interface_filter)
}

/// Every `(interface name, address)` pair of the host, unfiltered.
pub fn interface_addresses() -> io::Result<Vec<(String, IpAddr)>> {
    let network_interfaces = NetworkInterface::show().map_err(io::Error::other)?;
    let pairs = network_interfaces
        .into_iter()
        .flat_map(|iface| {
            let name = iface.name;
            iface
                .addr
                .into_iter()
                .map(move |addr| (name.clone(), addr.ip()))
        })
        .collect();
    Ok(pairs)
}

/// The selection half of [`local_ip_addresses`] over already enumerated pairs.
pub fn select_local_addresses<I>(
    pairs: I,
    include_loopback: bool,
    interface_filter: Option<&InterfaceFilter>,
) -> io::Result<Vec<IpAddr>>
where
    I: IntoIterator<Item = (String, IpAddr)>,
{
    let mut addresses = Vec::new();
    let mut loopbacks = Vec::new();
    for (name, ip) in pairs {
        if let Some(filter) = interface_filter {
            if !filter.allow(&name) {
                continue;
            }
        }
        let ip = match ip {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
                Some(ip) => ip,
                None => continue,
            },
        };
        if ip.is_unspecified() {
            continue;
        }
        let ip = IpAddr::V4(ip);
        if ip.is_loopback() {
            if !loopbacks.contains(&ip) {
                loopbacks.push(ip);
            }
        } else if !addresses.contains(&ip) {
            addresses.push(ip);
        }
    }
    if include_loopback {
        addresses.append(&mut loopbacks);
    }
    if !addresses.is_empty() {
        return Ok(addresses);
    }
    if !loopbacks.is_empty() {
        return Ok(loopbacks);
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "could not find local IP address",
    ))
}
