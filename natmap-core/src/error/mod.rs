use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid CIDR {cidr:?}: {source}")]
    InvalidCidr {
        cidr: String,
        source: ipnet::AddrParseError,
    },
    #[error("invalid port range: start is {start} but end is {end}")]
    InvalidPortRange { start: u16, end: u16 },
}

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
