//! Address resolution: `host:port` text to candidate socket addresses.
//!
//! Accepted forms:
//!
//! ```text
//! 127.0.0.1:9000     IPv4 literal
//! [::1]:9000         IPv6 literal (brackets required)
//! *:9000             wildcard
//! 9000               wildcard, port only
//! example.com:9000   host name, resolved by the OS
//! ```
//!
//! Port `0` is accepted and leaves the choice of port to the OS at bind time.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

/// A resolution failure. The text mirrors the diagnostics of a `listen`
/// directive so operators recognize them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The address has no port.
    #[error("no port")]
    NoPort,

    /// The port is not a number in `0..=65535`.
    #[error("invalid port")]
    InvalidPort,

    /// The host part is malformed.
    #[error("invalid host")]
    InvalidHost,

    /// The OS could not resolve the host name.
    #[error("host not found")]
    HostNotFound,

    /// The address form is recognized but not served.
    #[error("{0} are not supported")]
    Unsupported(&'static str),
}

/// One candidate produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddr {
    pub addr: SocketAddr,
    /// Display text for diagnostics.
    pub name: String,
}

impl From<SocketAddr> for ResolvedAddr {
    fn from(addr: SocketAddr) -> Self {
        Self {
            addr,
            name: addr.to_string(),
        }
    }
}

/// Result of resolving one address string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Candidates in resolver order. May contain duplicates.
    pub addrs: Vec<ResolvedAddr>,
    /// The text named the unspecified address.
    pub wildcard: bool,
}

/// Turns address text into candidate socket addresses.
pub trait AddressResolver {
    fn resolve(&self, text: &str) -> Result<Resolution, ResolveError>;
}

/// Resolver backed by literal parsing and the OS name service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl AddressResolver for SystemResolver {
    fn resolve(&self, text: &str) -> Result<Resolution, ResolveError> {
        let text = text.trim();
        if text.starts_with("unix:") {
            return Err(ResolveError::Unsupported("unix domain sockets"));
        }

        let (host, port) = split_host_port(text)?;

        if host.is_empty() || host == "*" {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            return Ok(Resolution {
                addrs: vec![addr.into()],
                wildcard: true,
            });
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            let addr = SocketAddr::new(ip, port);
            return Ok(Resolution {
                addrs: vec![addr.into()],
                wildcard: ip.is_unspecified(),
            });
        }

        if !is_valid_hostname(host) {
            return Err(ResolveError::InvalidHost);
        }

        let addrs: Vec<ResolvedAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| ResolveError::HostNotFound)?
            .map(ResolvedAddr::from)
            .collect();
        if addrs.is_empty() {
            return Err(ResolveError::HostNotFound);
        }

        tracing::debug!(host, port, candidates = addrs.len(), "host resolved");
        Ok(Resolution {
            addrs,
            wildcard: false,
        })
    }
}

/// Splits `text` into host and port. A bare number is a port on the
/// wildcard host.
fn split_host_port(text: &str) -> Result<(&str, u16), ResolveError> {
    if let Some(rest) = text.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or(ResolveError::InvalidHost)?;
        if host.parse::<Ipv6Addr>().is_err() {
            return Err(ResolveError::InvalidHost);
        }
        let port = after.strip_prefix(':').ok_or(ResolveError::NoPort)?;
        return Ok((host, parse_port(port)?));
    }

    match text.matches(':').count() {
        0 if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            Ok(("", parse_port(text)?))
        }
        0 => Err(ResolveError::NoPort),
        1 => {
            let (host, port) = text.split_once(':').ok_or(ResolveError::NoPort)?;
            Ok((host, parse_port(port)?))
        }
        // Unbracketed IPv6 literal: the port cannot be told apart.
        _ if text.parse::<Ipv6Addr>().is_ok() => Err(ResolveError::NoPort),
        _ => Err(ResolveError::InvalidHost),
    }
}

fn parse_port(text: &str) -> Result<u16, ResolveError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ResolveError::InvalidPort);
    }
    text.parse().map_err(|_| ResolveError::InvalidPort)
}

fn is_valid_hostname(host: &str) -> bool {
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
}
