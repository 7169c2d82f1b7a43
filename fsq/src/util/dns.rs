//! DNS helpers
// (c) 2025 fsq contributors

use std::net::IpAddr;

use crate::error::{Error, Result};

/// Resolves the daemon's host name.
///
/// IP address literals are used as-is. Otherwise IPv4 results are preferred,
/// as the daemon traditionally listens on IPv4 only; failing that the first
/// result of any family is returned.
pub(crate) fn lookup_host(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let candidates = dns_lookup::lookup_host(host).map_err(|source| Error::Resolve {
        host: host.to_owned(),
        source,
    })?;
    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| Error::Resolve {
            host: host.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"),
        })
}
