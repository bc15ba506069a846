//! Route spec syntax check.

use std::net::IpAddr;

use crate::topology::model::RouteSpec;
use crate::topology::TopologyError;

/// Check that every key is a CIDR and every value a non-empty list of IPs.
pub fn validate_route_spec(route_spec: &RouteSpec) -> Result<(), TopologyError> {
    for (cidr, hosts) in route_spec {
        parse_cidr(cidr)
            .map_err(|reason| TopologyError::InvalidRouteSpec(format!("'{}': {}", cidr, reason)))?;

        if hosts.is_empty() {
            return Err(TopologyError::InvalidRouteSpec(format!(
                "no hosts for '{}'",
                cidr
            )));
        }
        for host in hosts {
            host.parse::<IpAddr>().map_err(|_| {
                TopologyError::InvalidRouteSpec(format!(
                    "invalid host address '{}' for '{}'",
                    host, cidr
                ))
            })?;
        }
    }
    Ok(())
}

/// Parse `<address>/<prefix>`.
pub fn parse_cidr(cidr: &str) -> Result<(IpAddr, u8), &'static str> {
    let (addr, prefix) = cidr.split_once('/').ok_or("missing prefix length")?;
    let addr: IpAddr = addr.parse().map_err(|_| "invalid network address")?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err("invalid prefix length");
    }
    let prefix: u8 = prefix.parse().map_err(|_| "invalid prefix length")?;

    let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max_prefix {
        return Err("prefix length out of range");
    }
    Ok((addr, prefix))
}
