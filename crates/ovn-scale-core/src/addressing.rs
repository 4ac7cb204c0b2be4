//! Deterministic IPv4 address arithmetic.

use crate::error::{Result, ScaleError};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Number of addresses in `cidr`, network and broadcast included.
pub fn cidr_size(cidr: &Ipv4Net) -> u64 {
    1u64 << (32 - u32::from(cidr.prefix_len()))
}

/// The `n`-th subnet after `start` with the same prefix length; `n = 0` is
/// `start`'s own network.
pub fn nth_subnet(start: &Ipv4Net, n: u32) -> Result<Ipv4Net> {
    let base = u64::from(u32::from(start.network()));
    let addr = base + u64::from(n) * cidr_size(start);
    let addr = u32::try_from(addr).map_err(|_| {
        ScaleError::config(format!("subnet {n} after {start} is outside IPv4 space"))
    })?;
    Ipv4Net::new(Ipv4Addr::from(addr), start.prefix_len())
        .map_err(|e| ScaleError::config(e.to_string()))
}

/// The last address of `cidr` minus `offset`.
///
/// Offset 1 on a `/24` is `.254`; offset 2 is `.253`.
pub fn gateway_ip(cidr: &Ipv4Net, offset: u32) -> Result<Ipv4Addr> {
    if u64::from(offset) >= cidr_size(cidr) {
        return Err(ScaleError::config(format!(
            "gateway offset {offset} does not fit in {cidr}"
        )));
    }
    Ok(Ipv4Addr::from(u32::from(cidr.broadcast()) - offset))
}

/// `count` consecutive host addresses starting `ip_shift` hosts into `cidr`.
///
/// Fails unless `ip_shift + count` stays below the broadcast address.
pub fn allocate_hosts(cidr: &Ipv4Net, ip_shift: u32, count: u32) -> Result<Vec<Ipv4Addr>> {
    let last_usable = cidr_size(cidr).saturating_sub(1);
    if u64::from(ip_shift) + u64::from(count) > last_usable {
        return Err(ScaleError::config(format!(
            "network {cidr} is not big enough for {count} ports starting at offset {ip_shift}"
        )));
    }
    let first = u32::from(cidr.network()) + ip_shift;
    Ok((0..count).map(|i| Ipv4Addr::from(first + i)).collect())
}
