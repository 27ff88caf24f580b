use std::net::IpAddr;

/// Masks the host part of an IPv4 address: `192.0.2.123` becomes `192.0.2.x`.
///
/// IPv4-mapped IPv6 addresses are masked in their dotted form. Other IPv6
/// addresses, hostnames and empty strings are returned unchanged.
pub fn obfuscate_ip(ip: &str) -> String {
    let v4 = match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4,
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4,
            None => return ip.to_string(),
        },
        Err(_) => return ip.to_string(),
    };
    let [a, b, c, _] = v4.octets();
    format!("{}.{}.{}.x", a, b, c)
}
