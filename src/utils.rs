//! Utility functions for DNS names and HTTP hosts.
//!
//! This module provides helper functions for parsing and encoding DNS names in
//! wire format, plus the host/port splitting used by the HTTP handlers.

/// Maximum number of compression pointers followed while decoding one name.
const MAX_POINTER_HOPS: usize = 32;

/// Encode a domain name in DNS wire format.
///
/// A trailing dot is accepted and ignored; the root name encodes to a single
/// zero byte.
///
/// # Arguments
/// * `name` - The domain name to encode.
///
/// # Returns
/// The encoded name, or `None` if a label is empty or longer than 63 bytes.
pub fn encode_dns_name(name: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(name.len() + 2);
    let trimmed = name.trim_end_matches('.');
    if !trimmed.is_empty() {
        for part in trimmed.split('.') {
            if part.is_empty() || part.len() > 63 {
                return None;
            }
            out.push(part.len() as u8);
            out.extend_from_slice(part.as_bytes());
        }
    }
    out.push(0);
    if out.len() > 255 {
        return None;
    }
    Some(out)
}

/// Make a name fully qualified by appending the root dot when missing.
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Read a big-endian u16 at `pos`.
pub fn read_u16(packet: &[u8], pos: usize) -> Option<u16> {
    let bytes = packet.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Read a big-endian u32 at `pos`.
pub fn read_u32(packet: &[u8], pos: usize) -> Option<u32> {
    let bytes = packet.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Skip over an encoded name starting at `pos`.
///
/// # Returns
/// The position of the first byte after the name, or `None` if the name runs
/// past the end of the packet.
pub fn skip_name(packet: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *packet.get(pos)?;
        if len & 0xC0 == 0xC0 {
            // A compression pointer always ends the name
            packet.get(pos + 1)?;
            return Some(pos + 2);
        }
        if len == 0 {
            return Some(pos + 1);
        }
        pos += len as usize + 1;
    }
}

/// Decode a possibly compressed name starting at `pos`.
///
/// # Arguments
/// * `packet` - The full DNS message; pointers are offsets into it.
/// * `pos` - Offset of the first length byte of the name.
///
/// # Returns
/// The fully qualified, dot-terminated name (`"."` for the root), or `None`
/// on truncation, pointer loops or reserved label types.
pub fn read_name(packet: &[u8], mut pos: usize) -> Option<String> {
    let mut name = String::new();
    let mut hops = 0;

    loop {
        let len = *packet.get(pos)?;
        match len & 0xC0 {
            0xC0 => {
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return None;
                }
                let low = *packet.get(pos + 1)?;
                pos = (((len & 0x3F) as usize) << 8) | low as usize;
            }
            0x00 => {
                if len == 0 {
                    break;
                }
                let start = pos + 1;
                let label = packet.get(start..start + len as usize)?;
                name.push_str(&String::from_utf8_lossy(label));
                name.push('.');
                pos = start + len as usize;
            }
            _ => return None,
        }
    }

    if name.is_empty() {
        name.push('.');
    }
    Some(name)
}

/// Split an HTTP host value into its host part, dropping any port.
///
/// Bracketed IPv6 literals lose their brackets. A value that does not parse as
/// `host:port` is returned unchanged.
pub fn split_host_port(value: &str) -> &str {
    if let Some(rest) = value.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => value,
        };
    }
    match value.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 address
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_names_with_and_without_trailing_dot() {
        let expected = vec![3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0];
        assert_eq!(encode_dns_name("www.example.com").unwrap(), expected);
        assert_eq!(encode_dns_name("www.example.com.").unwrap(), expected);
        assert_eq!(encode_dns_name(".").unwrap(), vec![0]);
    }

    #[test]
    fn rejects_oversized_and_empty_labels() {
        let long = "a".repeat(64);
        assert!(encode_dns_name(&format!("{long}.com")).is_none());
        assert!(encode_dns_name("a..com").is_none());
    }

    #[test]
    fn follows_compression_pointers() {
        // header, then "r.example" at offset 12, then "shop" + pointer to 12
        let mut packet = vec![0u8; 12];
        packet.extend_from_slice(&[1, b'r', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0]);
        let shop = packet.len();
        packet.extend_from_slice(&[4, b's', b'h', b'o', b'p', 0xC0, 12]);

        assert_eq!(read_name(&packet, 12).as_deref(), Some("r.example."));
        assert_eq!(read_name(&packet, shop).as_deref(), Some("shop.r.example."));
        assert_eq!(skip_name(&packet, shop), Some(packet.len()));
    }

    #[test]
    fn refuses_pointer_loops() {
        let mut packet = vec![0u8; 12];
        packet.extend_from_slice(&[0xC0, 12]);
        assert_eq!(read_name(&packet, 12), None);
    }

    #[test]
    fn splits_ports_from_hosts() {
        assert_eq!(split_host_port("example.com:8080"), "example.com");
        assert_eq!(split_host_port("example.com"), "example.com");
        assert_eq!(split_host_port("[::1]:443"), "::1");
        assert_eq!(split_host_port("[::1]"), "::1");
        assert_eq!(split_host_port("::1"), "::1");
        assert_eq!(split_host_port("example.com:"), "example.com:");
    }

    #[test]
    fn fqdn_appends_root_once() {
        assert_eq!(fqdn("a.example.com"), "a.example.com.");
        assert_eq!(fqdn("a.example.com."), "a.example.com.");
    }
}
