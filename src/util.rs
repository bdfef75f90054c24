use std::net::{Ipv4Addr, Ipv6Addr};

/// Dumps a packet capture out in a pretty hex+ascii way, for manual
/// debugging (the CLI demo, or a `debug!` call at a packet-drop site).
pub fn hexdump(slice: &[u8]) -> String {
    const WIDTH: usize = 16;
    let mut out = String::new();

    for (row_idx, row) in slice.chunks(WIDTH).enumerate() {
        let row_hex: String = row.iter().map(|x| format!("{0:02X} ", x)).collect();

        // Only the printable ASCII range gets shown as itself.
        let row_str: String = row
            .iter()
            .map(|x| if (0x20..=0x7e).contains(x) { *x as char } else { '.' })
            .collect();

        out.push_str(&format!(
            "{0:>08x}: {1:<48} {2:}\n",
            row_idx * WIDTH,
            row_hex,
            row_str
        ));
    }

    out
}

/// Builds the reverse-mapping PTR owner name for an IPv4 address, e.g.
/// `1.2.3.4` -> `4.3.2.1.in-addr.arpa.`.
pub fn reverse_name_v4(addr: Ipv4Addr) -> String {
    let o = addr.octets();
    format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
}

/// Builds the reverse-mapping PTR owner name for an IPv6 address under
/// `ip6.arpa`, nibble-reversed (RFC 3596 §2.5).
pub fn reverse_name_v6(addr: Ipv6Addr) -> String {
    let mut nibbles = String::with_capacity(64);
    for byte in addr.octets().iter().rev() {
        nibbles.push_str(&format!("{:x}.{:x}.", byte & 0xF, byte >> 4));
    }
    format!("{}ip6.arpa.", nibbles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_v4() {
        assert_eq!(
            reverse_name_v4(Ipv4Addr::new(192, 168, 1, 42)),
            "42.1.168.192.in-addr.arpa."
        );
    }

    #[test]
    fn reverse_v6() {
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let name = reverse_name_v6(addr);
        assert!(name.ends_with("ip6.arpa."));
        assert_eq!(name.matches('.').count(), 33); // 32 nibbles + "ip6.arpa"
    }

    #[test]
    fn hexdump_marks_non_printable_bytes_with_a_dot() {
        let dump = hexdump(&[0x41, 0x00, 0x42]);
        assert!(dump.contains("41 00 42"));
        assert!(dump.contains("A.B"));
    }
}
