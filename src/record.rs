//! Resource record types and their wire encode/decode.
//!
//! Only the record types the responder ever serves are given a first class
//! variant: PTR, SRV, TXT, A, AAAA and NSEC. Everything else decodes to
//! [`RecordData::Unknown`], preserving only its rdata length, per RFC 6762's
//! forward-compatibility requirement -- the encoder never produces one.

use crate::io::{DNSReadExt, MessageReader};
use crate::types::{Class, Type};
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A single resource record, as carried in the answer/authority/additional
/// sections of a [`crate::message::Message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub class: Class,

    /// High bit of the wire class field: replace any cached record of the
    /// same name/type/class with this one (RFC 6762 §10.2 cache-flush bit).
    pub cache_flush: bool,

    /// TTL in milliseconds. The wire format carries whole seconds; callers
    /// should round down when encoding (sub-second precision only exists so
    /// `ttl_override` can be expressed exactly in tests).
    pub ttl_ms: u64,

    pub data: RecordData,
}

impl Record {
    pub fn r#type(&self) -> Type {
        self.data.r#type()
    }

    pub fn ttl_secs(&self) -> u32 {
        (self.ttl_ms / 1000) as u32
    }

    /// Decodes one resource record starting right after its name and type
    /// code, both already consumed by the caller ([`crate::message`] reads
    /// the name first so it can fall back on name-only handling for types
    /// it has no business inspecting, e.g. OPT, which this crate ignores).
    pub(crate) fn parse(
        r: &mut MessageReader,
        name: String,
        type_code: u16,
        max_labels: usize,
    ) -> std::io::Result<Record> {
        let class_code = r.read_class_code()?;
        let cache_flush = class_code & 0x8000 != 0;
        let class = match Class::from_u16_masked(class_code) {
            Some(c) => c,
            None => bail!(InvalidData, "unrecognised Class({})", class_code & 0x7FFF),
        };

        let ttl_secs = r.read_u32::<BE>()?;
        let rdlength = r.read_u16::<BE>()?;

        r.push_limit(rdlength as i64)?;
        let data = match Type::from_u16(type_code) {
            Some(r#type) => RecordData::parse(r, r#type, rdlength as usize, max_labels)?,
            None => {
                // Opaque type: skip the rdata without attempting to
                // interpret it, keeping only its length.
                std::io::copy(
                    &mut std::io::Read::take(&mut *r, rdlength as u64),
                    &mut std::io::sink(),
                )?;
                RecordData::Unknown {
                    r#type: type_code,
                    len: rdlength as usize,
                }
            }
        };
        let remaining = r.remaining_in_current_limit()?;
        r.pop_limit();

        if remaining != 0 {
            bail!(
                InvalidData,
                "record (type {}) left {} unread rdata bytes",
                type_code,
                remaining
            );
        }

        Ok(Record {
            name,
            class,
            cache_flush,
            ttl_ms: ttl_secs as u64 * 1000,
            data,
        })
    }

    /// Encodes this record's fixed header (name is written by the caller,
    /// which tracks the name-compression dictionary) followed by rdata.
    pub(crate) fn write_rdata(&self, buf: &mut Vec<u8>, names: &mut crate::message::NameDict) {
        self.data.write(buf, names);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{name} {ttl} {class} {type} {data}",
            name = self.name,
            ttl = self.ttl_secs(),
            class = self.class,
            r#type = self.r#type(),
            data = self.data
        )
    }
}

/// Type-specific resource record payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    PTR(String),
    TXT(Vec<Vec<u8>>),
    SRV(Srv),
    NSEC(Nsec),

    /// Any other record type: only the rdata length is retained.
    Unknown { r#type: u16, len: usize },
}

impl RecordData {
    pub fn r#type(&self) -> Type {
        match self {
            RecordData::A(_) => Type::A,
            RecordData::AAAA(_) => Type::AAAA,
            RecordData::PTR(_) => Type::PTR,
            RecordData::TXT(_) => Type::TXT,
            RecordData::SRV(_) => Type::SRV,
            RecordData::NSEC(_) => Type::NSEC,
            RecordData::Unknown { r#type, .. } => {
                // Not one of ours; fabricate nothing meaningful here, callers
                // that need the raw code should match Unknown directly.
                Type::from_u16(*r#type).unwrap_or(Type::ANY)
            }
        }
    }

    fn parse(
        r: &mut MessageReader,
        r#type: Type,
        rdlength: usize,
        max_labels: usize,
    ) -> std::io::Result<RecordData> {
        Ok(match r#type {
            Type::A => {
                if rdlength != 4 {
                    bail!(InvalidData, "A record rdata must be 4 bytes, got {}", rdlength);
                }
                let mut octets = [0u8; 4];
                r.read_exact(&mut octets)?;
                RecordData::A(Ipv4Addr::from(octets))
            }

            Type::AAAA => {
                if rdlength != 16 {
                    bail!(
                        InvalidData,
                        "AAAA record rdata must be 16 bytes, got {}",
                        rdlength
                    );
                }
                let mut octets = [0u8; 16];
                r.read_exact(&mut octets)?;
                RecordData::AAAA(Ipv6Addr::from(octets))
            }

            Type::PTR => RecordData::PTR(r.read_qname(max_labels)?),

            Type::TXT => RecordData::TXT(parse_txt(r, rdlength)?),

            Type::SRV => RecordData::SRV(Srv::parse(r, max_labels)?),

            Type::NSEC => RecordData::NSEC(Nsec::parse(r, rdlength, max_labels)?),

            Type::ANY => bail!(InvalidData, "ANY is not a valid record type"),
        })
    }

    fn write(&self, buf: &mut Vec<u8>, names: &mut crate::message::NameDict) {
        // Reserve the rdlength slot, write the payload, then patch it.
        let rdlength_at = buf.len();
        buf.extend_from_slice(&[0u8; 2]);
        let start = buf.len();

        match self {
            RecordData::A(ip) => buf.extend_from_slice(&ip.octets()),
            RecordData::AAAA(ip) => buf.extend_from_slice(&ip.octets()),
            RecordData::PTR(name) => crate::message::write_qname(buf, name, names),
            RecordData::TXT(entries) => write_txt(buf, entries),
            RecordData::SRV(srv) => srv.write(buf, names),
            RecordData::NSEC(nsec) => nsec.write(buf, names),
            RecordData::Unknown { .. } => {
                // The encoder never produces these; nothing to write.
            }
        }

        let rdlength = (buf.len() - start) as u16;
        buf[rdlength_at..rdlength_at + 2].copy_from_slice(&rdlength.to_be_bytes());
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::A(ip) => ip.fmt(f),
            RecordData::AAAA(ip) => ip.fmt(f),
            RecordData::PTR(name) => name.fmt(f),
            RecordData::TXT(entries) => {
                let strs: Vec<String> = entries
                    .iter()
                    .map(|e| String::from_utf8_lossy(e).into_owned())
                    .collect();
                write!(f, "\"{}\"", strs.join("\" \""))
            }
            RecordData::SRV(srv) => srv.fmt(f),
            RecordData::NSEC(nsec) => nsec.fmt(f),
            RecordData::Unknown { r#type, len } => write!(f, "TYPE{}\\#{}", r#type, len),
        }
    }
}

fn parse_txt(r: &mut MessageReader, rdlength: usize) -> std::io::Result<Vec<Vec<u8>>> {
    let mut entries = Vec::new();
    let mut read = 0usize;

    while read < rdlength {
        let len = r.read_u8()? as usize;
        read += 1;

        let mut s = vec![0u8; len];
        r.read_exact(&mut s)?;
        read += len;

        entries.push(s);
    }

    if read != rdlength {
        bail!(InvalidData, "TXT record rdata overran its declared length");
    }

    // An empty TXT record is still one zero-length string (RFC 6763 §6.1).
    if entries.is_empty() {
        entries.push(Vec::new());
    }

    Ok(entries)
}

fn write_txt(buf: &mut Vec<u8>, entries: &[Vec<u8>]) {
    if entries.is_empty() {
        buf.push(0);
        return;
    }

    for entry in entries {
        // Individual TXT strings can't exceed 255 bytes; callers are
        // expected to have validated this when building the registration.
        buf.push(entry.len() as u8);
        buf.extend_from_slice(entry);
    }
}

/// RFC 2782 SRV rdata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

impl Srv {
    fn parse(r: &mut MessageReader, max_labels: usize) -> std::io::Result<Srv> {
        let priority = r.read_u16::<BE>()?;
        let weight = r.read_u16::<BE>()?;
        let port = r.read_u16::<BE>()?;
        let target = r.read_qname(max_labels)?;

        Ok(Srv {
            priority,
            weight,
            port,
            target,
        })
    }

    fn write(&self, buf: &mut Vec<u8>, names: &mut crate::message::NameDict) {
        buf.write_u16::<BE>(self.priority).unwrap();
        buf.write_u16::<BE>(self.weight).unwrap();
        buf.write_u16::<BE>(self.port).unwrap();
        // SRV targets are not compressed by this encoder: every SRV target
        // this crate emits is the (unique) hostname, so there's nothing
        // upstream of it to usefully point at.
        let _ = names;
        crate::message::write_qname_uncompressed(buf, &self.target);
    }
}

impl fmt::Display for Srv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.priority, self.weight, self.port, self.target
        )
    }
}

/// RFC 4034 §4.1 NSEC rdata, restricted to the "next domain name" plus a
/// type bitmap -- mDNS (RFC 6762 §6.1) reuses this only to assert which
/// types a name *does* serve, never for a real DNSSEC chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec {
    pub next_domain: String,
    pub types: Vec<Type>,
}

impl Nsec {
    fn parse(r: &mut MessageReader, rdlength: usize, max_labels: usize) -> std::io::Result<Nsec> {
        let before = r.remaining_in_current_limit()?;
        let next_domain = r.read_qname(max_labels)?;
        let name_len = before - r.remaining_in_current_limit()?;
        let bitmap_len = (rdlength as u64).saturating_sub(name_len) as usize;

        let mut remaining = bitmap_len;
        let mut types = Vec::new();

        while remaining > 0 {
            if remaining < 2 {
                bail!(InvalidData, "truncated NSEC type bitmap window");
            }
            let window = r.read_u8()? as u16;
            let bitmap_bytes = r.read_u8()? as usize;
            remaining -= 2;

            if bitmap_bytes == 0 || bitmap_bytes > 32 || bitmap_bytes > remaining {
                bail!(InvalidData, "invalid NSEC bitmap window length");
            }

            let mut bitmap = vec![0u8; bitmap_bytes];
            r.read_exact(&mut bitmap)?;
            remaining -= bitmap_bytes;

            for (byte_idx, byte) in bitmap.iter().enumerate() {
                for bit in 0..8 {
                    if byte & (0x80 >> bit) != 0 {
                        let code = window * 256 + (byte_idx as u16 * 8 + bit as u16);
                        if let Some(t) = Type::from_u16(code) {
                            types.push(t);
                        }
                    }
                }
            }
        }

        Ok(Nsec { next_domain, types })
    }

    fn write(&self, buf: &mut Vec<u8>, _names: &mut crate::message::NameDict) {
        // NSEC names are never compressed (RFC 4034 mandates canonical,
        // uncompressed rdata for DNSSEC; mDNS's reuse follows suit).
        crate::message::write_qname_uncompressed(buf, &self.next_domain);

        // Group types by window (high byte of the type code).
        let mut by_window: std::collections::BTreeMap<u8, Vec<u16>> = Default::default();
        for t in &self.types {
            let code = *t as u16;
            by_window
                .entry((code / 256) as u8)
                .or_default()
                .push(code % 256);
        }

        for (window, mut bits) in by_window {
            bits.sort_unstable();
            let max_bit = *bits.last().unwrap();
            let bitmap_len = (max_bit / 8 + 1) as usize;
            let mut bitmap = vec![0u8; bitmap_len];
            for bit in bits {
                let byte_idx = (bit / 8) as usize;
                bitmap[byte_idx] |= 0x80 >> (bit % 8);
            }

            buf.push(window);
            buf.push(bitmap.len() as u8);
            buf.extend_from_slice(&bitmap);
        }
    }
}

impl fmt::Display for Nsec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [", self.next_domain)?;
        for (i, t) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", t)?;
        }
        write!(f, "]")
    }
}

impl Class {
    /// Masks off the cache-flush / unicast-response-requested high bit
    /// before looking up the [`Class`].
    pub fn from_u16_masked(code: u16) -> Option<Class> {
        use num_traits::FromPrimitive;
        FromPrimitive::from_u16(code & 0x7FFF)
    }
}

use crate::bail;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::NameDict;

    fn roundtrip(data: RecordData) -> RecordData {
        let mut buf = Vec::new();
        let mut names = NameDict::new();
        data.write(&mut buf, &mut names);
        let len = buf.len() - 2; // we wrote a placeholder rdlength too
        let mut r = MessageReader::new(&buf[2..]);
        RecordData::parse(&mut r, data.r#type(), len, crate::io::MAX_LABELS).unwrap()
    }

    #[test]
    fn a_record_roundtrips() {
        let data = RecordData::A(Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(roundtrip(data.clone()), data);
    }

    #[test]
    fn aaaa_record_roundtrips() {
        let data = RecordData::AAAA(Ipv6Addr::LOCALHOST);
        assert_eq!(roundtrip(data.clone()), data);
    }

    #[test]
    fn empty_txt_encodes_as_single_zero_length_string() {
        let data = RecordData::TXT(vec![]);
        let mut buf = Vec::new();
        let mut names = NameDict::new();
        data.write(&mut buf, &mut names);
        // 2 bytes rdlength + 1 byte (the zero-length string).
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[2], 0);
    }

    #[test]
    fn txt_roundtrips() {
        let data = RecordData::TXT(vec![b"a=1".to_vec(), b"b=2".to_vec()]);
        assert_eq!(roundtrip(data.clone()), data);
    }

    #[test]
    fn srv_roundtrips() {
        let data = RecordData::SRV(Srv {
            priority: 0,
            weight: 0,
            port: 8080,
            target: "host.local.".to_string(),
        });
        assert_eq!(roundtrip(data.clone()), data);
    }

    #[test]
    fn nsec_roundtrips() {
        let data = RecordData::NSEC(Nsec {
            next_domain: "inst._test._tcp.local.".to_string(),
            types: vec![Type::TXT, Type::SRV],
        });
        assert_eq!(roundtrip(data.clone()), data);
    }
}
