//! The `Message`: a decoded DNS packet (RFC 1035 §4), plus its encoder.
//!
//! mDNS reuses almost all of classic DNS's wire format but ignores several
//! fields the original protocol cares about (recursion, authoritative
//! answer, opcode, rcode): queries and responses are distinguished solely by
//! the QR bit, and every other header flag is carried through unexamined so
//! this crate never rejects a packet a real implementation would accept.

use crate::bail;
use crate::io::{DNSReadExt, MessageReader, SeekExt};
use crate::record::Record;
use crate::types::{Class, Type, QR};
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use rand::Rng;
use std::collections::HashMap;
use std::io;

/// A question, as carried in the question section of a [`Message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub r#type: Type,
    pub class: Class,

    /// QU bit: the sender would accept a unicast reply. Only meaningful on
    /// questions, where it overloads the class field's high bit (RFC 6762
    /// §5.4); on answers the same bit means cache-flush (see
    /// [`crate::record::Record::cache_flush`]).
    pub unicast_response: bool,
}

/// A decoded (or about-to-be-encoded) DNS message.
///
/// Multicast DNS packets never set most of the RFC 1035 header flags
/// meaningfully, so this struct keeps only the ones the responder and
/// discovery engine actually inspect; everything else round-trips as zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: u16,
    pub qr: QR,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,

    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            id: 0,
            qr: QR::Query,
            aa: false,
            tc: false,
            rd: false,
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }
}

/// Default MTU-derived budget for a single outgoing packet (§4.1's default).
/// Chosen to comfortably clear the path MTU of almost any tunnelled or
/// VPN'd link without fragmenting, per RFC 6762 §17's guidance.
pub const DEFAULT_MAX_PACKET_LEN: usize = 1300;

#[derive(Copy, Clone, PartialEq)]
enum Section {
    Answers,
    Authorities,
    Additionals,
}

struct MessageParser<'a> {
    r: MessageReader<'a>,
    m: Message,
    max_labels: usize,
}

impl<'a> MessageParser<'a> {
    fn new(buf: &'a [u8], max_labels: usize) -> MessageParser<'a> {
        MessageParser {
            r: MessageReader::new(buf),
            m: Message::default(),
            max_labels,
        }
    }

    fn parse(mut self) -> io::Result<Message> {
        self.m.id = self.r.read_u16::<BE>()?;

        let b = self.r.read_u8()?;
        self.m.qr = QR::from_bool(0b1000_0000 & b != 0);
        self.m.aa = (0b0000_0100 & b) != 0;
        self.m.tc = (0b0000_0010 & b) != 0;
        self.m.rd = (0b0000_0001 & b) != 0;

        // Second flags byte (RA/Z/AD/CD/RCODE): mDNS never sets it
        // meaningfully. Consume and discard so the byte offsets line up.
        let _ = self.r.read_u8()?;

        let qd_count = self.r.read_u16::<BE>()?;
        let an_count = self.r.read_u16::<BE>()?;
        let ns_count = self.r.read_u16::<BE>()?;
        let ar_count = self.r.read_u16::<BE>()?;

        self.read_questions(qd_count)?;
        self.read_records(an_count, Section::Answers)?;
        self.read_records(ns_count, Section::Authorities)?;
        self.read_records(ar_count, Section::Additionals)?;

        let remaining = self.r.remaining()?;
        if remaining > 0 {
            bail!(
                InvalidData,
                "finished parsing with {} bytes left over",
                remaining
            );
        }

        Ok(self.m)
    }

    fn read_questions(&mut self, count: u16) -> io::Result<()> {
        self.m.questions.reserve_exact(count.into());

        for _ in 0..count {
            let name = self.r.read_qname(self.max_labels)?;
            let r#type = self.r.read_type()?;
            let class_code = self.r.read_class_code()?;
            let unicast_response = class_code & 0x8000 != 0;
            let class = match Class::from_u16_masked(class_code) {
                Some(c) => c,
                None => bail!(InvalidData, "unrecognised Class({})", class_code & 0x7FFF),
            };

            self.m.questions.push(Question {
                name,
                r#type,
                class,
                unicast_response,
            });
        }

        Ok(())
    }

    fn read_records(&mut self, count: u16, section: Section) -> io::Result<()> {
        let records = match section {
            Section::Answers => &mut self.m.answers,
            Section::Authorities => &mut self.m.authorities,
            Section::Additionals => &mut self.m.additionals,
        };
        records.reserve_exact(count.into());

        for _ in 0..count {
            let name = self.r.read_qname(self.max_labels)?;
            let type_code = self.r.read_type_code()?;
            let record = Record::parse(&mut self.r, name, type_code, self.max_labels)?;
            records.push(record);
        }

        Ok(())
    }
}

/// Indicates the encoded message would exceed the caller's length budget.
///
/// The caller is expected to split the message into multiple packets,
/// setting the TC bit on every packet but the last (RFC 1035 §4.1.1).
#[derive(Debug)]
pub struct Overflow;

/// Tracks, during encoding, the byte offset at which each name (or name
/// suffix) was first written, so later occurrences can be replaced with a
/// two-byte back-pointer (RFC 1035 §4.1.4).
///
/// Keyed on the lowercased dotted name for case-insensitive matching, since
/// DNS names compare case-insensitively but this crate doesn't otherwise
/// normalise case on the way in.
pub struct NameDict {
    offsets: HashMap<String, u16>,
}

impl NameDict {
    pub fn new() -> NameDict {
        NameDict {
            offsets: HashMap::new(),
        }
    }
}

impl Default for NameDict {
    fn default() -> Self {
        NameDict::new()
    }
}

/// Writes `name` into `buf`, compressing any suffix that matches a name
/// already written earlier in the same buffer and recording the position of
/// every new suffix for future callers.
///
/// Compression pointers are 14 bits, so names first written at or beyond
/// offset 0x3FFF can never be pointed at; such suffixes are simply not
/// recorded, not an error.
pub fn write_qname(buf: &mut Vec<u8>, name: &str, names: &mut NameDict) {
    let labels: Vec<&str> = split_labels(name);

    for i in 0..labels.len() {
        let suffix = labels[i..].join(".");
        let suffix_key = suffix.to_ascii_lowercase();

        if let Some(&offset) = names.offsets.get(&suffix_key) {
            buf.push(0xC0 | ((offset >> 8) as u8));
            buf.push((offset & 0xFF) as u8);
            return;
        }

        if let Ok(offset) = u16::try_from(buf.len()) {
            if offset <= 0x3FFF {
                names.offsets.insert(suffix_key, offset);
            }
        }

        let label = labels[i];
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }

    buf.push(0);
}

/// Writes `name` into `buf` without ever compressing it against a prior
/// name, and without recording it for later compression either. Used for
/// rdata fields that must be canonical/uncompressed (SRV and NSEC targets).
pub fn write_qname_uncompressed(buf: &mut Vec<u8>, name: &str) {
    for label in split_labels(name) {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

fn split_labels(name: &str) -> Vec<&str> {
    if name.is_empty() || name == "." {
        return Vec::new();
    }
    name.split_terminator('.').collect()
}

impl Message {
    /// Returns a random u16 suitable for the [`Message`] id field.
    pub fn random_id() -> u16 {
        rand::thread_rng().gen()
    }

    /// Decodes the supplied buffer into a [`Message`], enforcing the default
    /// 128-label cap on every decoded name (§6.3's `enable_label_count_limit`,
    /// on by default). Callers that need to honour a caller-supplied
    /// [`crate::config::AdvertiserConfig`] should use
    /// [`Message::from_slice_with_label_limit`] instead.
    pub fn from_slice(buf: &[u8]) -> io::Result<Message> {
        Self::from_slice_with_label_limit(buf, crate::io::MAX_LABELS)
    }

    /// Decodes the supplied buffer, capping every decoded name at
    /// `max_labels` labels. Pass `usize::MAX` to disable the cap entirely
    /// (§6.3's `enable_label_count_limit` turned off); see
    /// [`crate::config::AdvertiserConfig::max_label_count`].
    pub fn from_slice_with_label_limit(buf: &[u8], max_labels: usize) -> io::Result<Message> {
        MessageParser::new(buf, max_labels).parse()
    }

    pub fn add_question(&mut self, name: impl Into<String>, r#type: Type, class: Class) {
        self.questions.push(Question {
            name: name.into(),
            r#type,
            class,
            unicast_response: false,
        });
    }

    /// Encodes this message, failing with [`Overflow`] if the result would
    /// exceed `max_len` bytes. Callers that hit an overflow should split the
    /// record sections across multiple messages and set `tc` on all but the
    /// last (see [`crate::reply_sender`]).
    pub fn to_vec(&self, max_len: usize) -> Result<Vec<u8>, Overflow> {
        let buf = self.encode();
        if buf.len() > max_len {
            return Err(Overflow);
        }
        Ok(buf)
    }

    /// Encodes this message with no length budget. Used by callers (tests,
    /// the CLI demo) that already know the result fits.
    pub fn to_vec_unbounded(&self) -> Vec<u8> {
        self.encode()
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(512);
        let mut names = NameDict::new();

        buf.write_u16::<BE>(self.id).unwrap();

        let mut b = 0u8;
        b |= if self.qr.to_bool() { 0b1000_0000 } else { 0 };
        b |= if self.aa { 0b0000_0100 } else { 0 };
        b |= if self.tc { 0b0000_0010 } else { 0 };
        b |= if self.rd { 0b0000_0001 } else { 0 };
        buf.push(b);
        buf.push(0);

        buf.write_u16::<BE>(self.questions.len() as u16).unwrap();
        buf.write_u16::<BE>(self.answers.len() as u16).unwrap();
        buf.write_u16::<BE>(self.authorities.len() as u16).unwrap();
        buf.write_u16::<BE>(self.additionals.len() as u16).unwrap();

        for q in &self.questions {
            write_qname(&mut buf, &q.name, &mut names);
            buf.write_u16::<BE>(q.r#type as u16).unwrap();
            let class_code = q.class as u16 | if q.unicast_response { 0x8000 } else { 0 };
            buf.write_u16::<BE>(class_code).unwrap();
        }

        for section in [&self.answers, &self.authorities, &self.additionals] {
            for record in section {
                write_qname(&mut buf, &record.name, &mut names);
                buf.write_u16::<BE>(record.r#type() as u16).unwrap();
                let class_code = record.class as u16 | if record.cache_flush { 0x8000 } else { 0 };
                buf.write_u16::<BE>(class_code).unwrap();
                buf.write_u32::<BE>(record.ttl_secs()).unwrap();
                record.write_rdata(&mut buf, &mut names);
            }
        }

        buf
    }
}
