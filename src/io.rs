//! Low level wire-reading helpers shared by the codec (`message.rs`,
//! `record.rs`): a `Read + Seek` cursor with an optional byte-length limit,
//! and extension traits for reading qnames/types/classes off it.

use crate::bail;
use crate::types::{Class, Type};
use byteorder::{ReadBytesExt, BE};
use num_traits::FromPrimitive;
use std::collections::HashSet;
use std::convert::TryInto;
use std::io;
use std::io::Cursor;
use std::io::SeekFrom;

pub fn clamp<T: PartialOrd>(v: T, min: T, max: T) -> T {
    assert!(min < max);

    if v < min {
        min
    } else if v > max {
        max
    } else {
        v
    }
}

pub trait SeekExt: io::Seek {
    /// Returns the number of bytes remaining to be consumed.
    /// This is used as a way to check for malformed input.
    fn remaining(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;

        // reset position
        self.seek(SeekFrom::Start(pos))?;

        Ok(len - pos)
    }
}

impl<'a> SeekExt for Cursor<&'a [u8]> {
    fn remaining(self: &mut std::io::Cursor<&'a [u8]>) -> io::Result<u64> {
        let pos = self.position() as usize;
        let len = self.get_ref().len() as usize;

        Ok((len - pos).try_into().unwrap())
    }
}

impl<'a> SeekExt for MessageReader<'a> {}

pub trait CursorExt<T> {
    /// Return a cursor that is bounded over the original cursor by start-end.
    ///
    /// The returned cursor contains all values with start <= x < end. It is empty if start >= end.
    fn sub_cursor(&mut self, start: usize, end: usize) -> io::Result<std::io::Cursor<T>>;
}

impl<'a> CursorExt<&'a [u8]> for Cursor<&'a [u8]> {
    fn sub_cursor(&mut self, start: usize, end: usize) -> io::Result<std::io::Cursor<&'a [u8]>> {
        let buf = self.get_ref();

        let start = clamp(start, 0, buf.len());
        let end = clamp(end, start, buf.len());

        let record = Cursor::new(&buf[start..end]);
        Ok(record)
    }
}

/// A `Read + Seek` cursor over a full packet buffer that additionally
/// supports temporarily restricting how many more bytes may be read, via
/// [`MessageReader::push_limit`].
///
/// Modelled on the same need as the teacher's `CursorExt::sub_cursor`, but
/// as a push/pop stack rather than a one-shot sub-slice, so rdata parsing
/// can nest a limit without losing the ability to seek backwards out of it
/// (name decompression pointers routinely point earlier in the packet, well
/// outside the current record's rdata).
pub struct MessageReader<'a> {
    cur: Cursor<&'a [u8]>,
    limits: Vec<u64>,
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        MessageReader {
            cur: Cursor::new(buf),
            limits: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cur.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restricts subsequent reads to at most `limit` further bytes.
    ///
    /// A negative `limit` is ignored (no restriction is applied). A `limit`
    /// that would place the new boundary beyond the end of the buffer is an
    /// error, as is a limit that extends *past* any limit already on the
    /// stack.
    pub fn push_limit(&mut self, limit: i64) -> io::Result<()> {
        if limit < 0 {
            return Ok(());
        }

        let pos = self.cur.position();
        let new_end = pos
            .checked_add(limit as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "limit overflow"))?;

        let bound = self.limits.last().copied().unwrap_or(self.len() as u64);
        if new_end > bound {
            bail!(InvalidData, "limit of {} bytes exceeds available data", limit);
        }

        self.limits.push(new_end);
        Ok(())
    }

    /// Removes the most recently pushed limit, if any.
    pub fn pop_limit(&mut self) {
        self.limits.pop();
    }

    fn limit_end(&self) -> u64 {
        self.limits.last().copied().unwrap_or(self.len() as u64)
    }

    /// Bytes remaining before the innermost active limit (or the end of the
    /// buffer, if no limit is pushed).
    pub fn remaining_in_current_limit(&self) -> io::Result<u64> {
        Ok(self.limit_end().saturating_sub(self.cur.position()))
    }
}

impl<'a> io::Read for MessageReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.cur.position();
        let allowed = self.limit_end().saturating_sub(pos) as usize;
        let n = buf.len().min(allowed);
        self.cur.read(&mut buf[..n])
    }
}

impl<'a> io::Seek for MessageReader<'a> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // Limits only bound forward reads; name-compression pointers must be
        // free to jump anywhere earlier in the packet.
        self.cur.seek(pos)
    }
}

/// All types that implement `Read` and `Seek` get methods defined
/// in `DNSReadExt` for free.
impl<R: io::Read + ?Sized + io::Seek> DNSReadExt for R {}

/// Default maximum number of labels permitted in a single decoded name
/// (§6.3's `enable_label_count_limit`, on by default). Callers that disable
/// the limit pass `usize::MAX` to [`DNSReadExt::read_qname`] instead.
pub(crate) const MAX_LABELS: usize = 128;

/// Maximum number of compression-pointer jumps followed while decoding a
/// single name.
const MAX_JUMPS: usize = 16;

/// Extensions to io::Read to add some DNS specific types.
pub trait DNSReadExt: io::Read + io::Seek {
    /// Reads a (possibly compressed) domain name from a DNS message.
    ///
    /// Labels are taken as raw UTF-8 (mDNS/DNS-SD instance and service names
    /// are not puny-encoded, unlike traditional DNS hostnames). Returns the
    /// dotted, trailing-dot name.
    ///
    /// Guards against malformed compression: follows at most
    /// [`MAX_JUMPS`] pointers, rejects any pointer that doesn't point
    /// strictly backwards, rejects revisiting an offset, and caps the
    /// number of labels at `max_labels` (pass [`MAX_LABELS`] for the
    /// default, or `usize::MAX` when
    /// [`crate::config::AdvertiserConfig::enable_label_count_limit`] is off).
    ///
    /// # Errors
    ///
    /// Returns `io::Error(InvalidData)` for any of the above violations, or
    /// a more general `io::Error` on read failure. Never panics.
    fn read_qname(&mut self, max_labels: usize) -> io::Result<String> {
        let mut qname = String::new();
        let mut labels = 0usize;
        let mut jumps = 0usize;
        let mut visited: HashSet<u64> = HashSet::new();
        let mut return_pos: Option<u64> = None;

        loop {
            let pos = self.stream_position()?;
            let len = self.read_u8()?;
            if len == 0 {
                break;
            }

            match len & 0xC0 {
                // No compression.
                0x00 => {
                    labels += 1;
                    if labels > max_labels {
                        bail!(InvalidData, "name exceeds {} labels", max_labels);
                    }

                    let mut label = vec![0; len.into()];
                    self.read_exact(&mut label)?;

                    let label = match std::str::from_utf8(&label) {
                        Err(e) => bail!(InvalidData, "invalid label: {}", e),
                        Ok(s) => s,
                    };

                    qname.push_str(label);
                    qname.push('.');
                }

                // Compression pointer.
                0xC0 => {
                    let b2 = self.read_u8()? as u16;
                    let ptr = (((len as u16) & 0x3F) << 8 | b2) as u64;

                    if return_pos.is_none() {
                        return_pos = Some(self.stream_position()?);
                    }

                    jumps += 1;
                    if jumps > MAX_JUMPS {
                        bail!(InvalidData, "too many compression pointer jumps");
                    }

                    // Pointers must only ever point strictly backwards; this
                    // alone makes an infinite loop impossible, but we also
                    // track visited offsets so a long chain can't be used to
                    // exhaust MAX_JUMPS worth of work more than once.
                    if ptr >= pos {
                        bail!(
                            InvalidData,
                            "compressed pointer does not point backwards"
                        );
                    }
                    if !visited.insert(ptr) {
                        bail!(InvalidData, "compression pointer loop detected");
                    }

                    self.seek(SeekFrom::Start(ptr))?;
                    continue;
                }

                _ => bail!(InvalidData, "unsupported compression type {0:b}", len & 0xC0),
            }
        }

        if qname.is_empty() {
            qname.push('.'); // Root domain.
        }

        if let Some(rp) = return_pos {
            self.seek(SeekFrom::Start(rp))?;
        }

        Ok(qname)
    }

    /// Reads a raw 16-bit record/question TYPE code.
    ///
    /// Unlike [`Class`], unrecognised type codes are not a decode failure --
    /// they must be preserved as opaque records, and peers may legitimately
    /// ask questions about types we don't serve.
    fn read_type_code(&mut self) -> io::Result<u16> {
        self.read_u16::<BE>()
    }

    /// Reads a known DNS [`Type`], failing if the code isn't one of the
    /// types this crate gives first-class meaning to.
    fn read_type(&mut self) -> io::Result<Type> {
        let code = self.read_type_code()?;
        match FromPrimitive::from_u16(code) {
            Some(t) => Ok(t),
            None => bail!(InvalidData, "unrecognised Type({})", code),
        }
    }

    /// Reads the raw 16-bit class field, including the cache-flush /
    /// unicast-response-requested high bit.
    fn read_class_code(&mut self) -> io::Result<u16> {
        self.read_u16::<BE>()
    }

    /// Reads a DNS Class, masking off the high bit first.
    fn read_class(&mut self) -> io::Result<Class> {
        let code = self.read_class_code()?;
        match Class::from_u16_masked(code) {
            Some(t) => Ok(t),
            None => bail!(InvalidData, "unrecognised Class({})", code & 0x7FFF),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn labels(parts: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for p in parts {
            buf.write_u8(p.len() as u8).unwrap();
            buf.write_all(p.as_bytes()).unwrap();
        }
        buf.write_u8(0).unwrap();
        buf
    }

    #[test]
    fn reads_simple_name() {
        let buf = labels(&["foo", "local"]);
        let mut r = MessageReader::new(&buf);
        assert_eq!(r.read_qname(MAX_LABELS).unwrap(), "foo.local.");
    }

    #[test]
    fn max_labels_param_is_actually_enforced() {
        let parts: Vec<&str> = std::iter::repeat("a").take(5).collect();
        let buf = labels(&parts);

        let mut r = MessageReader::new(&buf);
        assert!(r.read_qname(4).is_err());

        let mut r = MessageReader::new(&buf);
        assert!(r.read_qname(5).is_ok());
    }

    #[test]
    fn reads_compressed_name() {
        // "local." at offset 0, then "foo" pointing back at offset 0.
        let mut buf = labels(&["local"]);
        let ptr_offset = buf.len();
        buf.push(3);
        buf.extend_from_slice(b"foo");
        buf.push(0xC0);
        buf.push(0x00); // pointer to offset 0

        let mut r = MessageReader::new(&buf);
        r.cur.set_position(ptr_offset as u64);
        assert_eq!(r.read_qname(MAX_LABELS).unwrap(), "foo.local.");
    }

    #[test]
    fn rejects_forward_pointer() {
        // A pointer at offset 0 pointing forward to offset 4 is invalid.
        let buf = [0xC0, 0x04, 0x00, 0x00, 0x00];
        let mut r = MessageReader::new(&buf);
        assert!(r.read_qname(MAX_LABELS).is_err());
    }

    #[test]
    fn rejects_pointer_loop() {
        // label "LABEL", then "TEST", then a pointer back to "TEST".
        let buf = [
            0x05, b'L', b'A', b'B', b'E', b'L', 0x04, b'T', b'E', b'S', b'T', 0xC0, 0x06,
        ];
        let mut r = MessageReader::new(&buf);
        r.cur.set_position(11);
        assert!(r.read_qname(MAX_LABELS).is_err());
    }

    #[test]
    fn push_limit_rejects_overrun() {
        let buf = [1u8, 2, 3, 4, 5];
        let mut r = MessageReader::new(&buf);
        r.push_limit(2).unwrap();
        let mut out = [0u8; 3];
        assert!(r.read_exact(&mut out).is_err());
    }

    #[test]
    fn push_limit_beyond_buffer_fails() {
        let buf = [1u8, 2, 3];
        let mut r = MessageReader::new(&buf);
        assert!(r.push_limit(10).is_err());
    }

    #[test]
    fn negative_limit_is_ignored() {
        let buf = [1u8, 2, 3];
        let mut r = MessageReader::new(&buf);
        assert!(r.push_limit(-1).is_ok());
        let mut out = [0u8; 3];
        assert!(r.read_exact(&mut out).is_ok());
    }
}
