//! Core wire-level enumerations shared by the codec (`message.rs`, `record.rs`).
//!
//! Kept deliberately small: this is not a general DNS library, so only the
//! record types the responder and repeaters ever produce or consume are
//! modelled as first class. Anything else decodes as
//! [`crate::record::RecordData::Unknown`] (RFC 6762 forward compatibility).

use num_traits::FromPrimitive;
use strum_macros::{Display, EnumString};

/// Query/Response bit of the header.
#[derive(Copy, Clone, Debug, Display, EnumString, PartialEq, Eq)]
pub enum QR {
    Query = 0,
    Response = 1,
}

impl Default for QR {
    fn default() -> Self {
        QR::Query
    }
}

impl QR {
    pub fn from_bool(b: bool) -> QR {
        match b {
            false => QR::Query,
            true => QR::Response,
        }
    }

    pub fn to_bool(self) -> bool {
        matches!(self, QR::Response)
    }
}

/// Resource Record (and Question) Type.
///
/// Only the six types the repository ever serves are named; everything else
/// is preserved as `Record::Unknown` so the codec never rejects a record it
/// merely doesn't understand.
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u16)]
pub enum Type {
    A = 1,
    PTR = 12,
    TXT = 16,
    AAAA = 28,
    SRV = 33,
    NSEC = 47,

    /// Only valid as a Question Type, or the QTYPE of the service
    /// enumeration meta-query.
    ANY = 255,
}

impl Type {
    /// Looks up a known [`Type`] from its wire code, or `None` if the code
    /// is one this crate doesn't have a first-class representation for.
    pub fn from_u16(code: u16) -> Option<Type> {
        FromPrimitive::from_u16(code)
    }
}

/// Resource Record (and Question) Class.
///
/// The top bit of the 16-bit wire field is the cache-flush bit (for
/// records) or the unicast-response-requested bit (for questions); callers
/// must mask it off before converting to [`Class`] (see
/// [`crate::io::DNSReadExt`]).
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Class {
    #[strum(serialize = "IN")]
    Internet = 1,

    #[strum(serialize = "*")]
    Any = 255,
}

impl Default for Class {
    fn default() -> Self {
        Class::Internet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_from_u16_known_and_unknown() {
        assert_eq!(Type::from_u16(1), Some(Type::A));
        assert_eq!(Type::from_u16(33), Some(Type::SRV));
        assert_eq!(Type::from_u16(6), None); // SOA: not modelled, decodes opaque
    }

    #[test]
    fn qr_round_trips_through_bool() {
        assert_eq!(QR::from_bool(false), QR::Query);
        assert_eq!(QR::from_bool(true), QR::Response);
        assert!(QR::Response.to_bool());
        assert!(!QR::Query.to_bool());
    }
}
