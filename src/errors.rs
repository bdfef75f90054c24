//! Error types for the wire codec and the advertiser/discovery engine.

use thiserror::Error;

/// Constructs and returns a `std::io::Error` with the given `ErrorKind`.
///
/// Used throughout the wire codec (`io.rs`, `record.rs`, `message.rs`) so a
/// malformed packet becomes an `Err`, never a panic.
#[macro_export]
macro_rules! bail {
    ($kind:ident, $($arg:tt)*) => {
        // Construct the I/O error.
        return Err(
            ::std::io::Error::new(::std::io::ErrorKind::$kind, format!($($arg)*))
        )
    };
}

/// Errors surfaced across the public advertiser API.
///
/// Wire-level decode failures stay as `std::io::Error` (see `bail!` above);
/// this type covers the user-visible registration and update operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvertiserError {
    /// `add_service` called with a `service_id` that is already registered.
    #[error("service id {0} is already registered")]
    DuplicateId(u64),

    /// `add_service` collided (case-insensitively) with an existing active
    /// service of the same name and type. The caller should rename and retry.
    #[error("service name '{0}' conflicts with an existing active service")]
    ConflictingName(String),

    /// Operation referenced a `service_id` that isn't registered.
    #[error("service id {0} is not registered")]
    NotFound(u64),

    /// `add_or_update_service` was called for an existing id with a
    /// registration that differs in more than subtypes/TTL.
    #[error("service id {0} update changes immutable fields")]
    MaterialChange(u64),

    /// `is_update_only` was set but no existing registration was found.
    #[error("service id {0} has no existing registration to update")]
    UpdateOnlyMissing(u64),

    /// Probing failed to resolve a conflict after the maximum number of
    /// rename attempts.
    #[error("service id {0} exceeded the maximum of {1} rename attempts")]
    MaxRenameAttempts(u64, u32),

    /// Catch-all for invariant violations that should never happen in
    /// practice but are surfaced rather than panicking.
    #[error("internal error: {0}")]
    InternalError(String),
}
