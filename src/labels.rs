//! Instance-name truncation and rename-suffix helpers (§4.2, §4.6).
//!
//! Repurposes the shape of the teacher's dead `name.rs` (label validation,
//! length limits) for the one thing this crate actually needs: producing
//! `"<name> (n)"` on a conflict without ever exceeding 63 UTF-8 bytes.

/// Maximum length, in UTF-8 bytes, of a single DNS-SD instance name
/// (RFC 6763 §4.1.1 caps it at the 63-byte label limit).
pub const MAX_INSTANCE_NAME_LEN: usize = 63;

/// Appends ` (n)` to `name`, truncating `name` from the right (on a UTF-8
/// char boundary) just enough for the whole result to fit in
/// [`MAX_INSTANCE_NAME_LEN`] bytes.
///
/// `n` must be >= 2; conventionally the first rename attempt uses 2, and
/// each subsequent conflict on the same registration increments it.
pub fn rename_with_suffix(name: &str, n: u32) -> String {
    let suffix = format!(" ({})", n);
    let budget = MAX_INSTANCE_NAME_LEN.saturating_sub(suffix.len());

    let truncated = truncate_to_byte_budget(name, budget);
    format!("{}{}", truncated, suffix)
}

/// Truncates `s` from the right to at most `budget` bytes, always cutting on
/// a UTF-8 char boundary (never splitting a multi-byte character).
fn truncate_to_byte_budget(s: &str, budget: usize) -> &str {
    if s.len() <= budget {
        return s;
    }

    let mut end = budget;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}

/// Given a candidate name and a predicate that reports whether a name is
/// already taken, returns the first `rename_with_suffix(name, n)` for
/// n = 2, 3, 4, ... that the predicate reports as free.
///
/// Returns `None` once `n` would exceed [`crate::config::MAX_RENAME_ATTEMPTS`],
/// signalling the caller should surface `AdvertiserError::MaxRenameAttempts`.
pub fn next_free_name(name: &str, mut is_taken: impl FnMut(&str) -> bool) -> Option<(String, u32)> {
    for n in 2..=(crate::config::MAX_RENAME_ATTEMPTS + 1) {
        let candidate = rename_with_suffix(name, n);
        if !is_taken(&candidate) {
            return Some((candidate, n));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_just_gets_suffix_appended() {
        assert_eq!(rename_with_suffix("TestService", 2), "TestService (2)");
    }

    #[test]
    fn exactly_63_bytes_after_suffix_is_not_truncated() {
        // 59-byte name + " (2)" (4 bytes) = 63 bytes exactly.
        let name = "a".repeat(59);
        let renamed = rename_with_suffix(&name, 2);
        assert_eq!(renamed.len(), 63);
        assert!(renamed.starts_with(&name));
    }

    #[test]
    fn long_name_truncated_by_exactly_the_suffix_length() {
        // 63-byte name; " (2)" is 4 bytes, so 4 bytes must be cut.
        let name = "a".repeat(63);
        let renamed = rename_with_suffix(&name, 2);
        assert_eq!(renamed.len(), 63);
        assert_eq!(renamed, format!("{} (2)", "a".repeat(59)));
    }

    #[test]
    fn next_free_name_skips_taken_candidates() {
        let taken = ["TestService (2)".to_string()];
        let (name, n) = next_free_name("TestService", |c| taken.contains(&c.to_string())).unwrap();
        assert_eq!(name, "TestService (3)");
        assert_eq!(n, 3);
    }

    #[test]
    fn truncation_never_splits_a_multibyte_character() {
        // 30 'é' (2 bytes each) = 60 bytes, well past any budget that would
        // otherwise land mid-character.
        let name = "é".repeat(30);
        let renamed = rename_with_suffix(&name, 2);
        assert!(renamed.is_char_boundary(renamed.len() - 4));
    }
}
