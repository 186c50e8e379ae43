//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lowercases, trims, and collapses runs of whitespace to single spaces.
///
/// Used wherever user-spoken text is compared against catalog names.
#[must_use]
pub fn normalize_spoken(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Strips everything but ASCII digits from a phone number.
#[must_use]
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_spoken("  RX   Caviglia  Destra "), "rx caviglia destra");
        assert_eq!(normalize_spoken(""), "");
    }

    #[test]
    fn digits_only_strips_punctuation() {
        assert_eq!(digits_only("+39 333 123-4567"), "393331234567");
        assert_eq!(digits_only("no digits"), "");
    }
}
