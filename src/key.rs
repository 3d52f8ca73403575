//! Composite key formation and parsing.
//!
//! Rules and state entries are addressed by keys built from ordered string
//! parts joined with a fixed delimiter. The delimiter must never appear
//! inside an entity or attribute name; this is a documented constraint on
//! callers, not something enforced at runtime.

/// Delimiter between key parts. Change with caution: stored Redis hashes
/// and field names are keyed with it.
pub const KEY_DELIMITER: char = ':';

/// Wildcard entity name matching any entity of a type.
pub const ALL_ENTITY: &str = "ALL";

/// Wildcard attribute value matching any value of an attribute type.
pub const ALL_ATTRIBUTE: &str = "ALL";

/// Join key parts with the delimiter.
pub fn form_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut key = String::new();
    for part in parts {
        if !key.is_empty() {
            key.push(KEY_DELIMITER);
        }
        key.push_str(part);
    }
    key
}

/// Split a composite key back into its parts.
pub fn split_key(key: &str) -> Vec<&str> {
    key.split(KEY_DELIMITER).collect()
}

/// Extract a single position from a composite key.
///
/// Returns `None` when the index is out of range.
pub fn key_part(key: &str, index: usize) -> Option<&str> {
    key.split(KEY_DELIMITER).nth(index)
}
