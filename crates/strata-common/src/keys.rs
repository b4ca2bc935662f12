//! Key-space encodings for the secondary indices
//!
//! ```text
//! !latest!<layer>!<dataset>!<key>          -> pointer  (mutable, one per live key)
//! !changes!<layer>!<key>!<packedChange>    -> pointer  (append-only)
//! ```
//!
//! `packedChange` is fixed-width lowercase hex, so byte order of the
//! encoded keys equals numeric order of the change numbers.

use crate::types::{Change, LayerId};
use std::borrow::Cow;
use thiserror::Error;

/// Separator between key-space segments
pub const SEPARATOR: char = '!';

/// Sorts after every valid UTF-8 suffix of a prefix
pub const UPPER_BOUND: char = char::MAX;

/// Invalid user key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,
    #[error("key contains the reserved separator '!': {0}")]
    ReservedSeparator(String),
}

/// Validate a user key or dataset name
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.contains(SEPARATOR) {
        return Err(KeyError::ReservedSeparator(key.to_string()));
    }
    Ok(())
}

/// Order-preserving encoding of a change number
#[must_use]
pub fn pack_change(change: Change) -> String {
    format!("{change:016x}")
}

/// Inverse of [`pack_change`]
#[must_use]
pub fn unpack_change(packed: &str) -> Option<Change> {
    if packed.len() != 16 || !packed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Change::from_str_radix(packed, 16).ok()
}

/// Prefix of every latest-index entry of one dataset in one layer
#[must_use]
pub fn latest_prefix(layer: &LayerId, dataset: &str) -> String {
    format!("!latest!{layer}!{dataset}!")
}

#[must_use]
pub fn latest_key(layer: &LayerId, dataset: &str, key: &str) -> String {
    format!("!latest!{layer}!{dataset}!{key}")
}

/// Prefix of every changes-index entry of one key in one layer
#[must_use]
pub fn changes_prefix(layer: &LayerId, key: &str) -> String {
    format!("!changes!{layer}!{key}!")
}

#[must_use]
pub fn changes_key(layer: &LayerId, key: &str, change: Change) -> String {
    format!("!changes!{layer}!{key}!{}", pack_change(change))
}

/// Key component used in the changes index.
///
/// Named datasets are folded into the key as `<dataset>!<key>`. A dataset
/// entry still shares the `<dataset>!` prefix with the bare key of the same
/// name, so readers must check that what follows the prefix is a packed
/// change (see [`unpack_change`]).
#[must_use]
pub fn changes_subject<'a>(dataset: &str, key: &'a str) -> Cow<'a, str> {
    if dataset.is_empty() {
        Cow::Borrowed(key)
    } else {
        Cow::Owned(format!("{dataset}{SEPARATOR}{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_key_layouts() {
        let layer = LayerId::new("ff00");
        assert_eq!(latest_key(&layer, "", "a"), "!latest!ff00!!a");
        assert_eq!(latest_key(&layer, "ds", "a"), "!latest!ff00!ds!a");
        assert_eq!(latest_prefix(&layer, "ds"), "!latest!ff00!ds!");
        assert_eq!(
            changes_key(&layer, "a", 10),
            "!changes!ff00!a!000000000000000a"
        );
        assert!(changes_key(&layer, "a", 10).starts_with(&changes_prefix(&layer, "a")));
    }

    #[test]
    fn test_pack_change_preserves_order() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let a: u64 = rng.r#gen();
            let b: u64 = rng.r#gen();
            assert_eq!(a.cmp(&b), pack_change(a).cmp(&pack_change(b)));
        }
        assert!(pack_change(9) < pack_change(10));
        assert!(pack_change(255) < pack_change(256));
    }

    #[test]
    fn test_unpack_change() {
        assert_eq!(unpack_change(&pack_change(42)), Some(42));
        assert_eq!(unpack_change(&pack_change(u64::MAX)), Some(u64::MAX));
        assert_eq!(unpack_change("2a"), None);
        assert_eq!(unpack_change("+00000000000002a"), None);
        assert_eq!(unpack_change("0000000000000001!0000000000000002"), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("hello").is_ok());
        assert_eq!(validate_key(""), Err(KeyError::Empty));
        assert!(matches!(
            validate_key("a!b"),
            Err(KeyError::ReservedSeparator(_))
        ));
    }

    #[test]
    fn test_changes_subject() {
        assert_eq!(changes_subject("", "k"), "k");
        assert_eq!(changes_subject("people", "k"), "people!k");
    }

    #[test]
    fn test_upper_bound_sorts_after_keys() {
        let prefix = "!latest!l!!";
        let hi = format!("{prefix}{UPPER_BOUND}");
        assert!(format!("{prefix}zzz").as_str() < hi.as_str());
        assert!(format!("{prefix}\u{4e2d}").as_str() < hi.as_str());
    }
}
