//! Canonical ordering and hashing shared by the combo fingerprint and the
//! weighted tables: the same logical set always yields the same bytes, no
//! matter in which order it was submitted or stored.

use sha2::{Digest, Sha256};
use std::fmt::Display;

/// Render `(a, b)` pairs as `a:b` and sort them. Duplicates are kept, the
/// result describes a multiset.
pub fn canonical_pairs<A: Display, B: Display>(pairs: &[(A, B)]) -> Vec<String> {
    let mut out: Vec<String> = pairs.iter().map(|(a, b)| format!("{a}:{b}")).collect();
    out.sort_unstable();
    out
}

/// Stable sort by key. Equal keys keep their relative order.
pub fn canonical_order<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by_key(|t| key(t));
}

/// Lowercase hex SHA-256 of `input`
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_sorted_and_keep_duplicates() {
        let pairs = [("wood", "foil"), ("iron", "normal"), ("wood", "foil")];
        assert_eq!(
            canonical_pairs(&pairs),
            vec!["iron:normal", "wood:foil", "wood:foil"]
        );
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
