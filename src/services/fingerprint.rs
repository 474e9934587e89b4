use crate::models::artifact::ComboFingerprint;
use crate::models::types::{ItemTypeId, MaterialId, StyleId};
use crate::util::canonical::{canonical_pairs, sha256_hex};

/// Bumped if the canonical form ever changes, so old cache rows are not reused
const COMBO_VERSION: &str = "combo/v1";

/// Canonical string hashed into a fingerprint
pub fn canonical_combo(item_type_id: ItemTypeId, materials: &[(MaterialId, StyleId)]) -> String {
    let pairs = canonical_pairs(materials);
    format!("{COMBO_VERSION}|{item_type_id}|{}", pairs.join(","))
}

/// Order independent fingerprint of an item type plus its (material, style)
/// multiset. Style is part of the key: the same material in a different style
/// is a different piece of artwork.
pub fn fingerprint(item_type_id: ItemTypeId, materials: &[(MaterialId, StyleId)]) -> ComboFingerprint {
    ComboFingerprint::from_hex(sha256_hex(&canonical_combo(item_type_id, materials)))
}
