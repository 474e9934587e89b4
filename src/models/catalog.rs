use crate::models::stats::{BaseStats, StatModifiers};
use crate::models::types::{EnemyTypeId, ItemTypeId, MaterialId, StyleId};
use serde::{Deserialize, Serialize};

/// Item template (e.g. "Iron Sword"). Instances reference it by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemType {
    pub id: ItemTypeId,
    pub name: String,
    pub category: String,

    /// Base stats at level 1. `None` means the seed data is incomplete.
    pub base_stats: Option<BaseStats>,

    /// Artwork used as a style reference when generating crafted variants
    pub reference_image_url: Option<String>,
}

/// Crafting material template (e.g. "Wood", "Crystal")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub description: Option<String>,
    pub modifiers: StatModifiers,
}

/// Visual style a material stack can carry. Exactly one style, "normal", is
/// the default; everything else makes an item "styled".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub id: StyleId,
    pub name: String,
    pub is_default: bool,
}

/// One row of an enemy type's style probability table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyStyleWeight {
    pub enemy_type_id: EnemyTypeId,
    pub style_id: StyleId,
    pub weight: f64,
}
