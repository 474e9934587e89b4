use crate::models::stats::Stats;
use crate::models::types::{ItemId, ItemTypeId, MaterialId, ReservationId, StyleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of materials an item can carry over its lifetime
pub const MAX_MATERIAL_SLOTS: usize = 3;

/// A material applied to an item. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialApplication {
    pub material_id: MaterialId,
    pub style_id: StyleId,
    /// 0..=2, unique and contiguous per item
    pub slot_index: i16,
    pub applied_at: DateTime<Utc>,
}

/// Item owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemId,
    pub owner: UserId,
    pub item_type_id: ItemTypeId,
    pub level: i32,

    /// Ordered by slot index
    pub applied: Vec<MaterialApplication>,

    // Cached derivations, rewritten on every craft/upgrade
    pub is_styled: bool,
    pub image_url: Option<String>,
    pub stats: Stats,

    /// Bumped on every write; used for optimistic concurrency checks
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemInstance {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner == user_id
    }

    pub fn free_slots(&self) -> usize {
        MAX_MATERIAL_SLOTS.saturating_sub(self.applied.len())
    }

    /// (material, style) pairs already applied, in slot order
    pub fn applied_pairs(&self) -> Vec<(MaterialId, StyleId)> {
        self.applied.iter().map(|a| (a.material_id, a.style_id)).collect()
    }
}

/// One requested material for a craft: which stack to take from and how many
/// units to consume. Each selection fills exactly one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSelection {
    pub material_id: MaterialId,
    pub style_id: StyleId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Everything that must be written together when a craft succeeds
#[derive(Debug, Clone)]
pub struct CraftWrite {
    pub item_id: ItemId,
    pub expected_version: i64,
    pub new_applications: Vec<MaterialApplication>,
    pub stats: Stats,
    pub image_url: String,
    pub is_styled: bool,
    /// Reservation finalized in the same transaction
    pub reservation_id: ReservationId,
}
