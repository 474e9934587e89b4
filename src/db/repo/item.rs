use crate::db::DbResult;
use crate::models::item::{CraftWrite, ItemInstance};
use crate::models::stats::Stats;
use crate::models::types::{ItemId, UserId};

#[async_trait::async_trait]
pub trait ItemRepo: Send + Sync {
    /// Item with its applied materials in slot order
    async fn get(&self, item_id: ItemId) -> DbResult<Option<ItemInstance>>;

    /// All items owned by a user
    async fn list_for_owner(&self, owner: UserId) -> DbResult<Vec<ItemInstance>>;

    /// Insert a fresh item (no applied materials)
    async fn create(&self, item: &ItemInstance) -> DbResult<()>;

    /// Append applications, rewrite cached stats/image/styled flag and finalize
    /// the material reservation, all or nothing. Fails with
    /// `DbError::VersionConflict` when the item changed since it was read and
    /// with `DbError::StaleReservation` when the reservation is gone.
    async fn persist_craft(&self, write: &CraftWrite) -> DbResult<ItemInstance>;

    /// Set level and stats, guarded by the version check
    async fn update_level(&self, item_id: ItemId, expected_version: i64, level: i32, stats: Stats)
    -> DbResult<ItemInstance>;
}
