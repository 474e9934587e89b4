use crate::db::error::DbError;
use crate::db::repo::item::ItemRepo;
use crate::db::repo::ledger_mem::MemoryLedgerRepository;
use crate::db::DbResult;
use crate::models::item::{CraftWrite, ItemInstance};
use crate::models::stats::Stats;
use crate::models::types::{ItemId, UserId};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// Ephemeral item store. Shares the in-memory ledger so a craft can finalize
/// its reservation under the same item lock it writes with.
pub struct MemoryItemRepository {
    items: DashMap<ItemId, ItemInstance>,
    ledger: Arc<MemoryLedgerRepository>,
}

impl MemoryItemRepository {
    pub fn new(ledger: Arc<MemoryLedgerRepository>) -> Self {
        Self {
            items: DashMap::new(),
            ledger,
        }
    }
}

#[async_trait]
impl ItemRepo for MemoryItemRepository {
    async fn get(&self, item_id: ItemId) -> DbResult<Option<ItemInstance>> {
        Ok(self.items.get(&item_id).map(|i| i.clone()))
    }

    async fn list_for_owner(&self, owner: UserId) -> DbResult<Vec<ItemInstance>> {
        let mut items: Vec<ItemInstance> = self
            .items
            .iter()
            .filter(|i| i.owner == owner)
            .map(|i| i.clone())
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn create(&self, item: &ItemInstance) -> DbResult<()> {
        if self.items.contains_key(&item.id) {
            return Err(DbError::UniqueViolation);
        }
        self.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn persist_craft(&self, write: &CraftWrite) -> DbResult<ItemInstance> {
        let mut item = self.items.get_mut(&write.item_id).ok_or(DbError::NotFound)?;
        if item.version != write.expected_version {
            return Err(DbError::VersionConflict);
        }
        if !self.ledger.finalize(write.reservation_id) {
            return Err(DbError::StaleReservation);
        }

        item.applied.extend(write.new_applications.iter().cloned());
        item.stats = write.stats;
        item.image_url = Some(write.image_url.clone());
        item.is_styled = write.is_styled;
        item.version += 1;
        item.updated_at = Utc::now();

        Ok(item.clone())
    }

    async fn update_level(
        &self,
        item_id: ItemId,
        expected_version: i64,
        level: i32,
        stats: Stats,
    ) -> DbResult<ItemInstance> {
        let mut item = self.items.get_mut(&item_id).ok_or(DbError::NotFound)?;
        if item.version != expected_version {
            return Err(DbError::VersionConflict);
        }

        item.level = level;
        item.stats = stats;
        item.version += 1;
        item.updated_at = Utc::now();

        Ok(item.clone())
    }
}
