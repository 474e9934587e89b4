use crate::db::error::DbError;
use crate::db::repo::{CatalogRepo, ItemRepo};
use crate::error::{AppResult, DomainError};
use crate::models::catalog::{ItemType, Material};
use crate::models::item::ItemInstance;
use crate::models::stats::Stats;
use crate::models::types::{ItemId, ItemTypeId, MaterialId, UserId};
use crate::services::stats::{compute_stats, sum_stats};
use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;

pub struct ItemService {
    items: Arc<dyn ItemRepo>,
    catalog: Arc<dyn CatalogRepo>,
}

impl ItemService {
    pub fn new(items: Arc<dyn ItemRepo>, catalog: Arc<dyn CatalogRepo>) -> Self {
        Self { items, catalog }
    }

    /// Give a user a fresh level 1 item with nothing applied
    pub async fn create_item(&self, owner: UserId, item_type_id: ItemTypeId) -> AppResult<ItemInstance> {
        // client-supplied id, so an unknown type is the caller's mistake
        let item_type = self
            .catalog
            .item_type(item_type_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("item type {item_type_id}")))?;
        let stats = compute_stats(item_type.base_stats.as_ref(), 1, &[])?;

        let now = Utc::now();
        let item = ItemInstance {
            id: ItemId::new(),
            owner,
            item_type_id,
            level: 1,
            applied: Vec::new(),
            is_styled: false,
            image_url: None,
            stats,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.items.create(&item).await?;

        tracing::info!(item_id = %item.id, owner = %owner, item_type = %item_type.name, "item created");
        Ok(item)
    }

    /// Item as seen by `user_id`. Other people's items are off limits.
    pub async fn get_owned(&self, user_id: UserId, item_id: ItemId) -> AppResult<ItemInstance> {
        let item = self
            .items
            .get(item_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("item {item_id}")))?;
        if !item.is_owned_by(user_id) {
            return Err(DomainError::PermissionDenied);
        }
        Ok(item)
    }

    pub async fn list(&self, owner: UserId) -> AppResult<Vec<ItemInstance>> {
        let items = self.items.list_for_owner(owner).await?;
        Ok(items)
    }

    /// Change the level and rederive the cached stats from base, level and
    /// every applied material.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn set_level(&self, user_id: UserId, item_id: ItemId, level: i32) -> AppResult<ItemInstance> {
        if level < 1 {
            return Err(DomainError::validation("level", format!("must be >= 1, got {level}")));
        }

        let item = self.get_owned(user_id, item_id).await?;
        let item_type = item_type(self.catalog.as_ref(), item.item_type_id).await?;
        let ids: Vec<MaterialId> = item.applied.iter().map(|a| a.material_id).collect();
        let materials = materials(self.catalog.as_ref(), &ids).await?;
        let stats = derive_stats(&item_type, level, &materials)?;

        match self.items.update_level(item_id, item.version, level, stats).await {
            Ok(item) => {
                tracing::info!(level, "item level changed");
                Ok(item)
            }
            Err(DbError::VersionConflict) => Err(DomainError::ConcurrencyConflict(item_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Combined stats of the given items, all of which must belong to `user_id`
    pub async fn loadout_stats(&self, user_id: UserId, item_ids: &[ItemId]) -> AppResult<Stats> {
        let items = try_join_all(item_ids.iter().map(|id| self.get_owned(user_id, *id))).await?;
        Ok(sum_stats(items.iter().map(|i| &i.stats)))
    }
}

pub(crate) async fn item_type(catalog: &dyn CatalogRepo, id: ItemTypeId) -> AppResult<ItemType> {
    catalog
        .item_type(id)
        .await?
        .ok_or_else(|| DomainError::Configuration(format!("unknown item type {id}")))
}

/// Material templates in the order of `ids`. A missing template means broken
/// seed data.
pub(crate) async fn materials(catalog: &dyn CatalogRepo, ids: &[MaterialId]) -> AppResult<Vec<Material>> {
    let found = try_join_all(ids.iter().map(|id| catalog.material(*id))).await?;
    ids.iter()
        .zip(found)
        .map(|(id, m)| m.ok_or_else(|| DomainError::Configuration(format!("unknown material {id}"))))
        .collect()
}

pub(crate) fn derive_stats(item_type: &ItemType, level: i32, materials: &[Material]) -> AppResult<Stats> {
    let modifiers: Vec<_> = materials.iter().map(|m| m.modifiers).collect();
    let stats = compute_stats(item_type.base_stats.as_ref(), level, &modifiers)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::{MemoryCatalogRepository, MemoryItemRepository, MemoryLedgerRepository};
    use crate::models::stats::BaseStats;

    async fn setup() -> (ItemService, ItemTypeId) {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        let sword = ItemType {
            id: ItemTypeId::new(),
            name: "Sword".into(),
            category: "weapon".into(),
            base_stats: Some(BaseStats(Stats::new(10.0, 1.0, 2.0, 0.5))),
            reference_image_url: None,
        };
        catalog.upsert_item_type(&sword).await.unwrap();

        let items = Arc::new(MemoryItemRepository::new(Arc::new(MemoryLedgerRepository::new())));
        (ItemService::new(items, catalog), sword.id)
    }

    #[tokio::test]
    async fn created_item_has_level_one_stats() {
        let (service, sword) = setup().await;
        let user = UserId::new();

        let item = service.create_item(user, sword).await.unwrap();
        assert_eq!(item.level, 1);
        assert_eq!(item.stats, Stats::new(10.0, 1.0, 2.0, 0.5));
        assert!(item.applied.is_empty());
        assert!(!item.is_styled);
    }

    #[tokio::test]
    async fn unknown_item_type_is_not_found() {
        let (service, _) = setup().await;
        let err = service.create_item(UserId::new(), ItemTypeId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_level_rescales_and_checks_owner() {
        let (service, sword) = setup().await;
        let user = UserId::new();
        let item = service.create_item(user, sword).await.unwrap();

        let leveled = service.set_level(user, item.id, 11).await.unwrap();
        assert_eq!(leveled.stats.attack_power, 15.0);
        assert_eq!(leveled.version, item.version + 1);

        assert!(matches!(
            service.set_level(UserId::new(), item.id, 2).await,
            Err(DomainError::PermissionDenied)
        ));
        assert!(matches!(
            service.set_level(user, item.id, 0).await,
            Err(DomainError::Validation { field: "level", .. })
        ));
    }

    #[tokio::test]
    async fn loadout_sums_item_stats() {
        let (service, sword) = setup().await;
        let user = UserId::new();
        let a = service.create_item(user, sword).await.unwrap();
        let b = service.create_item(user, sword).await.unwrap();

        let total = service.loadout_stats(user, &[a.id, b.id]).await.unwrap();
        assert_eq!(total, Stats::new(20.0, 2.0, 4.0, 1.0));

        let missing = service.loadout_stats(user, &[a.id, ItemId::new()]).await.unwrap_err();
        assert!(matches!(missing, DomainError::NotFound(_)));
    }
}
