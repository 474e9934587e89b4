use crate::db::DbResult;
use crate::models::catalog::{EnemyStyleWeight, ItemType, Material, Style};
use crate::models::types::{EnemyTypeId, ItemTypeId, MaterialId, StyleId};

#[async_trait::async_trait]
pub trait CatalogRepo: Send + Sync {
    // ========================================================================
    // LOOKUPS
    // ========================================================================

    async fn item_type(&self, id: ItemTypeId) -> DbResult<Option<ItemType>>;

    async fn material(&self, id: MaterialId) -> DbResult<Option<Material>>;

    async fn style(&self, id: StyleId) -> DbResult<Option<Style>>;

    /// Style probability table of an enemy type, unordered
    async fn enemy_styles(&self, enemy_type_id: EnemyTypeId) -> DbResult<Vec<EnemyStyleWeight>>;

    // ========================================================================
    // SEEDING
    // ========================================================================

    async fn upsert_item_type(&self, item_type: &ItemType) -> DbResult<()>;

    async fn upsert_material(&self, material: &Material) -> DbResult<()>;

    async fn upsert_style(&self, style: &Style) -> DbResult<()>;

    async fn upsert_enemy_type(&self, id: EnemyTypeId, name: &str) -> DbResult<()>;

    /// Replace the whole style table of an enemy type
    async fn set_enemy_styles(&self, enemy_type_id: EnemyTypeId, weights: &[EnemyStyleWeight]) -> DbResult<()>;
}
