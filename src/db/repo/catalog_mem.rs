use crate::db::DbResult;
use crate::db::repo::catalog::CatalogRepo;
use crate::models::catalog::{EnemyStyleWeight, ItemType, Material, Style};
use crate::models::types::{EnemyTypeId, ItemTypeId, MaterialId, StyleId};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryCatalogRepository {
    item_types: DashMap<ItemTypeId, ItemType>,
    materials: DashMap<MaterialId, Material>,
    styles: DashMap<StyleId, Style>,
    enemy_types: DashMap<EnemyTypeId, String>,
    enemy_styles: DashMap<EnemyTypeId, Vec<EnemyStyleWeight>>,
}

impl MemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepo for MemoryCatalogRepository {
    async fn item_type(&self, id: ItemTypeId) -> DbResult<Option<ItemType>> {
        Ok(self.item_types.get(&id).map(|t| t.clone()))
    }

    async fn material(&self, id: MaterialId) -> DbResult<Option<Material>> {
        Ok(self.materials.get(&id).map(|m| m.clone()))
    }

    async fn style(&self, id: StyleId) -> DbResult<Option<Style>> {
        Ok(self.styles.get(&id).map(|s| s.clone()))
    }

    async fn enemy_styles(&self, enemy_type_id: EnemyTypeId) -> DbResult<Vec<EnemyStyleWeight>> {
        Ok(self
            .enemy_styles
            .get(&enemy_type_id)
            .map(|w| w.clone())
            .unwrap_or_default())
    }

    async fn upsert_item_type(&self, item_type: &ItemType) -> DbResult<()> {
        self.item_types.insert(item_type.id, item_type.clone());
        Ok(())
    }

    async fn upsert_material(&self, material: &Material) -> DbResult<()> {
        self.materials.insert(material.id, material.clone());
        Ok(())
    }

    async fn upsert_style(&self, style: &Style) -> DbResult<()> {
        self.styles.insert(style.id, style.clone());
        Ok(())
    }

    async fn upsert_enemy_type(&self, id: EnemyTypeId, name: &str) -> DbResult<()> {
        self.enemy_types.insert(id, name.to_string());
        Ok(())
    }

    async fn set_enemy_styles(&self, enemy_type_id: EnemyTypeId, weights: &[EnemyStyleWeight]) -> DbResult<()> {
        self.enemy_styles.insert(enemy_type_id, weights.to_vec());
        Ok(())
    }
}
