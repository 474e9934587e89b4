use crate::db::repo::catalog::CatalogRepo;
use crate::db::{Db, DbResult, map_row_opt, map_rows};
use crate::models::catalog::{EnemyStyleWeight, ItemType, Material, Style};
use crate::models::stats::{BaseStats, StatModifiers, Stats};
use crate::models::types::{EnemyTypeId, ItemTypeId, MaterialId, StyleId};
use std::sync::Arc;
use tokio_postgres::Row;

pub struct CatalogRepository {
    db: Arc<Db>,
}

impl CatalogRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn item_type_from_row(row: &Row) -> DbResult<ItemType> {
    let base: [Option<f64>; 4] = [
        row.try_get("base_attack_power")?,
        row.try_get("base_attack_accuracy")?,
        row.try_get("base_defense_power")?,
        row.try_get("base_defense_accuracy")?,
    ];

    // a partially filled row is as broken as an empty one
    let base_stats = match base {
        [Some(ap), Some(aa), Some(dp), Some(da)] => Some(BaseStats(Stats::new(ap, aa, dp, da))),
        _ => None,
    };

    Ok(ItemType {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        base_stats,
        reference_image_url: row.try_get("reference_image_url")?,
    })
}

fn material_from_row(row: &Row) -> DbResult<Material> {
    Ok(Material {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        modifiers: StatModifiers(Stats {
            attack_power: row.try_get("mod_attack_power")?,
            attack_accuracy: row.try_get("mod_attack_accuracy")?,
            defense_power: row.try_get("mod_defense_power")?,
            defense_accuracy: row.try_get("mod_defense_accuracy")?,
        }),
    })
}

fn style_from_row(row: &Row) -> DbResult<Style> {
    Ok(Style {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_default: row.try_get("is_default")?,
    })
}

#[async_trait::async_trait]
impl CatalogRepo for CatalogRepository {
    async fn item_type(&self, id: ItemTypeId) -> DbResult<Option<ItemType>> {
        let client = self.db.get_client().await?;
        let stmt = client.prepare_cached("SELECT * FROM item_types WHERE id = $1").await?;
        let row = client.query_opt(&stmt, &[&id]).await?;
        map_row_opt(row, item_type_from_row, &format!("CatalogRepo::item_type id={id}"))
    }

    async fn material(&self, id: MaterialId) -> DbResult<Option<Material>> {
        let client = self.db.get_client().await?;
        let stmt = client.prepare_cached("SELECT * FROM materials WHERE id = $1").await?;
        let row = client.query_opt(&stmt, &[&id]).await?;
        map_row_opt(row, material_from_row, &format!("CatalogRepo::material id={id}"))
    }

    async fn style(&self, id: StyleId) -> DbResult<Option<Style>> {
        let client = self.db.get_client().await?;
        let stmt = client.prepare_cached("SELECT * FROM styles WHERE id = $1").await?;
        let row = client.query_opt(&stmt, &[&id]).await?;
        map_row_opt(row, style_from_row, &format!("CatalogRepo::style id={id}"))
    }

    async fn enemy_styles(&self, enemy_type_id: EnemyTypeId) -> DbResult<Vec<EnemyStyleWeight>> {
        let client = self.db.get_client().await?;
        let rows = client
            .query(
                "SELECT enemy_type_id, style_id, weight FROM enemy_style_weights WHERE enemy_type_id = $1",
                &[&enemy_type_id],
            )
            .await?;

        map_rows(
            rows,
            |row| {
                Ok(EnemyStyleWeight {
                    enemy_type_id: row.try_get("enemy_type_id")?,
                    style_id: row.try_get("style_id")?,
                    weight: row.try_get("weight")?,
                })
            },
            &format!("CatalogRepo::enemy_styles enemy_type={enemy_type_id}"),
        )
    }

    async fn upsert_item_type(&self, item_type: &ItemType) -> DbResult<()> {
        let client = self.db.get_client().await?;
        let base = item_type.base_stats.map(|b| b.0);

        client
            .execute(
                r#"
                INSERT INTO item_types (id, name, category,
                    base_attack_power, base_attack_accuracy, base_defense_power, base_defense_accuracy,
                    reference_image_url)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    category = EXCLUDED.category,
                    base_attack_power = EXCLUDED.base_attack_power,
                    base_attack_accuracy = EXCLUDED.base_attack_accuracy,
                    base_defense_power = EXCLUDED.base_defense_power,
                    base_defense_accuracy = EXCLUDED.base_defense_accuracy,
                    reference_image_url = EXCLUDED.reference_image_url
                "#,
                &[
                    &item_type.id,
                    &item_type.name,
                    &item_type.category,
                    &base.map(|s| s.attack_power),
                    &base.map(|s| s.attack_accuracy),
                    &base.map(|s| s.defense_power),
                    &base.map(|s| s.defense_accuracy),
                    &item_type.reference_image_url,
                ],
            )
            .await?;
        Ok(())
    }

    async fn upsert_material(&self, material: &Material) -> DbResult<()> {
        let client = self.db.get_client().await?;
        let m = material.modifiers.0;

        client
            .execute(
                r#"
                INSERT INTO materials (id, name, description,
                    mod_attack_power, mod_attack_accuracy, mod_defense_power, mod_defense_accuracy)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    mod_attack_power = EXCLUDED.mod_attack_power,
                    mod_attack_accuracy = EXCLUDED.mod_attack_accuracy,
                    mod_defense_power = EXCLUDED.mod_defense_power,
                    mod_defense_accuracy = EXCLUDED.mod_defense_accuracy
                "#,
                &[
                    &material.id,
                    &material.name,
                    &material.description,
                    &m.attack_power,
                    &m.attack_accuracy,
                    &m.defense_power,
                    &m.defense_accuracy,
                ],
            )
            .await?;
        Ok(())
    }

    async fn upsert_style(&self, style: &Style) -> DbResult<()> {
        let client = self.db.get_client().await?;
        client
            .execute(
                r#"
                INSERT INTO styles (id, name, is_default) VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, is_default = EXCLUDED.is_default
                "#,
                &[&style.id, &style.name, &style.is_default],
            )
            .await?;
        Ok(())
    }

    async fn upsert_enemy_type(&self, id: EnemyTypeId, name: &str) -> DbResult<()> {
        let client = self.db.get_client().await?;
        client
            .execute(
                "INSERT INTO enemy_types (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
                &[&id, &name],
            )
            .await?;
        Ok(())
    }

    async fn set_enemy_styles(&self, enemy_type_id: EnemyTypeId, weights: &[EnemyStyleWeight]) -> DbResult<()> {
        let mut client = self.db.get_client().await?;
        let tx = client.build_transaction().start().await?;

        tx.execute(
            "DELETE FROM enemy_style_weights WHERE enemy_type_id = $1",
            &[&enemy_type_id],
        )
        .await?;

        for w in weights {
            tx.execute(
                "INSERT INTO enemy_style_weights (enemy_type_id, style_id, weight) VALUES ($1, $2, $3)",
                &[&enemy_type_id, &w.style_id, &w.weight],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
