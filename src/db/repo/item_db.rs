use crate::db::error::DbError;
use crate::db::repo::item::ItemRepo;
use crate::db::{Db, DbResult};
use crate::models::item::{CraftWrite, ItemInstance, MaterialApplication};
use crate::models::stats::Stats;
use crate::models::types::{ItemId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

const ITEM_COLUMNS: &str = r#"
    id, owner_id, item_type_id, level, is_styled, image_url,
    attack_power, attack_accuracy, defense_power, defense_accuracy,
    version, created_at, updated_at
"#;

pub struct ItemRepository {
    db: Arc<Db>,
}

impl ItemRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn item_from_row(row: &Row, applied: Vec<MaterialApplication>) -> DbResult<ItemInstance> {
    Ok(ItemInstance {
        id: row.try_get("id")?,
        owner: row.try_get("owner_id")?,
        item_type_id: row.try_get("item_type_id")?,
        level: row.try_get("level")?,
        applied,
        is_styled: row.try_get("is_styled")?,
        image_url: row.try_get("image_url")?,
        stats: Stats {
            attack_power: row.try_get("attack_power")?,
            attack_accuracy: row.try_get("attack_accuracy")?,
            defense_power: row.try_get("defense_power")?,
            defense_accuracy: row.try_get("defense_accuracy")?,
        },
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn application_from_row(row: &Row) -> DbResult<MaterialApplication> {
    Ok(MaterialApplication {
        material_id: row.try_get("material_id")?,
        style_id: row.try_get("style_id")?,
        slot_index: row.try_get("slot_index")?,
        applied_at: row.try_get("applied_at")?,
    })
}

/// Load applications for a set of items, keyed by item and ordered by slot
async fn load_applications<C>(client: &C, ids: &[ItemId]) -> DbResult<HashMap<ItemId, Vec<MaterialApplication>>>
where
    C: tokio_postgres::GenericClient + Sync,
{
    let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.0).collect();
    let rows = client
        .query(
            r#"
            SELECT item_id, material_id, style_id, slot_index, applied_at
            FROM item_materials
            WHERE item_id = ANY($1)
            ORDER BY item_id, slot_index
            "#,
            &[&ids],
        )
        .await?;

    let mut out: HashMap<ItemId, Vec<MaterialApplication>> = HashMap::new();
    for row in &rows {
        let item_id: ItemId = row.try_get("item_id")?;
        out.entry(item_id).or_default().push(application_from_row(row)?);
    }
    Ok(out)
}

#[async_trait::async_trait]
impl ItemRepo for ItemRepository {
    async fn get(&self, item_id: ItemId) -> DbResult<Option<ItemInstance>> {
        let client = self.db.get_client().await?;

        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        let Some(row) = client.query_opt(&sql, &[&item_id]).await? else {
            return Ok(None);
        };

        let mut applied = load_applications(&**client, &[item_id]).await?;
        let item = item_from_row(&row, applied.remove(&item_id).unwrap_or_default()).inspect_err(|e| {
            tracing::error!(error = %e, %item_id, "row mapping failed in ItemRepo::get");
        })?;
        Ok(Some(item))
    }

    async fn list_for_owner(&self, owner: UserId) -> DbResult<Vec<ItemInstance>> {
        let client = self.db.get_client().await?;

        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE owner_id = $1 ORDER BY created_at");
        let rows = client.query(&sql, &[&owner]).await?;

        let ids = rows
            .iter()
            .map(|r| r.try_get::<_, ItemId>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut applied = load_applications(&**client, &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| item_from_row(row, applied.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn create(&self, item: &ItemInstance) -> DbResult<()> {
        let client = self.db.get_client().await?;

        let params: [&(dyn ToSql + Sync); 13] = [
            &item.id,
            &item.owner,
            &item.item_type_id,
            &item.level,
            &item.is_styled,
            &item.image_url,
            &item.stats.attack_power,
            &item.stats.attack_accuracy,
            &item.stats.defense_power,
            &item.stats.defense_accuracy,
            &item.version,
            &item.created_at,
            &item.updated_at,
        ];

        let sql = format!(
            "INSERT INTO items ({ITEM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        client.execute(&sql, &params).await.map_err(|e| {
            if e.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
                DbError::UniqueViolation
            } else {
                DbError::Pg(e)
            }
        })?;

        Ok(())
    }

    async fn persist_craft(&self, write: &CraftWrite) -> DbResult<ItemInstance> {
        let mut client = self.db.get_client().await?;
        let tx = client.build_transaction().start().await?;

        let sql = format!(
            r#"
            UPDATE items
               SET attack_power = $2, attack_accuracy = $3, defense_power = $4, defense_accuracy = $5,
                   image_url = $6, is_styled = $7, version = version + 1, updated_at = NOW()
             WHERE id = $1 AND version = $8
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let updated = tx
            .query_opt(
                &sql,
                &[
                    &write.item_id,
                    &write.stats.attack_power,
                    &write.stats.attack_accuracy,
                    &write.stats.defense_power,
                    &write.stats.defense_accuracy,
                    &write.image_url,
                    &write.is_styled,
                    &write.expected_version,
                ],
            )
            .await?;

        let Some(row) = updated else {
            let exists: bool = tx
                .query_one("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)", &[&write.item_id])
                .await?
                .get(0);
            tx.rollback().await?;
            return Err(if exists { DbError::VersionConflict } else { DbError::NotFound });
        };

        for app in &write.new_applications {
            tx.execute(
                r#"
                INSERT INTO item_materials (item_id, slot_index, material_id, style_id, applied_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
                &[&write.item_id, &app.slot_index, &app.material_id, &app.style_id, &app.applied_at],
            )
            .await?;
        }

        let finalized = tx
            .execute("DELETE FROM material_reservations WHERE id = $1", &[&write.reservation_id])
            .await?;
        if finalized == 0 {
            tx.rollback().await?;
            return Err(DbError::StaleReservation);
        }

        let mut applied = load_applications(&*tx, &[write.item_id]).await?;
        let item = item_from_row(&row, applied.remove(&write.item_id).unwrap_or_default())?;

        tx.commit().await?;
        Ok(item)
    }

    async fn update_level(
        &self,
        item_id: ItemId,
        expected_version: i64,
        level: i32,
        stats: Stats,
    ) -> DbResult<ItemInstance> {
        let client = self.db.get_client().await?;

        let sql = format!(
            r#"
            UPDATE items
               SET level = $2, attack_power = $3, attack_accuracy = $4, defense_power = $5, defense_accuracy = $6,
                   version = version + 1, updated_at = NOW()
             WHERE id = $1 AND version = $7
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = client
            .query_opt(
                &sql,
                &[
                    &item_id,
                    &level,
                    &stats.attack_power,
                    &stats.attack_accuracy,
                    &stats.defense_power,
                    &stats.defense_accuracy,
                    &expected_version,
                ],
            )
            .await?
            .ok_or(DbError::VersionConflict)?;

        let mut applied = load_applications(&**client, &[item_id]).await?;
        item_from_row(&row, applied.remove(&item_id).unwrap_or_default())
    }
}
