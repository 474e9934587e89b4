use crate::db::error::DbError;
use crate::db::repo::ledger::LedgerRepo;
use crate::db::{Db, DbResult, map_rows};
use crate::models::material::{MaterialStack, ReservationLine, ReservationToken, ReserveOutcome, StackKey, merge_lines};
use crate::models::types::{MaterialId, ReservationId, StyleId, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_postgres::Row;

pub struct LedgerRepository {
    db: Arc<Db>,
}

impl LedgerRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn stack_from_row(row: &Row) -> DbResult<MaterialStack> {
    Ok(MaterialStack {
        user_id: row.try_get("user_id")?,
        material_id: row.try_get("material_id")?,
        style_id: row.try_get("style_id")?,
        quantity: row.try_get("quantity")?,
    })
}

#[async_trait::async_trait]
impl LedgerRepo for LedgerRepository {
    async fn reserve(&self, user_id: UserId, lines: &[ReservationLine]) -> DbResult<ReserveOutcome> {
        // sorted by key: concurrent reservations lock rows in the same order
        let lines = merge_lines(lines);

        let mut client = self.db.get_client().await?;
        let tx = client.build_transaction().start().await?;

        for line in &lines {
            let updated = tx
                .query_opt(
                    r#"
                    UPDATE material_stacks
                       SET quantity = quantity - $4, updated_at = NOW()
                     WHERE user_id = $1 AND material_id = $2 AND style_id = $3
                       AND quantity >= $4
                    RETURNING quantity
                    "#,
                    &[&user_id, &line.key.material_id, &line.key.style_id, &line.quantity],
                )
                .await?;

            if updated.is_none() {
                let available: i32 = tx
                    .query_opt(
                        "SELECT quantity FROM material_stacks WHERE user_id = $1 AND material_id = $2 AND style_id = $3",
                        &[&user_id, &line.key.material_id, &line.key.style_id],
                    )
                    .await?
                    .map(|r| r.get(0))
                    .unwrap_or(0);

                tx.rollback().await?;
                return Ok(ReserveOutcome::Insufficient {
                    key: line.key,
                    available,
                    requested: line.quantity,
                });
            }
        }

        let id = ReservationId::new();
        let created_at: DateTime<Utc> = tx
            .query_one(
                "INSERT INTO material_reservations (id, user_id) VALUES ($1, $2) RETURNING created_at",
                &[&id, &user_id],
            )
            .await?
            .get(0);

        for line in &lines {
            tx.execute(
                r#"
                INSERT INTO material_reservation_lines (reservation_id, material_id, style_id, quantity)
                VALUES ($1, $2, $3, $4)
                "#,
                &[&id, &line.key.material_id, &line.key.style_id, &line.quantity],
            )
            .await?;
        }

        tx.commit().await?;

        Ok(ReserveOutcome::Reserved(ReservationToken {
            id,
            user_id,
            lines,
            created_at,
        }))
    }

    async fn commit(&self, reservation_id: ReservationId) -> DbResult<bool> {
        let client = self.db.get_client().await?;
        let n = client
            .execute("DELETE FROM material_reservations WHERE id = $1", &[&reservation_id])
            .await?;
        Ok(n > 0)
    }

    async fn release(&self, reservation_id: ReservationId) -> DbResult<bool> {
        let mut client = self.db.get_client().await?;
        let tx = client.build_transaction().start().await?;

        let Some(row) = tx
            .query_opt(
                "SELECT user_id FROM material_reservations WHERE id = $1 FOR UPDATE",
                &[&reservation_id],
            )
            .await?
        else {
            tx.rollback().await?;
            return Ok(false);
        };
        let user_id: UserId = row.try_get(0)?;

        let lines = tx
            .query(
                "SELECT material_id, style_id, quantity FROM material_reservation_lines WHERE reservation_id = $1",
                &[&reservation_id],
            )
            .await?;

        for line in lines {
            let material_id: MaterialId = line.try_get(0)?;
            let style_id: StyleId = line.try_get(1)?;
            let quantity: i32 = line.try_get(2)?;

            tx.execute(
                r#"
                INSERT INTO material_stacks (user_id, material_id, style_id, quantity)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, material_id, style_id)
                DO UPDATE SET quantity = LEAST(material_stacks.quantity::BIGINT + EXCLUDED.quantity, 2147483647)::INTEGER,
                              updated_at = NOW()
                "#,
                &[&user_id, &material_id, &style_id, &quantity],
            )
            .await?;
        }

        tx.execute("DELETE FROM material_reservations WHERE id = $1", &[&reservation_id])
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn quantity(&self, user_id: UserId, key: StackKey) -> DbResult<i32> {
        let client = self.db.get_client().await?;
        let row = client
            .query_opt(
                "SELECT quantity FROM material_stacks WHERE user_id = $1 AND material_id = $2 AND style_id = $3",
                &[&user_id, &key.material_id, &key.style_id],
            )
            .await?;
        Ok(row.map(|r| r.get(0)).unwrap_or(0))
    }

    async fn stacks(&self, user_id: UserId) -> DbResult<Vec<MaterialStack>> {
        let client = self.db.get_client().await?;
        let stmt = client
            .prepare_cached(
                "SELECT user_id, material_id, style_id, quantity FROM material_stacks WHERE user_id = $1 ORDER BY material_id, style_id",
            )
            .await?;
        let rows = client.query(&stmt, &[&user_id]).await?;
        map_rows(rows, stack_from_row, &format!("LedgerRepo::stacks user={user_id}"))
    }

    async fn grant(&self, user_id: UserId, key: StackKey, quantity: i32) -> DbResult<i32> {
        let client = self.db.get_client().await?;
        // no row back means the update was skipped because the sum would overflow
        let row = client
            .query_opt(
                r#"
                INSERT INTO material_stacks (user_id, material_id, style_id, quantity)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, material_id, style_id)
                DO UPDATE SET quantity = material_stacks.quantity + EXCLUDED.quantity, updated_at = NOW()
                 WHERE material_stacks.quantity::BIGINT + EXCLUDED.quantity <= 2147483647
                RETURNING quantity
                "#,
                &[&user_id, &key.material_id, &key.style_id, &quantity],
            )
            .await?
            .ok_or(DbError::QuantityOverflow)?;
        Ok(row.try_get(0)?)
    }

    async fn release_expired(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let client = self.db.get_client().await?;
        let rows = client
            .query(
                "SELECT id FROM material_reservations WHERE created_at < $1 ORDER BY created_at",
                &[&cutoff],
            )
            .await?;
        drop(client);

        let mut released = 0;
        for row in rows {
            let id: ReservationId = row.try_get(0)?;
            if self.release(id).await? {
                released += 1;
            }
        }
        Ok(released)
    }
}
