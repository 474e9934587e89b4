use crate::db::DbResult;
use crate::db::error::DbError;
use crate::db::repo::ledger::LedgerRepo;
use crate::models::material::{MaterialStack, ReservationLine, ReservationToken, ReserveOutcome, StackKey, merge_lines};
use crate::models::types::{ReservationId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type UserStacks = Arc<Mutex<HashMap<StackKey, i32>>>;

/// Ephemeral ledger. Stacks are locked per user, so crafts of different users
/// never contend.
#[derive(Default)]
pub struct MemoryLedgerRepository {
    users: DashMap<UserId, UserStacks>,
    pending: DashMap<ReservationId, ReservationToken>,
}

impl MemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn user(&self, id: UserId) -> UserStacks {
        self.users.entry(id).or_default().clone()
    }

    /// Drop a pending reservation without touching quantities
    pub(crate) fn finalize(&self, reservation_id: ReservationId) -> bool {
        self.pending.remove(&reservation_id).is_some()
    }

    /// Number of reservations neither committed nor released
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl LedgerRepo for MemoryLedgerRepository {
    async fn reserve(&self, user_id: UserId, lines: &[ReservationLine]) -> DbResult<ReserveOutcome> {
        let lines = merge_lines(lines);
        let stacks = self.user(user_id);
        let mut stacks = stacks.lock();

        for line in &lines {
            let available = stacks.get(&line.key).copied().unwrap_or(0);
            if available < line.quantity {
                return Ok(ReserveOutcome::Insufficient {
                    key: line.key,
                    available,
                    requested: line.quantity,
                });
            }
        }

        for line in &lines {
            if let Some(q) = stacks.get_mut(&line.key) {
                *q -= line.quantity;
            }
        }

        let token = ReservationToken {
            id: ReservationId::new(),
            user_id,
            lines,
            created_at: Utc::now(),
        };
        self.pending.insert(token.id, token.clone());

        Ok(ReserveOutcome::Reserved(token))
    }

    async fn commit(&self, reservation_id: ReservationId) -> DbResult<bool> {
        Ok(self.finalize(reservation_id))
    }

    async fn release(&self, reservation_id: ReservationId) -> DbResult<bool> {
        // whoever removes the pending entry owns the restore
        let Some((_, token)) = self.pending.remove(&reservation_id) else {
            return Ok(false);
        };

        let stacks = self.user(token.user_id);
        let mut stacks = stacks.lock();
        for line in &token.lines {
            let q = stacks.entry(line.key).or_insert(0);
            *q = q.saturating_add(line.quantity);
        }

        Ok(true)
    }

    async fn quantity(&self, user_id: UserId, key: StackKey) -> DbResult<i32> {
        let q = self
            .users
            .get(&user_id)
            .and_then(|s| s.lock().get(&key).copied())
            .unwrap_or(0);
        Ok(q)
    }

    async fn stacks(&self, user_id: UserId) -> DbResult<Vec<MaterialStack>> {
        let Some(stacks) = self.users.get(&user_id).map(|s| s.clone()) else {
            return Ok(Vec::new());
        };

        let mut out: Vec<MaterialStack> = stacks
            .lock()
            .iter()
            .map(|(key, quantity)| MaterialStack {
                user_id,
                material_id: key.material_id,
                style_id: key.style_id,
                quantity: *quantity,
            })
            .collect();
        out.sort_by_key(|s| (s.material_id, s.style_id));
        Ok(out)
    }

    async fn grant(&self, user_id: UserId, key: StackKey, quantity: i32) -> DbResult<i32> {
        let stacks = self.user(user_id);
        let mut stacks = stacks.lock();
        let q = stacks.entry(key).or_insert(0);
        *q = q.checked_add(quantity).ok_or(DbError::QuantityOverflow)?;
        Ok(*q)
    }

    async fn release_expired(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let expired: Vec<ReservationId> = self
            .pending
            .iter()
            .filter(|r| r.created_at < cutoff)
            .map(|r| *r.key())
            .collect();

        let mut released = 0;
        for id in expired {
            if self.release(id).await? {
                released += 1;
            }
        }
        Ok(released)
    }
}
