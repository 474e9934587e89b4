use crate::db::DbResult;
use crate::models::material::{MaterialStack, ReservationLine, ReserveOutcome, StackKey};
use crate::models::types::{ReservationId, UserId};
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait LedgerRepo: Send + Sync {
    /// Take all lines off the user's stacks or none of them
    async fn reserve(&self, user_id: UserId, lines: &[ReservationLine]) -> DbResult<ReserveOutcome>;

    /// Finalize a reservation. Returns false when it was already finished.
    async fn commit(&self, reservation_id: ReservationId) -> DbResult<bool>;

    /// Put reserved quantities back. Returns false when it was already finished.
    async fn release(&self, reservation_id: ReservationId) -> DbResult<bool>;

    /// Current quantity, 0 for a missing stack
    async fn quantity(&self, user_id: UserId, key: StackKey) -> DbResult<i32>;

    async fn stacks(&self, user_id: UserId) -> DbResult<Vec<MaterialStack>>;

    /// Add units to a stack, creating it if needed. Returns the new quantity.
    async fn grant(&self, user_id: UserId, key: StackKey, quantity: i32) -> DbResult<i32>;

    /// Release every pending reservation created before `cutoff`
    async fn release_expired(&self, cutoff: DateTime<Utc>) -> DbResult<u64>;
}
