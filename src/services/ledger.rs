use crate::db::error::DbError;
use crate::db::repo::LedgerRepo;
use crate::error::{AppResult, DomainError};
use crate::models::item::MaterialSelection;
use crate::models::material::{
    MaterialStack, ReservationLine, ReservationToken, ReserveOutcome, StackKey, try_merge_lines,
};
use crate::models::types::{ReservationId, UserId};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Per-user material inventory. Quantities only ever leave a stack through a
/// reservation, which is later committed or released exactly once.
pub struct MaterialStackLedger {
    repo: Arc<dyn LedgerRepo>,
}

impl MaterialStackLedger {
    pub fn new(repo: Arc<dyn LedgerRepo>) -> Self {
        Self { repo }
    }

    /// Atomically take the selected quantities off the user's stacks.
    /// Either every line is reserved or nothing changes.
    pub async fn reserve(&self, user_id: UserId, selections: &[MaterialSelection]) -> AppResult<ReservationToken> {
        if selections.is_empty() {
            return Err(DomainError::validation("materials", "nothing to reserve"));
        }

        let mut lines = Vec::with_capacity(selections.len());
        for sel in selections {
            if sel.quantity < 1 {
                return Err(DomainError::validation(
                    "quantity",
                    format!("must be at least 1, got {}", sel.quantity),
                ));
            }
            lines.push(ReservationLine {
                key: StackKey::new(sel.material_id, sel.style_id),
                quantity: sel.quantity,
            });
        }

        if try_merge_lines(&lines).is_none() {
            return Err(DomainError::validation("quantity", "combined quantity for one stack is too large"));
        }

        match self.repo.reserve(user_id, &lines).await? {
            ReserveOutcome::Reserved(token) => {
                tracing::debug!(user_id = %user_id, reservation_id = %token.id, lines = token.lines.len(), "materials reserved");
                Ok(token)
            }
            ReserveOutcome::Insufficient {
                key,
                available,
                requested,
            } => Err(DomainError::InsufficientMaterial {
                material_id: key.material_id,
                style_id: key.style_id,
                available,
                requested,
            }),
        }
    }

    /// Finalize a reservation. Calling it again is a no-op.
    pub async fn commit(&self, reservation_id: ReservationId) -> AppResult<()> {
        if !self.repo.commit(reservation_id).await? {
            tracing::debug!(reservation_id = %reservation_id, "reservation already finished");
        }
        Ok(())
    }

    /// Restore reserved quantities. Calling it again is a no-op.
    pub async fn release(&self, reservation_id: ReservationId) -> AppResult<()> {
        if self.repo.release(reservation_id).await? {
            tracing::debug!(reservation_id = %reservation_id, "reservation released");
        }
        Ok(())
    }

    /// Add units to a stack (loot drops, rewards, seeding)
    pub async fn grant(&self, user_id: UserId, key: StackKey, quantity: i32) -> AppResult<i32> {
        if quantity < 1 {
            return Err(DomainError::validation("quantity", "grant must be at least 1"));
        }
        match self.repo.grant(user_id, key, quantity).await {
            Ok(q) => Ok(q),
            Err(DbError::QuantityOverflow) => Err(DomainError::validation(
                "quantity",
                format!("stack cannot hold {quantity} more units"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn quantity(&self, user_id: UserId, key: StackKey) -> AppResult<i32> {
        let q = self.repo.quantity(user_id, key).await?;
        Ok(q)
    }

    pub async fn stacks(&self, user_id: UserId) -> AppResult<Vec<MaterialStack>> {
        let stacks = self.repo.stacks(user_id).await?;
        Ok(stacks)
    }

    /// Release reservations left pending by crashed or cancelled crafts
    pub async fn sweep_expired(&self, ttl: Duration) -> AppResult<u64> {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now().checked_sub_signed(ttl).unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let released = self.repo.release_expired(cutoff).await?;
        if released > 0 {
            tracing::info!(released, "released expired material reservations");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::MemoryLedgerRepository;
    use crate::models::types::{MaterialId, StyleId};

    fn selection(key: StackKey, quantity: i32) -> MaterialSelection {
        MaterialSelection {
            material_id: key.material_id,
            style_id: key.style_id,
            quantity,
        }
    }

    async fn setup() -> (Arc<MemoryLedgerRepository>, MaterialStackLedger, UserId, StackKey, StackKey) {
        let repo = Arc::new(MemoryLedgerRepository::new());
        let ledger = MaterialStackLedger::new(repo.clone());
        let user = UserId::new();
        let wood = StackKey::new(MaterialId::new(), StyleId::new());
        let iron = StackKey::new(MaterialId::new(), StyleId::new());
        ledger.grant(user, wood, 2).await.unwrap();
        ledger.grant(user, iron, 1).await.unwrap();
        (repo, ledger, user, wood, iron)
    }

    #[tokio::test]
    async fn reserve_release_restores_quantities() {
        let (repo, ledger, user, wood, iron) = setup().await;

        let token = ledger
            .reserve(user, &[selection(wood, 1), selection(iron, 1)])
            .await
            .unwrap();
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 1);
        assert_eq!(ledger.quantity(user, iron).await.unwrap(), 0);

        ledger.release(token.id).await.unwrap();
        ledger.release(token.id).await.unwrap();
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 2);
        assert_eq!(ledger.quantity(user, iron).await.unwrap(), 1);
        assert_eq!(repo.pending_count(), 0);
    }

    #[tokio::test]
    async fn commit_is_final_and_idempotent() {
        let (_repo, ledger, user, wood, _) = setup().await;

        let token = ledger.reserve(user, &[selection(wood, 2)]).await.unwrap();
        ledger.commit(token.id).await.unwrap();
        ledger.commit(token.id).await.unwrap();
        ledger.release(token.id).await.unwrap();

        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insufficient_line_reserves_nothing() {
        let (_repo, ledger, user, wood, iron) = setup().await;

        let err = ledger
            .reserve(user, &[selection(wood, 1), selection(iron, 2)])
            .await
            .unwrap_err();
        match err {
            DomainError::InsufficientMaterial {
                available, requested, ..
            } => {
                assert_eq!(available, 1);
                assert_eq!(requested, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_selections_are_summed() {
        let (_repo, ledger, user, wood, _) = setup().await;

        let err = ledger
            .reserve(user, &[selection(wood, 1), selection(wood, 1), selection(wood, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientMaterial { requested: 3, .. }));

        ledger
            .reserve(user, &[selection(wood, 1), selection(wood, 1)])
            .await
            .unwrap();
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_non_positive_quantities() {
        let (_repo, ledger, user, wood, _) = setup().await;

        assert!(matches!(
            ledger.reserve(user, &[selection(wood, 0)]).await,
            Err(DomainError::Validation { field: "quantity", .. })
        ));
        assert!(matches!(
            ledger.reserve(user, &[]).await,
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn overflowing_duplicate_selections_are_rejected() {
        let (repo, ledger, user, wood, _) = setup().await;

        let err = ledger
            .reserve(user, &[selection(wood, i32::MAX), selection(wood, i32::MAX)])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "quantity", .. }));
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 2);
        assert_eq!(repo.pending_count(), 0);
    }

    #[tokio::test]
    async fn grant_past_stack_limit_is_rejected() {
        let (_repo, ledger, user, wood, _) = setup().await;

        let err = ledger.grant(user, wood, i32::MAX).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "quantity", .. }));
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 2);

        ledger.grant(user, wood, i32::MAX - 2).await.unwrap();
        assert!(ledger.grant(user, wood, 1).await.is_err());
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), i32::MAX);
    }

    #[tokio::test]
    async fn release_saturates_instead_of_wrapping() {
        let (_repo, ledger, user, wood, _) = setup().await;

        let token = ledger.reserve(user, &[selection(wood, 2)]).await.unwrap();
        ledger.grant(user, wood, i32::MAX).await.unwrap();
        ledger.release(token.id).await.unwrap();
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), i32::MAX);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_overdraw() {
        let repo = Arc::new(MemoryLedgerRepository::new());
        let ledger = Arc::new(MaterialStackLedger::new(repo));
        let user = UserId::new();
        let wood = StackKey::new(MaterialId::new(), StyleId::new());
        ledger.grant(user, wood, 5).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(
                async move { ledger.reserve(user, &[selection(wood, 1)]).await },
            ));
        }

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DomainError::InsufficientMaterial { .. }) => {}
                Err(e) => panic!("unexpected error {e:?}"),
            }
        }

        assert_eq!(ok, 5);
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweeper_restores_stale_reservations() {
        let (repo, ledger, user, wood, _) = setup().await;

        ledger.reserve(user, &[selection(wood, 2)]).await.unwrap();
        assert_eq!(ledger.sweep_expired(Duration::from_secs(3600)).await.unwrap(), 0);

        assert_eq!(ledger.sweep_expired(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(ledger.quantity(user, wood).await.unwrap(), 2);
        assert_eq!(repo.pending_count(), 0);
    }
}
