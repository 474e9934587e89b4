use crate::db::DbResult;
use crate::db::repo::artifact::ArtifactRepo;
use crate::models::artifact::{ArtifactState, CachedArtifact, ClaimOutcome, ComboFingerprint};
use crate::models::types::ClaimId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Ephemeral artwork cache. Each fingerprint lives in its own map slot, so
/// transitions on one combo never block another.
#[derive(Default)]
pub struct MemoryArtifactRepository {
    rows: DashMap<ComboFingerprint, ArtifactState>,
}

impl MemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactRepo for MemoryArtifactRepository {
    async fn get(&self, fingerprint: &ComboFingerprint) -> DbResult<Option<ArtifactState>> {
        Ok(self.rows.get(fingerprint).map(|r| r.clone()))
    }

    async fn try_claim(
        &self,
        fingerprint: &ComboFingerprint,
        claim: ClaimId,
        stale_before: DateTime<Utc>,
    ) -> DbResult<ClaimOutcome> {
        let generating = ArtifactState::Generating {
            claim,
            claimed_at: Utc::now(),
        };

        let outcome = match self.rows.entry(fingerprint.clone()) {
            Entry::Vacant(v) => {
                v.insert(generating);
                ClaimOutcome::Claimed(claim)
            }
            Entry::Occupied(mut o) => match o.get() {
                ArtifactState::Present(artifact) => ClaimOutcome::Present(artifact.clone()),
                ArtifactState::Generating { claimed_at, .. } if *claimed_at < stale_before => {
                    o.insert(generating);
                    ClaimOutcome::Claimed(claim)
                }
                ArtifactState::Generating { .. } => ClaimOutcome::Busy,
            },
        };

        Ok(outcome)
    }

    async fn complete(
        &self,
        fingerprint: &ComboFingerprint,
        claim: ClaimId,
        image_url: &str,
    ) -> DbResult<Option<CachedArtifact>> {
        let Some(mut row) = self.rows.get_mut(fingerprint) else {
            return Ok(None);
        };

        match &*row {
            ArtifactState::Generating { claim: owner, .. } if *owner == claim => {
                let artifact = CachedArtifact {
                    fingerprint: fingerprint.clone(),
                    image_url: image_url.to_string(),
                    use_count: 1,
                    created_at: Utc::now(),
                };
                *row = ArtifactState::Present(artifact.clone());
                Ok(Some(artifact))
            }
            _ => Ok(None),
        }
    }

    async fn abandon(&self, fingerprint: &ComboFingerprint, claim: ClaimId) -> DbResult<()> {
        self.rows.remove_if(fingerprint, |_, state| {
            matches!(state, ArtifactState::Generating { claim: owner, .. } if *owner == claim)
        });
        Ok(())
    }

    async fn increment_use(&self, fingerprint: &ComboFingerprint) -> DbResult<Option<CachedArtifact>> {
        let Some(mut row) = self.rows.get_mut(fingerprint) else {
            return Ok(None);
        };

        match &mut *row {
            ArtifactState::Present(artifact) => {
                artifact.use_count += 1;
                Ok(Some(artifact.clone()))
            }
            ArtifactState::Generating { .. } => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_transitions() {
        let repo = MemoryArtifactRepository::new();
        let fp = ComboFingerprint::from_hex("00ff");
        let long_ago = Utc::now() - chrono::Duration::hours(1);

        let first = ClaimId::new();
        assert_eq!(repo.try_claim(&fp, first, long_ago).await.unwrap(), ClaimOutcome::Claimed(first));
        assert_eq!(repo.try_claim(&fp, ClaimId::new(), long_ago).await.unwrap(), ClaimOutcome::Busy);

        // a foreign claim cannot complete the row
        assert!(repo.complete(&fp, ClaimId::new(), "x").await.unwrap().is_none());

        let artifact = repo.complete(&fp, first, "https://cdn/a.png").await.unwrap().unwrap();
        assert_eq!(artifact.use_count, 1);

        match repo.try_claim(&fp, ClaimId::new(), long_ago).await.unwrap() {
            ClaimOutcome::Present(a) => assert_eq!(a.image_url, "https://cdn/a.png"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(repo.increment_use(&fp).await.unwrap().unwrap().use_count, 2);
    }

    #[tokio::test]
    async fn stale_claim_is_taken_over_and_abandon_respects_owner() {
        let repo = MemoryArtifactRepository::new();
        let fp = ComboFingerprint::from_hex("beef");

        let crashed = ClaimId::new();
        repo.try_claim(&fp, crashed, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        // everything claimed before "now + 1s" counts as stale
        let rescuer = ClaimId::new();
        let outcome = repo
            .try_claim(&fp, rescuer, Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed(rescuer));

        repo.abandon(&fp, crashed).await.unwrap();
        assert!(matches!(
            repo.get(&fp).await.unwrap(),
            Some(ArtifactState::Generating { claim, .. }) if claim == rescuer
        ));

        repo.abandon(&fp, rescuer).await.unwrap();
        assert!(repo.get(&fp).await.unwrap().is_none());
    }
}
