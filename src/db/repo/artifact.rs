use crate::db::DbResult;
use crate::models::artifact::{ArtifactState, CachedArtifact, ClaimOutcome, ComboFingerprint};
use crate::models::types::ClaimId;
use chrono::{DateTime, Utc};

/// Row level state of the artwork cache. Every transition is a single atomic
/// statement against one fingerprint.
#[async_trait::async_trait]
pub trait ArtifactRepo: Send + Sync {
    async fn get(&self, fingerprint: &ComboFingerprint) -> DbResult<Option<ArtifactState>>;

    /// absent -> generating. A claim made before `stale_before` is taken over.
    async fn try_claim(
        &self,
        fingerprint: &ComboFingerprint,
        claim: ClaimId,
        stale_before: DateTime<Utc>,
    ) -> DbResult<ClaimOutcome>;

    /// generating -> present with `use_count = 1`. Returns None when `claim`
    /// no longer owns the row.
    async fn complete(
        &self,
        fingerprint: &ComboFingerprint,
        claim: ClaimId,
        image_url: &str,
    ) -> DbResult<Option<CachedArtifact>>;

    /// generating -> absent, only if `claim` still owns the row
    async fn abandon(&self, fingerprint: &ComboFingerprint, claim: ClaimId) -> DbResult<()>;

    /// present: use_count + 1. None when the artifact is not present.
    async fn increment_use(&self, fingerprint: &ComboFingerprint) -> DbResult<Option<CachedArtifact>>;
}
