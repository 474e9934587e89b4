use crate::db::error::DbError;
use crate::db::repo::artifact::ArtifactRepo;
use crate::db::{Db, DbResult, map_row_opt};
use crate::models::artifact::{ArtifactState, CachedArtifact, ClaimOutcome, ComboFingerprint};
use crate::models::types::ClaimId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_postgres::Row;

pub struct ArtifactRepository {
    db: Arc<Db>,
}

impl ArtifactRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn artifact_from_row(row: &Row) -> DbResult<CachedArtifact> {
    let fingerprint: String = row.try_get("fingerprint")?;
    let image_url: Option<String> = row.try_get("image_url")?;

    Ok(CachedArtifact {
        fingerprint: ComboFingerprint::from_hex(fingerprint),
        image_url: image_url.ok_or_else(|| DbError::Decode("present artifact without image_url".into()))?,
        use_count: row.try_get("use_count")?,
        created_at: row.try_get("created_at")?,
    })
}

fn state_from_row(row: &Row) -> DbResult<ArtifactState> {
    let state: String = row.try_get("state")?;
    match state.as_str() {
        "present" => Ok(ArtifactState::Present(artifact_from_row(row)?)),
        "generating" => {
            let claim: Option<ClaimId> = row.try_get("claim_token")?;
            let claimed_at: Option<DateTime<Utc>> = row.try_get("claimed_at")?;
            match (claim, claimed_at) {
                (Some(claim), Some(claimed_at)) => Ok(ArtifactState::Generating { claim, claimed_at }),
                _ => Err(DbError::Decode("generating artifact without claim".into())),
            }
        }
        other => Err(DbError::Decode(format!("unknown artifact state '{other}'"))),
    }
}

const ARTIFACT_COLUMNS: &str = "fingerprint, state, image_url, use_count, claim_token, claimed_at, created_at";

#[async_trait::async_trait]
impl ArtifactRepo for ArtifactRepository {
    async fn get(&self, fingerprint: &ComboFingerprint) -> DbResult<Option<ArtifactState>> {
        let client = self.db.get_client().await?;
        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM combo_artifacts WHERE fingerprint = $1");
        let row = client.query_opt(&sql, &[&fingerprint.as_str()]).await?;
        map_row_opt(row, state_from_row, &format!("ArtifactRepo::get fingerprint={fingerprint}"))
    }

    async fn try_claim(
        &self,
        fingerprint: &ComboFingerprint,
        claim: ClaimId,
        stale_before: DateTime<Utc>,
    ) -> DbResult<ClaimOutcome> {
        let client = self.db.get_client().await?;

        // Insert wins on an empty slot; the conditional update only fires for abandoned claims.
        let claimed = client
            .query_opt(
                r#"
                INSERT INTO combo_artifacts (fingerprint, state, claim_token, claimed_at)
                VALUES ($1, 'generating', $2, NOW())
                ON CONFLICT (fingerprint) DO UPDATE
                    SET claim_token = EXCLUDED.claim_token, claimed_at = EXCLUDED.claimed_at
                  WHERE combo_artifacts.state = 'generating'
                    AND combo_artifacts.claimed_at < $3
                RETURNING claim_token
                "#,
                &[&fingerprint.as_str(), &claim, &stale_before],
            )
            .await?;

        if claimed.is_some() {
            return Ok(ClaimOutcome::Claimed(claim));
        }

        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM combo_artifacts WHERE fingerprint = $1");
        let row = client.query_opt(&sql, &[&fingerprint.as_str()]).await?;
        match map_row_opt(row, state_from_row, "ArtifactRepo::try_claim")? {
            Some(ArtifactState::Present(artifact)) => Ok(ClaimOutcome::Present(artifact)),
            // either live elsewhere or abandoned between the two statements; caller polls again
            Some(ArtifactState::Generating { .. }) | None => Ok(ClaimOutcome::Busy),
        }
    }

    async fn complete(
        &self,
        fingerprint: &ComboFingerprint,
        claim: ClaimId,
        image_url: &str,
    ) -> DbResult<Option<CachedArtifact>> {
        let client = self.db.get_client().await?;
        let sql = format!(
            r#"
            UPDATE combo_artifacts
               SET state = 'present', image_url = $3, use_count = 1,
                   claim_token = NULL, claimed_at = NULL, created_at = NOW()
             WHERE fingerprint = $1 AND state = 'generating' AND claim_token = $2
            RETURNING {ARTIFACT_COLUMNS}
            "#
        );
        let row = client.query_opt(&sql, &[&fingerprint.as_str(), &claim, &image_url]).await?;
        map_row_opt(row, artifact_from_row, "ArtifactRepo::complete")
    }

    async fn abandon(&self, fingerprint: &ComboFingerprint, claim: ClaimId) -> DbResult<()> {
        let client = self.db.get_client().await?;
        client
            .execute(
                "DELETE FROM combo_artifacts WHERE fingerprint = $1 AND state = 'generating' AND claim_token = $2",
                &[&fingerprint.as_str(), &claim],
            )
            .await?;
        Ok(())
    }

    async fn increment_use(&self, fingerprint: &ComboFingerprint) -> DbResult<Option<CachedArtifact>> {
        let client = self.db.get_client().await?;
        let sql = format!(
            r#"
            UPDATE combo_artifacts
               SET use_count = use_count + 1
             WHERE fingerprint = $1 AND state = 'present'
            RETURNING {ARTIFACT_COLUMNS}
            "#
        );
        let row = client.query_opt(&sql, &[&fingerprint.as_str()]).await?;
        map_row_opt(row, artifact_from_row, "ArtifactRepo::increment_use")
    }
}
