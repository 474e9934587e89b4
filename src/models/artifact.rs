use crate::models::types::ClaimId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content address of a material combination on an item type.
/// Hex-encoded SHA-256 of the canonical combo string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComboFingerprint(String);

impl ComboFingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ComboFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generated artwork shared by every item carrying the same combo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub fingerprint: ComboFingerprint,
    pub image_url: String,
    pub use_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Persisted state of a fingerprint row. Absent rows have no state.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactState {
    Generating { claim: ClaimId, claimed_at: DateTime<Utc> },
    Present(CachedArtifact),
}

/// Outcome of trying to move a fingerprint from absent to generating
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// Caller is now the sole generator
    Claimed(ClaimId),
    /// Somebody else holds a live claim
    Busy,
    /// Artifact already exists
    Present(CachedArtifact),
}
