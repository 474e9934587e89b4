use crate::db::error::DbError;
use crate::models::artifact::ComboFingerprint;
use crate::models::types::{ItemId, MaterialId, StyleId};
use std::time::Duration;
use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Bad input shape, slot overflow and friends. Never retried.
    #[error("validation failed: {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Item belongs to somebody else
    #[error("permission denied")]
    PermissionDenied,

    #[error("not found: {0}")]
    NotFound(String),

    /// Not enough units on a stack
    #[error("insufficient material {material_id}/{style_id}: have {available}, need {requested}")]
    InsufficientMaterial {
        material_id: MaterialId,
        style_id: StyleId,
        available: i32,
        requested: i32,
    },

    #[error("artwork generation for {fingerprint} timed out after {after:?}")]
    GenerationTimeout {
        fingerprint: ComboFingerprint,
        after: Duration,
    },

    #[error("artwork generation failed: {0}")]
    GenerationProvider(String),

    /// Another request is generating this combo and we stopped waiting
    #[error("artwork for {0} is still being generated, try again later")]
    GenerationInProgress(ComboFingerprint),

    /// Seed data is broken (missing base stats, unknown material template, empty style table)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A second craft on the same item while one is in flight
    #[error("item {0} is busy, try again")]
    ConcurrencyConflict(ItemId),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl DomainError {
    /// Whether resubmitting the identical request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::GenerationTimeout { .. }
                | DomainError::GenerationProvider(_)
                | DomainError::GenerationInProgress(_)
                | DomainError::ConcurrencyConflict(_)
        )
    }

    /// Stable machine readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation { .. } => "validation",
            DomainError::PermissionDenied => "permission_denied",
            DomainError::NotFound(_) => "not_found",
            DomainError::InsufficientMaterial { .. } => "insufficient_material",
            DomainError::GenerationTimeout { .. } => "generation_timeout",
            DomainError::GenerationProvider(_) => "generation_failed",
            DomainError::GenerationInProgress(_) => "generation_in_progress",
            DomainError::Configuration(_) => "configuration",
            DomainError::ConcurrencyConflict(_) => "concurrency_conflict",
            DomainError::Db(_) | DomainError::Infra(_) => "internal",
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("failed to read file: {0}")]
    Read(std::io::Error),

    #[error("failed to parse file: {0}")]
    Parse(toml::de::Error),

    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(String, String),
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: std::path::PathBuf,
        #[source]
        source: ConfigErrorKind,
    },

    #[error("configuration: {0}")]
    Env(#[source] ConfigErrorKind),

    #[error("network issue: {0}")]
    Net(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
