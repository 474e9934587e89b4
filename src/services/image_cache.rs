use crate::config::CraftingConfig;
use crate::db::repo::ArtifactRepo;
use crate::error::{AppResult, DomainError};
use crate::models::artifact::{ArtifactState, CachedArtifact, ClaimOutcome, ComboFingerprint};
use crate::models::types::ClaimId;
use crate::services::generator::GenerationError;
use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Result of resolving a fingerprint to artwork
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub artifact: CachedArtifact,
    /// True when this call generated the artwork (first use of the combo)
    pub created: bool,
}

/// How an in-process generation flight ended, as seen by everybody waiting on it
#[derive(Debug, Clone)]
enum FlightOutcome {
    /// The flight generated the artwork; `use_count = 1` belongs to its leader
    Created(CachedArtifact),
    /// The artwork turned out to exist already
    Present,
    /// Another process holds the claim
    Busy,
    Failed(FlightError),
}

#[derive(Debug, Clone)]
enum FlightError {
    Timeout(Duration),
    Provider(String),
    Store(String),
}

type FlightRx = watch::Receiver<Option<FlightOutcome>>;

/// Registered in-process flight; `claim` doubles as the flight identity
#[derive(Clone)]
struct InFlight {
    claim: ClaimId,
    rx: FlightRx,
}

/// Content addressed artwork cache with at most one concurrent generation per
/// fingerprint.
///
/// Persisted state per fingerprint is `absent -> generating -> present`
/// (see [`ArtifactRepo`]). Inside one process concurrent callers for the same
/// fingerprint share a single flight: one leader task claims the row and calls
/// the generator, the others wait on a watch channel. Callers in other
/// processes see the `generating` row and poll until it turns present.
///
/// The flight runs on its own task, so it completes and populates the cache
/// even if every caller gave up waiting.
pub struct ImageCacheStore {
    repo: Arc<dyn ArtifactRepo>,
    inflight: Arc<DashMap<ComboFingerprint, InFlight>>,
    generation_timeout: Duration,
    wait_timeout: Duration,
    claim_ttl: Duration,
    poll_interval: Duration,
}

impl ImageCacheStore {
    pub fn new(repo: Arc<dyn ArtifactRepo>, cfg: &CraftingConfig) -> Self {
        Self {
            repo,
            inflight: Arc::new(DashMap::new()),
            generation_timeout: cfg.generation_timeout(),
            wait_timeout: cfg.wait_timeout(),
            claim_ttl: cfg.claim_ttl(),
            poll_interval: cfg.poll_interval(),
        }
    }

    /// Cached artwork without touching the use counter
    pub async fn peek(&self, fingerprint: &ComboFingerprint) -> AppResult<Option<CachedArtifact>> {
        match self.repo.get(fingerprint).await? {
            Some(ArtifactState::Present(artifact)) => Ok(Some(artifact)),
            _ => Ok(None),
        }
    }

    /// Resolve `fingerprint` to artwork, generating it with `generate` on a
    /// miss. Every successful call counts as exactly one use.
    #[tracing::instrument(skip(self, generate), fields(fingerprint = %fingerprint.short()))]
    pub async fn resolve<F, Fut>(&self, fingerprint: &ComboFingerprint, generate: F) -> AppResult<Resolution>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, GenerationError>> + Send + 'static,
    {
        if let Some(artifact) = self.repo.increment_use(fingerprint).await? {
            tracing::debug!(use_count = artifact.use_count, "artwork cache hit");
            return Ok(Resolution {
                artifact,
                created: false,
            });
        }

        let deadline = Instant::now() + self.wait_timeout;
        let (mut rx, leader) = self.join_or_lead(fingerprint, generate);

        let outcome = match tokio::time::timeout_at(deadline, rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => value.clone(),
            Ok(Err(_)) => Some(FlightOutcome::Failed(FlightError::Store("generation task vanished".into()))),
            Err(_) => {
                tracing::info!("gave up waiting for artwork generation");
                return Err(DomainError::GenerationInProgress(fingerprint.clone()));
            }
        };

        match outcome {
            Some(FlightOutcome::Created(artifact)) if leader => Ok(Resolution {
                artifact,
                created: true,
            }),
            Some(FlightOutcome::Created(_)) | Some(FlightOutcome::Present) => self.count_use(fingerprint).await,
            Some(FlightOutcome::Busy) => self.poll_foreign(fingerprint, deadline).await,
            Some(FlightOutcome::Failed(e)) => Err(e.into_domain(fingerprint)),
            None => Err(DomainError::GenerationInProgress(fingerprint.clone())),
        }
    }

    /// Join the running flight for `fingerprint` or start one
    fn join_or_lead<F, Fut>(&self, fingerprint: &ComboFingerprint, generate: F) -> (FlightRx, bool)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, GenerationError>> + Send + 'static,
    {
        let claim = ClaimId::new();
        let (tx, rx) = match self.inflight.entry(fingerprint.clone()) {
            Entry::Occupied(o) => return (o.get().rx.clone(), false),
            Entry::Vacant(v) => {
                let (tx, rx) = watch::channel(None);
                let _ = v.insert(InFlight { claim, rx: rx.clone() });
                (tx, rx)
            }
        };

        let flight = Flight {
            repo: self.repo.clone(),
            inflight: self.inflight.clone(),
            fingerprint: fingerprint.clone(),
            claim,
            generation_timeout: self.generation_timeout,
            claim_ttl: self.claim_ttl,
        };
        tokio::spawn(flight.run(tx, generate));

        (rx, true)
    }

    async fn count_use(&self, fingerprint: &ComboFingerprint) -> AppResult<Resolution> {
        match self.repo.increment_use(fingerprint).await? {
            Some(artifact) => Ok(Resolution {
                artifact,
                created: false,
            }),
            None => Err(DomainError::GenerationProvider(format!(
                "artwork for {fingerprint} disappeared after generation"
            ))),
        }
    }

    /// Wait for a generation owned by another process
    async fn poll_foreign(&self, fingerprint: &ComboFingerprint, deadline: Instant) -> AppResult<Resolution> {
        tracing::debug!("artwork is being generated elsewhere, polling");
        loop {
            let next = Instant::now() + self.poll_interval;
            if next >= deadline {
                tokio::time::sleep_until(deadline).await;
            } else {
                tokio::time::sleep_until(next).await;
            }

            match self.repo.get(fingerprint).await? {
                Some(ArtifactState::Present(_)) => return self.count_use(fingerprint).await,
                Some(ArtifactState::Generating { .. }) if Instant::now() < deadline => continue,
                Some(ArtifactState::Generating { .. }) => {
                    return Err(DomainError::GenerationInProgress(fingerprint.clone()));
                }
                None => {
                    return Err(DomainError::GenerationProvider(
                        "concurrent artwork generation failed".into(),
                    ));
                }
            }
        }
    }
}

impl FlightError {
    fn into_domain(self, fingerprint: &ComboFingerprint) -> DomainError {
        match self {
            FlightError::Timeout(after) => DomainError::GenerationTimeout {
                fingerprint: fingerprint.clone(),
                after,
            },
            FlightError::Provider(msg) => DomainError::GenerationProvider(msg),
            FlightError::Store(msg) => DomainError::GenerationProvider(format!("artwork cache unavailable: {msg}")),
        }
    }
}

/// One leader-owned generation attempt
struct Flight {
    repo: Arc<dyn ArtifactRepo>,
    inflight: Arc<DashMap<ComboFingerprint, InFlight>>,
    fingerprint: ComboFingerprint,
    claim: ClaimId,
    generation_timeout: Duration,
    claim_ttl: Duration,
}

impl Flight {
    async fn run<F, Fut>(self, tx: watch::Sender<Option<FlightOutcome>>, generate: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, GenerationError>> + Send + 'static,
    {
        let outcome = self.claim_and_generate(generate).await;

        // Unregister before publishing, so late arrivals start a fresh flight
        // instead of inheriting a failure.
        self.inflight
            .remove_if(&self.fingerprint, |_, f| f.claim == self.claim);
        let _ = tx.send(Some(outcome));
    }

    async fn claim_and_generate<F, Fut>(&self, generate: F) -> FlightOutcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, GenerationError>> + Send + 'static,
    {
        let ttl = TimeDelta::from_std(self.claim_ttl).unwrap_or_else(|_| TimeDelta::days(1));
        let stale_before = Utc::now() - ttl;

        match self.repo.try_claim(&self.fingerprint, self.claim, stale_before).await {
            Err(e) => {
                tracing::error!(error = %e, fingerprint = %self.fingerprint, "failed to claim artwork generation");
                FlightOutcome::Failed(FlightError::Store(e.to_string()))
            }
            Ok(ClaimOutcome::Present(_)) => FlightOutcome::Present,
            Ok(ClaimOutcome::Busy) => FlightOutcome::Busy,
            Ok(ClaimOutcome::Claimed(claim)) => self.generate(claim, generate).await,
        }
    }

    async fn generate<F, Fut>(&self, claim: ClaimId, generate: F) -> FlightOutcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, GenerationError>> + Send + 'static,
    {
        let fp = &self.fingerprint;
        let started = Instant::now();
        tracing::info!(fingerprint = %fp, "generating artwork");

        let failure = match tokio::time::timeout(self.generation_timeout, generate()).await {
            Ok(Ok(url)) => match self.repo.complete(fp, claim, &url).await {
                Ok(Some(artifact)) => {
                    tracing::info!(
                        fingerprint = %fp,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "artwork generated"
                    );
                    return FlightOutcome::Created(artifact);
                }
                Ok(None) => {
                    // our claim expired and somebody else took over
                    tracing::warn!(fingerprint = %fp, "artwork claim lost before completion");
                    return FlightOutcome::Busy;
                }
                Err(e) => FlightError::Store(e.to_string()),
            },
            Ok(Err(e)) => FlightError::Provider(e.to_string()),
            Err(_) => FlightError::Timeout(self.generation_timeout),
        };

        tracing::warn!(fingerprint = %fp, error = ?failure, "artwork generation failed, releasing claim");
        if let Err(e) = self.repo.abandon(fp, claim).await {
            tracing::error!(error = %e, fingerprint = %fp, "failed to release artwork claim");
        }
        FlightOutcome::Failed(failure)
    }
}
