use crate::config::Config;
use crate::db::Db;
use crate::db::repo::{ArtifactRepo, ArtifactRepository, MemoryArtifactRepository};
use crate::db::repo::{CatalogRepo, CatalogRepository, MemoryCatalogRepository};
use crate::db::repo::{ItemRepo, ItemRepository, MemoryItemRepository};
use crate::db::repo::{LedgerRepo, LedgerRepository, MemoryLedgerRepository};
use crate::services::{
    CraftingOrchestrator, EnemyStyleSelector, ImageCacheStore, ImageGenerator, ItemService, MaterialStackLedger,
};
use std::sync::Arc;

pub struct Repos {
    pub item: Arc<dyn ItemRepo>,
    pub ledger: Arc<dyn LedgerRepo>,
    pub artifact: Arc<dyn ArtifactRepo>,
    pub catalog: Arc<dyn CatalogRepo>,
}

pub struct Services {
    pub crafting: Arc<CraftingOrchestrator>,
    pub ledger: Arc<MaterialStackLedger>,
    pub cache: Arc<ImageCacheStore>,
    pub item: Arc<ItemService>,
    pub enemy_style: Arc<EnemyStyleSelector>,
}

/// Wiring of repositories and services shared by every request
pub struct Registry {
    /// None when running against the in-memory stores
    pub db: Option<Arc<Db>>,
    pub repos: Arc<Repos>,
    pub services: Arc<Services>,
    pub config: Arc<Config>,
}

impl Registry {
    pub fn new(db: Arc<Db>, config: Arc<Config>, generator: Arc<dyn ImageGenerator>) -> Self {
        let repos = Repos {
            item: Arc::new(ItemRepository::new(db.clone())),
            ledger: Arc::new(LedgerRepository::new(db.clone())),
            artifact: Arc::new(ArtifactRepository::new(db.clone())),
            catalog: Arc::new(CatalogRepository::new(db.clone())),
        };

        Self::build(Some(db), repos, config, generator)
    }

    /// Everything in process memory. Used by tests and `--in-memory` runs.
    pub fn in_memory(config: Arc<Config>, generator: Arc<dyn ImageGenerator>) -> Self {
        let ledger = Arc::new(MemoryLedgerRepository::new());
        let repos = Repos {
            item: Arc::new(MemoryItemRepository::new(ledger.clone())),
            ledger,
            artifact: Arc::new(MemoryArtifactRepository::new()),
            catalog: Arc::new(MemoryCatalogRepository::new()),
        };

        Self::build(None, repos, config, generator)
    }

    fn build(db: Option<Arc<Db>>, repos: Repos, config: Arc<Config>, generator: Arc<dyn ImageGenerator>) -> Self {
        let ledger = Arc::new(MaterialStackLedger::new(repos.ledger.clone()));
        let cache = Arc::new(ImageCacheStore::new(repos.artifact.clone(), &config.crafting));

        let crafting = Arc::new(CraftingOrchestrator::new(
            repos.item.clone(),
            repos.catalog.clone(),
            ledger.clone(),
            cache.clone(),
            generator,
        ));

        let services = Arc::new(Services {
            crafting,
            ledger,
            cache,
            item: Arc::new(ItemService::new(repos.item.clone(), repos.catalog.clone())),
            enemy_style: Arc::new(EnemyStyleSelector::new(repos.catalog.clone())),
        });

        Self {
            db,
            repos: Arc::new(repos),
            services,
            config,
        }
    }
}
