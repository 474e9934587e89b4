mod artifact;
mod artifact_db;
mod artifact_mem;
mod catalog;
mod catalog_db;
mod catalog_mem;
mod item;
mod item_db;
mod item_mem;
mod ledger;
mod ledger_db;
mod ledger_mem;

pub use artifact_db::ArtifactRepository;
pub use catalog_db::CatalogRepository;
pub use item_db::ItemRepository;
pub use ledger_db::LedgerRepository;

pub use artifact_mem::MemoryArtifactRepository;
pub use catalog_mem::MemoryCatalogRepository;
pub use item_mem::MemoryItemRepository;
pub use ledger_mem::MemoryLedgerRepository;

pub use artifact::ArtifactRepo;
pub use catalog::CatalogRepo;
pub use item::ItemRepo;
pub use ledger::LedgerRepo;
