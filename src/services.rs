pub mod crafting;
pub mod enemy_style;
pub mod fingerprint;
pub mod generator;
pub mod image_cache;
pub mod item;
pub mod ledger;
pub mod stats;

pub use crafting::{CraftPreview, CraftedItem, CraftingOrchestrator};
pub use enemy_style::{EnemySpawn, EnemyStyleSelector};
pub use generator::{HttpImageGenerator, ImageGenerator, PlaceholderGenerator};
pub use image_cache::ImageCacheStore;
pub use item::ItemService;
pub use ledger::MaterialStackLedger;
