#![allow(dead_code)]

use async_trait::async_trait;
use mystica::Registry;
use mystica::config::Config;
use mystica::models::catalog::{ItemType, Material, Style};
use mystica::models::item::MaterialSelection;
use mystica::models::material::StackKey;
use mystica::models::stats::{BaseStats, StatModifiers, Stats};
use mystica::models::types::{ItemTypeId, MaterialId, StyleId, UserId};
use mystica::services::generator::{GenerationError, GenerationRequest, ImageGenerator};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Generator that counts calls, can be slowed down and can be told to fail
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub fail: AtomicBool,
}

impl FakeGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Provider("content filter".into()));
        }
        Ok(format!("https://cdn.test/crafted/{}.png", request.fingerprint))
    }
}

pub struct World {
    pub registry: Arc<Registry>,
    pub generator: Arc<FakeGenerator>,
    pub sword: ItemTypeId,
    pub relic: ItemTypeId,
    pub wood: MaterialId,
    pub iron: MaterialId,
    pub crystal: MaterialId,
    pub normal: StyleId,
    pub holo: StyleId,
}

pub const SWORD_BASE: Stats = Stats {
    attack_power: 10.0,
    attack_accuracy: 0.8,
    defense_power: 2.0,
    defense_accuracy: 0.5,
};

pub const WOOD_MOD: Stats = Stats {
    attack_power: 1.0,
    attack_accuracy: 0.0,
    defense_power: 2.0,
    defense_accuracy: 0.0,
};

/// In-memory registry seeded with a small catalog
pub async fn world(generation_delay: Duration) -> World {
    let generator = Arc::new(FakeGenerator::new(generation_delay));
    let mut config = Config::default();
    config.crafting.generation_timeout_ms = 2_000;
    config.crafting.wait_timeout_ms = 3_000;
    config.crafting.poll_interval_ms = 10;

    let registry = Arc::new(Registry::in_memory(Arc::new(config), generator.clone()));
    let catalog = registry.repos.catalog.clone();

    let normal = Style {
        id: StyleId::new(),
        name: "normal".into(),
        is_default: true,
    };
    let holo = Style {
        id: StyleId::new(),
        name: "Holographic".into(),
        is_default: false,
    };
    catalog.upsert_style(&normal).await.unwrap();
    catalog.upsert_style(&holo).await.unwrap();

    let material = |name: &str, modifiers: Stats| Material {
        id: MaterialId::new(),
        name: name.into(),
        description: None,
        modifiers: StatModifiers(modifiers),
    };
    let wood = material("Wood", WOOD_MOD);
    let iron = material("Iron", Stats::new(3.0, -0.1, 1.0, 0.0));
    let crystal = material("Crystal", Stats::new(0.0, 0.2, 0.0, 0.2));
    for m in [&wood, &iron, &crystal] {
        catalog.upsert_material(m).await.unwrap();
    }

    let sword = ItemType {
        id: ItemTypeId::new(),
        name: "Sword".into(),
        category: "weapon".into(),
        base_stats: Some(BaseStats(SWORD_BASE)),
        reference_image_url: Some("https://cdn.test/base/sword.png".into()),
    };
    let relic = ItemType {
        id: ItemTypeId::new(),
        name: "Relic".into(),
        category: "trinket".into(),
        base_stats: None,
        reference_image_url: None,
    };
    catalog.upsert_item_type(&sword).await.unwrap();
    catalog.upsert_item_type(&relic).await.unwrap();

    World {
        registry,
        generator,
        sword: sword.id,
        relic: relic.id,
        wood: wood.id,
        iron: iron.id,
        crystal: crystal.id,
        normal: normal.id,
        holo: holo.id,
    }
}

impl World {
    pub async fn grant(&self, user: UserId, material: MaterialId, style: StyleId, quantity: i32) {
        self.registry
            .services
            .ledger
            .grant(user, StackKey::new(material, style), quantity)
            .await
            .unwrap();
    }

    pub async fn quantity(&self, user: UserId, material: MaterialId, style: StyleId) -> i32 {
        self.registry
            .services
            .ledger
            .quantity(user, StackKey::new(material, style))
            .await
            .unwrap()
    }
}

pub fn pick(material: MaterialId, style: StyleId) -> MaterialSelection {
    MaterialSelection {
        material_id: material,
        style_id: style,
        quantity: 1,
    }
}
