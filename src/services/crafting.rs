use crate::db::error::DbError;
use crate::db::repo::{CatalogRepo, ItemRepo};
use crate::error::{AppResult, DomainError};
use crate::models::artifact::ComboFingerprint;
use crate::models::catalog::{ItemType, Material, Style};
use crate::models::item::{CraftWrite, ItemInstance, MAX_MATERIAL_SLOTS, MaterialApplication, MaterialSelection};
use crate::models::material::{ReservationLine, ReservationToken, StackKey, merge_lines, try_merge_lines};
use crate::models::stats::Stats;
use crate::models::types::{ItemId, StyleId, UserId};
use crate::services::fingerprint::fingerprint;
use crate::services::generator::{GenerationRequest, ImageGenerator};
use crate::services::image_cache::ImageCacheStore;
use crate::services::item::{derive_stats, item_type, materials};
use crate::services::ledger::MaterialStackLedger;
use chrono::Utc;
use dashmap::DashSet;
use futures::future::try_join_all;
use std::sync::Arc;

/// Outcome of a successful craft
#[derive(Debug, Clone)]
pub struct CraftedItem {
    pub item: ItemInstance,
    pub fingerprint: ComboFingerprint,
    /// This craft produced the artwork for its combo
    pub first_craft: bool,
    /// How many crafts have used the combo's artwork, this one included
    pub use_count: i64,
}

/// What a craft would produce, computed without touching stacks or the
/// generator
#[derive(Debug, Clone)]
pub struct CraftPreview {
    pub item_id: ItemId,
    pub fingerprint: ComboFingerprint,
    pub stats: Stats,
    pub is_styled: bool,
    /// Artwork already exists for this combo
    pub cached_image_url: Option<String>,
    /// The user currently holds every requested quantity
    pub affordable: bool,
    pub slots_left: usize,
}

/// Everything needed to execute a craft, resolved before any state changes
struct CraftPlan {
    item: ItemInstance,
    item_type: ItemType,
    /// Existing then new, in slot order
    materials: Vec<Material>,
    styles: Vec<Style>,
    new_styles: Vec<StyleId>,
    fingerprint: ComboFingerprint,
    stats: Stats,
    is_styled: bool,
}

impl CraftPlan {
    fn generation_request(&self) -> GenerationRequest {
        GenerationRequest::new(
            self.fingerprint.clone(),
            self.item_type.name.clone(),
            self.materials.iter().map(|m| m.name.clone()).collect(),
            self.styles.iter().map(|s| s.name.clone()).collect(),
            self.item_type.reference_image_url.iter().cloned().collect(),
        )
    }

    fn new_applications(&self) -> Vec<MaterialApplication> {
        let existing = self.item.applied.len();
        let now = Utc::now();
        self.materials[existing..]
            .iter()
            .zip(&self.new_styles)
            .enumerate()
            .map(|(i, (material, style_id))| MaterialApplication {
                material_id: material.id,
                style_id: *style_id,
                slot_index: (existing + i) as i16,
                applied_at: now,
            })
            .collect()
    }
}

/// Releases the per-item in-flight marker on drop
struct ItemGuard {
    in_flight: Arc<DashSet<ItemId>>,
    item_id: ItemId,
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.item_id);
    }
}

/// Applies materials to items: reserve stacks, resolve artwork, recompute
/// stats and persist, all or nothing.
pub struct CraftingOrchestrator {
    items: Arc<dyn ItemRepo>,
    catalog: Arc<dyn CatalogRepo>,
    ledger: Arc<MaterialStackLedger>,
    cache: Arc<ImageCacheStore>,
    generator: Arc<dyn ImageGenerator>,
    in_flight: Arc<DashSet<ItemId>>,
}

impl CraftingOrchestrator {
    pub fn new(
        items: Arc<dyn ItemRepo>,
        catalog: Arc<dyn CatalogRepo>,
        ledger: Arc<MaterialStackLedger>,
        cache: Arc<ImageCacheStore>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            items,
            catalog,
            ledger,
            cache,
            generator,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Apply 1 to 3 materials to an item.
    ///
    /// Materials are reserved before the artwork is resolved and the
    /// reservation is released on every failure, so a failed craft never
    /// consumes anything. A successful craft finalizes the reservation in the
    /// same write that appends the applications.
    #[tracing::instrument(
        skip(self, selections),
        fields(user_id = %user_id, item_id = %item_id, materials = selections.len())
    )]
    pub async fn apply_materials(
        &self,
        user_id: UserId,
        item_id: ItemId,
        selections: &[MaterialSelection],
    ) -> AppResult<CraftedItem> {
        validate_selections(selections)?;
        let _guard = self.lock_item(item_id)?;

        let plan = self.plan(user_id, item_id, selections).await?;
        let token = self.ledger.reserve(user_id, selections).await?;

        match self.execute(&plan, &token).await {
            Ok(crafted) => {
                tracing::info!(
                    fingerprint = %crafted.fingerprint.short(),
                    first_craft = crafted.first_craft,
                    use_count = crafted.use_count,
                    slots = crafted.item.applied.len(),
                    "materials applied"
                );
                Ok(crafted)
            }
            Err(e) => {
                tracing::warn!(error = %e, reservation_id = %token.id, "craft failed, restoring materials");
                if let Err(release_err) = self.ledger.release(token.id).await {
                    // the sweeper picks it up after the reservation ttl
                    tracing::error!(error = %release_err, reservation_id = %token.id, "failed to release reservation");
                }
                Err(e)
            }
        }
    }

    /// Stats, fingerprint and cache status a craft would produce
    pub async fn preview(
        &self,
        user_id: UserId,
        item_id: ItemId,
        selections: &[MaterialSelection],
    ) -> AppResult<CraftPreview> {
        validate_selections(selections)?;
        let plan = self.plan(user_id, item_id, selections).await?;
        let cached = self.cache.peek(&plan.fingerprint).await?;

        let lines: Vec<ReservationLine> = selections
            .iter()
            .map(|s| ReservationLine {
                key: StackKey::new(s.material_id, s.style_id),
                quantity: s.quantity,
            })
            .collect();
        let mut affordable = true;
        for line in merge_lines(&lines) {
            if self.ledger.quantity(user_id, line.key).await? < line.quantity {
                affordable = false;
                break;
            }
        }

        Ok(CraftPreview {
            item_id,
            slots_left: MAX_MATERIAL_SLOTS - plan.materials.len(),
            fingerprint: plan.fingerprint,
            stats: plan.stats,
            is_styled: plan.is_styled,
            cached_image_url: cached.map(|a| a.image_url),
            affordable,
        })
    }

    fn lock_item(&self, item_id: ItemId) -> AppResult<ItemGuard> {
        if !self.in_flight.insert(item_id) {
            return Err(DomainError::ConcurrencyConflict(item_id));
        }
        Ok(ItemGuard {
            in_flight: self.in_flight.clone(),
            item_id,
        })
    }

    /// Load and validate everything the craft depends on
    async fn plan(&self, user_id: UserId, item_id: ItemId, selections: &[MaterialSelection]) -> AppResult<CraftPlan> {
        let item = self
            .items
            .get(item_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("item {item_id}")))?;
        if !item.is_owned_by(user_id) {
            return Err(DomainError::PermissionDenied);
        }
        if selections.len() > item.free_slots() {
            return Err(DomainError::validation(
                "materials",
                format!(
                    "item has {} of {MAX_MATERIAL_SLOTS} slots used, cannot apply {} more",
                    item.applied.len(),
                    selections.len()
                ),
            ));
        }

        let mut pairs = item.applied_pairs();
        pairs.extend(selections.iter().map(|s| (s.material_id, s.style_id)));

        let material_ids: Vec<_> = pairs.iter().map(|(m, _)| *m).collect();
        let style_ids: Vec<_> = pairs.iter().map(|(_, s)| *s).collect();

        let catalog = self.catalog.as_ref();
        let (item_type, materials, styles) = futures::try_join!(
            item_type(catalog, item.item_type_id),
            materials(catalog, &material_ids),
            styles(catalog, &style_ids),
        )?;

        let stats = derive_stats(&item_type, item.level, &materials)?;
        let is_styled = styles.iter().any(|s| !s.is_default);
        let fingerprint = fingerprint(item.item_type_id, &pairs);

        Ok(CraftPlan {
            new_styles: selections.iter().map(|s| s.style_id).collect(),
            item,
            item_type,
            materials,
            styles,
            fingerprint,
            stats,
            is_styled,
        })
    }

    /// Resolve artwork and persist. The caller owns the reservation.
    async fn execute(&self, plan: &CraftPlan, token: &ReservationToken) -> AppResult<CraftedItem> {
        let generator = self.generator.clone();
        let request = plan.generation_request();
        let resolution = self
            .cache
            .resolve(&plan.fingerprint, move || async move { generator.generate(&request).await })
            .await?;

        let write = CraftWrite {
            item_id: plan.item.id,
            expected_version: plan.item.version,
            new_applications: plan.new_applications(),
            stats: plan.stats,
            image_url: resolution.artifact.image_url.clone(),
            is_styled: plan.is_styled,
            reservation_id: token.id,
        };

        let item = match self.items.persist_craft(&write).await {
            Ok(item) => item,
            Err(DbError::VersionConflict) => return Err(DomainError::ConcurrencyConflict(plan.item.id)),
            Err(DbError::StaleReservation) => {
                tracing::warn!(reservation_id = %token.id, "reservation expired before the craft was saved");
                return Err(DomainError::ConcurrencyConflict(plan.item.id));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CraftedItem {
            item,
            fingerprint: plan.fingerprint.clone(),
            first_craft: resolution.created,
            use_count: resolution.artifact.use_count,
        })
    }
}

fn validate_selections(selections: &[MaterialSelection]) -> AppResult<()> {
    if selections.is_empty() || selections.len() > MAX_MATERIAL_SLOTS {
        return Err(DomainError::validation(
            "materials",
            format!("between 1 and {MAX_MATERIAL_SLOTS} materials required, got {}", selections.len()),
        ));
    }
    if let Some(bad) = selections.iter().find(|s| s.quantity < 1) {
        return Err(DomainError::validation(
            "quantity",
            format!("material {} quantity must be at least 1, got {}", bad.material_id, bad.quantity),
        ));
    }
    let lines: Vec<ReservationLine> = selections
        .iter()
        .map(|s| ReservationLine {
            key: StackKey::new(s.material_id, s.style_id),
            quantity: s.quantity,
        })
        .collect();
    if try_merge_lines(&lines).is_none() {
        return Err(DomainError::validation("quantity", "combined quantity for one stack is too large"));
    }
    Ok(())
}

async fn styles(catalog: &dyn CatalogRepo, ids: &[StyleId]) -> AppResult<Vec<Style>> {
    let found = try_join_all(ids.iter().map(|id| catalog.style(*id))).await?;
    ids.iter()
        .zip(found)
        .map(|(id, s)| s.ok_or_else(|| DomainError::Configuration(format!("unknown style {id}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::MaterialId;

    fn sel(quantity: i32) -> MaterialSelection {
        MaterialSelection {
            material_id: MaterialId::new(),
            style_id: StyleId::new(),
            quantity,
        }
    }

    #[test]
    fn selection_count_and_quantity_are_validated() {
        assert!(validate_selections(&[sel(1)]).is_ok());
        assert!(validate_selections(&[sel(1), sel(2), sel(1)]).is_ok());

        assert!(matches!(
            validate_selections(&[]),
            Err(DomainError::Validation { field: "materials", .. })
        ));
        assert!(matches!(
            validate_selections(&[sel(1), sel(1), sel(1), sel(1)]),
            Err(DomainError::Validation { field: "materials", .. })
        ));
        assert!(matches!(
            validate_selections(&[sel(1), sel(0)]),
            Err(DomainError::Validation { field: "quantity", .. })
        ));

        let big = sel(i32::MAX);
        assert!(validate_selections(&[big]).is_ok());
        assert!(matches!(
            validate_selections(&[big, big]),
            Err(DomainError::Validation { field: "quantity", .. })
        ));
    }
}
