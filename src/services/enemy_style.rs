use crate::db::repo::CatalogRepo;
use crate::error::{AppResult, DomainError};
use crate::models::types::{EnemyTypeId, StyleId};
use crate::util::weighted::{WeightError, WeightedTable};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

/// A freshly spawned enemy and the style of the materials it will drop
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnemySpawn {
    pub enemy_type_id: EnemyTypeId,
    pub style_id: StyleId,
}

/// Pick a style for one spawn of `enemy_type_id` using the thread rng
pub fn select_style(enemy_type_id: EnemyTypeId, styles: &[(StyleId, f64)]) -> AppResult<StyleId> {
    select_style_with(enemy_type_id, styles, &mut rand::rng())
}

/// Like [`select_style`] with an explicit random source
pub fn select_style_with<R: Rng + ?Sized>(
    enemy_type_id: EnemyTypeId,
    styles: &[(StyleId, f64)],
    rng: &mut R,
) -> AppResult<StyleId> {
    let table = WeightedTable::canonical(styles.iter().copied(), |style| *style).map_err(|e| match e {
        WeightError::Empty => DomainError::Configuration(format!("enemy type {enemy_type_id} has no style weights")),
        WeightError::InvalidWeight { index, weight } => DomainError::Configuration(format!(
            "enemy type {enemy_type_id} has an invalid style weight {weight} at position {index}"
        )),
    })?;

    Ok(*table.pick(rng))
}

pub struct EnemyStyleSelector {
    catalog: Arc<dyn CatalogRepo>,
}

impl EnemyStyleSelector {
    pub fn new(catalog: Arc<dyn CatalogRepo>) -> Self {
        Self { catalog }
    }

    /// Roll the style for a new enemy. Every spawn draws independently.
    pub async fn spawn(&self, enemy_type_id: EnemyTypeId) -> AppResult<EnemySpawn> {
        let weights = self.catalog.enemy_styles(enemy_type_id).await?;
        let styles: Vec<(StyleId, f64)> = weights.iter().map(|w| (w.style_id, w.weight)).collect();

        let style_id = select_style(enemy_type_id, &styles)?;
        tracing::debug!(enemy_type_id = %enemy_type_id, style_id = %style_id, "enemy spawned");

        Ok(EnemySpawn {
            enemy_type_id,
            style_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::MemoryCatalogRepository;
    use crate::models::catalog::EnemyStyleWeight;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn empty_table_is_a_configuration_error() {
        let err = select_style(EnemyTypeId::new(), &[]).unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn zero_weight_is_a_configuration_error() {
        let err = select_style(EnemyTypeId::new(), &[(StyleId::new(), 1.0), (StyleId::new(), 0.0)]).unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn single_style_always_wins() {
        let only = StyleId::new();
        for _ in 0..100 {
            assert_eq!(select_style(EnemyTypeId::new(), &[(only, 0.1)]).unwrap(), only);
        }
    }

    #[test]
    fn storage_order_does_not_change_outcome() {
        let enemy = EnemyTypeId::new();
        let a = StyleId::new();
        let b = StyleId::new();
        let c = StyleId::new();

        let one = [(a, 1.0), (b, 2.0), (c, 1.0)];
        let other = [(c, 1.0), (a, 1.0), (b, 2.0)];

        let mut r1 = StdRng::seed_from_u64(7);
        let mut r2 = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(
                select_style_with(enemy, &one, &mut r1).unwrap(),
                select_style_with(enemy, &other, &mut r2).unwrap()
            );
        }
    }

    #[test]
    fn ten_thousand_draws_follow_weights() {
        let enemy = EnemyTypeId::new();
        let normal = StyleId::new();
        let pixel = StyleId::new();
        let holo = StyleId::new();
        let styles = [(normal, 1.0), (pixel, 2.0), (holo, 1.0)];

        let mut rng = StdRng::seed_from_u64(42);
        let (mut n, mut p, mut h) = (0u32, 0u32, 0u32);
        for _ in 0..10_000 {
            let s = select_style_with(enemy, &styles, &mut rng).unwrap();
            if s == normal {
                n += 1;
            } else if s == pixel {
                p += 1;
            } else if s == holo {
                h += 1;
            }
        }

        let share = |x: u32| f64::from(x) / 10_000.0;
        assert!((share(n) - 0.25).abs() < 0.03, "normal {n}");
        assert!((share(p) - 0.50).abs() < 0.03, "pixel {p}");
        assert!((share(h) - 0.25).abs() < 0.03, "holo {h}");
    }

    #[tokio::test]
    async fn spawn_reads_catalog_table() {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        let goblin = EnemyTypeId::new();
        let pixel = StyleId::new();
        catalog.upsert_enemy_type(goblin, "Goblin").await.unwrap();
        catalog
            .set_enemy_styles(
                goblin,
                &[EnemyStyleWeight {
                    enemy_type_id: goblin,
                    style_id: pixel,
                    weight: 3.0,
                }],
            )
            .await
            .unwrap();

        let selector = EnemyStyleSelector::new(catalog);
        let spawn = selector.spawn(goblin).await.unwrap();
        assert_eq!(spawn.style_id, pixel);

        let err = selector.spawn(EnemyTypeId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }
}
