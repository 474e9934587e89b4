use crate::db::repo::CatalogRepo;
use crate::error::{AppResult, ConfigErrorKind, DomainError, InfraError};
use crate::models::catalog::{EnemyStyleWeight, ItemType, Material, Style};
use crate::models::stats::{BaseStats, StatModifiers, Stats};
use crate::models::types::{EnemyTypeId, ItemTypeId, MaterialId, StyleId};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

const CATALOG_VERSION: u8 = 1;

// ====== YAML models ======

#[derive(Debug, Deserialize)]
pub struct CatalogYaml {
    pub version: u8, // must be 1
    #[serde(default)]
    pub styles: Vec<StyleYaml>,
    #[serde(default)]
    pub materials: Vec<MaterialYaml>,
    #[serde(default)]
    pub item_types: Vec<ItemTypeYaml>,
    #[serde(default)]
    pub enemy_types: Vec<EnemyTypeYaml>,
}

#[derive(Debug, Deserialize)]
pub struct StyleYaml {
    pub id: StyleId,
    pub name: String, // "normal", "pixel", "holographic"
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Deserialize)]
pub struct MaterialYaml {
    pub id: MaterialId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modifiers: StatsYaml,
}

#[derive(Debug, Deserialize)]
pub struct ItemTypeYaml {
    pub id: ItemTypeId,
    pub name: String,
    pub category: String, // "weapon", "shield", ...
    #[serde(default)]
    pub base_stats: Option<StatsYaml>,
    #[serde(default)]
    pub reference_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnemyTypeYaml {
    pub id: EnemyTypeId,
    pub name: String,
    #[serde(default)]
    pub styles: Vec<StyleWeightYaml>,
}

#[derive(Debug, Deserialize)]
pub struct StyleWeightYaml {
    pub style: StyleId,
    pub weight: f64,
}

/// Stat block where omitted components are zero
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StatsYaml {
    pub attack_power: f64,
    pub attack_accuracy: f64,
    pub defense_power: f64,
    pub defense_accuracy: f64,
}

impl From<StatsYaml> for Stats {
    fn from(s: StatsYaml) -> Self {
        Stats::new(s.attack_power, s.attack_accuracy, s.defense_power, s.defense_accuracy)
    }
}

/// Row counts written by an import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub styles: usize,
    pub materials: usize,
    pub item_types: usize,
    pub enemy_types: usize,
}

pub fn parse_catalog(src: &str) -> AppResult<CatalogYaml> {
    let catalog: CatalogYaml =
        serde_yaml::from_str(src).map_err(|e| DomainError::Configuration(format!("catalog yaml: {e}")))?;
    validate(&catalog)?;
    Ok(catalog)
}

fn validate(catalog: &CatalogYaml) -> AppResult<()> {
    if catalog.version != CATALOG_VERSION {
        return Err(DomainError::Configuration(format!(
            "unsupported catalog version {} (expected {CATALOG_VERSION})",
            catalog.version
        )));
    }

    let defaults = catalog.styles.iter().filter(|s| s.default).count();
    if !catalog.styles.is_empty() && defaults != 1 {
        return Err(DomainError::Configuration(format!(
            "exactly one default style required, found {defaults}"
        )));
    }

    let known_styles: HashSet<StyleId> = catalog.styles.iter().map(|s| s.id).collect();
    for enemy in &catalog.enemy_types {
        if enemy.styles.is_empty() {
            return Err(DomainError::Configuration(format!("enemy '{}' has no styles", enemy.name)));
        }
        for w in &enemy.styles {
            if !w.weight.is_finite() || w.weight <= 0.0 {
                return Err(DomainError::Configuration(format!(
                    "enemy '{}': style weight must be positive, got {}",
                    enemy.name, w.weight
                )));
            }
            if !known_styles.contains(&w.style) {
                return Err(DomainError::Configuration(format!(
                    "enemy '{}' references unknown style {}",
                    enemy.name, w.style
                )));
            }
        }
    }

    Ok(())
}

/// Upsert every entry of a parsed catalog. Re-importing the same file is a no-op.
pub async fn import_catalog(repo: &dyn CatalogRepo, catalog: &CatalogYaml) -> AppResult<ImportSummary> {
    for s in &catalog.styles {
        repo.upsert_style(&Style {
            id: s.id,
            name: s.name.clone(),
            is_default: s.default,
        })
        .await?;
    }

    for m in &catalog.materials {
        repo.upsert_material(&Material {
            id: m.id,
            name: m.name.clone(),
            description: m.description.clone(),
            modifiers: StatModifiers(m.modifiers.into()),
        })
        .await?;
    }

    for t in &catalog.item_types {
        repo.upsert_item_type(&ItemType {
            id: t.id,
            name: t.name.clone(),
            category: t.category.clone(),
            base_stats: t.base_stats.map(|b| BaseStats(b.into())),
            reference_image_url: t.reference_image_url.clone(),
        })
        .await?;
    }

    for e in &catalog.enemy_types {
        repo.upsert_enemy_type(e.id, &e.name).await?;
        let weights: Vec<EnemyStyleWeight> = e
            .styles
            .iter()
            .map(|w| EnemyStyleWeight {
                enemy_type_id: e.id,
                style_id: w.style,
                weight: w.weight,
            })
            .collect();
        repo.set_enemy_styles(e.id, &weights).await?;
    }

    let summary = ImportSummary {
        styles: catalog.styles.len(),
        materials: catalog.materials.len(),
        item_types: catalog.item_types.len(),
        enemy_types: catalog.enemy_types.len(),
    };
    tracing::info!(?summary, "catalog imported");
    Ok(summary)
}

/// Read, validate and import a catalog file
pub async fn import_catalog_file(repo: &dyn CatalogRepo, path: &Path) -> AppResult<ImportSummary> {
    let src = std::fs::read_to_string(path).map_err(|e| InfraError::Config {
        path: path.to_path_buf(),
        source: ConfigErrorKind::Read(e),
    })?;
    let catalog = parse_catalog(&src)?;
    import_catalog(repo, &catalog).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::MemoryCatalogRepository;

    const SAMPLE: &str = r#"
version: 1
styles:
  - id: 00000000-0000-0000-0000-0000000000a1
    name: normal
    default: true
  - id: 00000000-0000-0000-0000-0000000000a2
    name: holographic
materials:
  - id: 00000000-0000-0000-0000-0000000000b1
    name: Wood
    modifiers:
      attack_power: 1.5
      defense_accuracy: -0.1
item_types:
  - id: 00000000-0000-0000-0000-0000000000c1
    name: Sword
    category: weapon
    base_stats: { attack_power: 10, attack_accuracy: 0.8, defense_power: 2, defense_accuracy: 0.5 }
  - id: 00000000-0000-0000-0000-0000000000c2
    name: Prototype
    category: weapon
enemy_types:
  - id: 00000000-0000-0000-0000-0000000000d1
    name: Goblin
    styles:
      - { style: 00000000-0000-0000-0000-0000000000a1, weight: 3 }
      - { style: 00000000-0000-0000-0000-0000000000a2, weight: 1 }
"#;

    #[tokio::test]
    async fn imports_sample() {
        let repo = MemoryCatalogRepository::new();
        let catalog = parse_catalog(SAMPLE).unwrap();
        let summary = import_catalog(&repo, &catalog).await.unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                styles: 2,
                materials: 1,
                item_types: 2,
                enemy_types: 1
            }
        );

        let wood = repo
            .material("00000000-0000-0000-0000-0000000000b1".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wood.modifiers.0, Stats::new(1.5, 0.0, 0.0, -0.1));

        let proto = repo
            .item_type("00000000-0000-0000-0000-0000000000c2".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(proto.base_stats.is_none());

        let goblin = repo
            .enemy_styles("00000000-0000-0000-0000-0000000000d1".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(goblin.len(), 2);
    }

    #[test]
    fn rejects_two_default_styles() {
        let src = SAMPLE.replace("    name: holographic", "    name: holographic\n    default: true");
        assert!(matches!(parse_catalog(&src), Err(DomainError::Configuration(_))));
    }

    #[test]
    fn rejects_bad_weights_and_unknown_styles() {
        let zero = SAMPLE.replace("weight: 3", "weight: 0");
        assert!(parse_catalog(&zero).is_err());

        let unknown = SAMPLE.replace(
            "{ style: 00000000-0000-0000-0000-0000000000a2",
            "{ style: 00000000-0000-0000-0000-0000000000ff",
        );
        assert!(parse_catalog(&unknown).is_err());
    }

    #[test]
    fn rejects_other_versions() {
        let src = SAMPLE.replace("version: 1", "version: 2");
        assert!(parse_catalog(&src).is_err());
    }
}
