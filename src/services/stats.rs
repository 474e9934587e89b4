//! Stat model: pure functions from (base stats, level, applied materials) to
//! the stats an item shows everywhere (inventory, equipped loadout, combat).

use crate::error::DomainError;
use crate::models::stats::{BaseStats, StatModifiers, Stats};
use thiserror::Error;

/// Each level above 1 adds 5% of the base stats
pub const LEVEL_GROWTH: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatError {
    #[error("item type has no base stats")]
    MissingBaseStats,

    #[error("base stats are malformed: {0:?}")]
    MalformedBaseStats(Stats),

    #[error("material modifier #{index} is not finite")]
    MalformedModifier { index: usize },

    #[error("level must be at least 1, got {0}")]
    InvalidLevel(i32),
}

impl From<StatError> for DomainError {
    fn from(e: StatError) -> Self {
        match e {
            StatError::InvalidLevel(level) => DomainError::validation("level", format!("must be >= 1, got {level}")),
            other => DomainError::Configuration(other.to_string()),
        }
    }
}

pub fn level_multiplier(level: i32) -> Result<f64, StatError> {
    if level < 1 {
        return Err(StatError::InvalidLevel(level));
    }
    Ok(1.0 + LEVEL_GROWTH * f64::from(level - 1))
}

pub fn stats_at_level(base: &BaseStats, level: i32) -> Result<Stats, StatError> {
    let components = base.0.components();
    if components.iter().any(|c| !c.is_finite() || *c < 0.0) {
        return Err(StatError::MalformedBaseStats(base.0));
    }

    let multiplier = level_multiplier(level)?;
    Ok(base.0.map(|c| c * multiplier))
}

/// Base at level plus the sum of all modifiers, clamped at zero per component
pub fn compute_stats(base: Option<&BaseStats>, level: i32, applied: &[StatModifiers]) -> Result<Stats, StatError> {
    let base = base.ok_or(StatError::MissingBaseStats)?;
    let leveled = stats_at_level(base, level)?;

    let mut total = leveled;
    for (index, modifier) in applied.iter().enumerate() {
        if modifier.0.components().iter().any(|c| !c.is_finite()) {
            return Err(StatError::MalformedModifier { index });
        }
        total = total + *modifier;
    }

    Ok(total.map(|c| c.max(0.0)))
}

/// Aggregate stats of several items, e.g. an equipped loadout entering combat
pub fn sum_stats<'a>(items: impl IntoIterator<Item = &'a Stats>) -> Stats {
    items.into_iter().fold(Stats::ZERO, |acc, s| acc + *s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(ap: f64, aa: f64, dp: f64, da: f64) -> BaseStats {
        BaseStats(Stats::new(ap, aa, dp, da))
    }

    fn modifier(ap: f64, aa: f64, dp: f64, da: f64) -> StatModifiers {
        StatModifiers(Stats::new(ap, aa, dp, da))
    }

    #[test]
    fn table() {
        struct Case {
            name: &'static str,
            base: BaseStats,
            level: i32,
            applied: Vec<StatModifiers>,
            want: Stats,
        }

        let cases = vec![
            Case {
                name: "level 1, nothing applied",
                base: base(10.0, 0.8, 4.0, 0.5),
                level: 1,
                applied: vec![],
                want: Stats::new(10.0, 0.8, 4.0, 0.5),
            },
            Case {
                name: "level 11 is +50%",
                base: base(10.0, 2.0, 4.0, 0.0),
                level: 11,
                applied: vec![],
                want: Stats::new(15.0, 3.0, 6.0, 0.0),
            },
            Case {
                name: "modifiers are summed",
                base: base(10.0, 1.0, 4.0, 1.0),
                level: 1,
                applied: vec![modifier(2.0, 0.0, 1.0, 0.0), modifier(3.0, 0.5, -1.0, 0.25)],
                want: Stats::new(15.0, 1.5, 4.0, 1.25),
            },
            Case {
                name: "negative totals clamp to zero",
                base: base(1.0, 1.0, 1.0, 1.0),
                level: 1,
                applied: vec![modifier(-5.0, 0.0, -1.0, 0.0)],
                want: Stats::new(0.0, 1.0, 0.0, 1.0),
            },
        ];

        for case in cases {
            let got = compute_stats(Some(&case.base), case.level, &case.applied).unwrap();
            assert_eq!(got, case.want, "{}", case.name);
        }
    }

    #[test]
    fn deterministic() {
        let b = base(12.5, 0.75, 8.25, 0.6);
        let mods = [modifier(1.1, 0.05, 0.3, 0.0), modifier(0.7, 0.0, 2.2, 0.1)];
        let a = compute_stats(Some(&b), 7, &mods).unwrap();
        let c = compute_stats(Some(&b), 7, &mods).unwrap();
        assert_eq!(
            a.components().map(f64::to_bits),
            c.components().map(f64::to_bits)
        );
    }

    #[test]
    fn monotonic_in_level() {
        let b = base(10.0, 1.0, 5.0, 1.0);
        let mut prev = stats_at_level(&b, 1).unwrap();
        for level in 2..50 {
            let next = stats_at_level(&b, level).unwrap();
            assert!(next.attack_power > prev.attack_power);
            prev = next;
        }
    }

    #[test]
    fn bad_inputs() {
        assert_eq!(compute_stats(None, 1, &[]), Err(StatError::MissingBaseStats));
        assert_eq!(
            compute_stats(Some(&base(1.0, 1.0, 1.0, 1.0)), 0, &[]),
            Err(StatError::InvalidLevel(0))
        );
        assert!(matches!(
            compute_stats(Some(&base(f64::NAN, 1.0, 1.0, 1.0)), 1, &[]),
            Err(StatError::MalformedBaseStats(_))
        ));
        assert!(matches!(
            compute_stats(Some(&base(-1.0, 1.0, 1.0, 1.0)), 1, &[]),
            Err(StatError::MalformedBaseStats(_))
        ));
        assert_eq!(
            compute_stats(Some(&base(1.0, 1.0, 1.0, 1.0)), 1, &[modifier(f64::INFINITY, 0.0, 0.0, 0.0)]),
            Err(StatError::MalformedModifier { index: 0 })
        );

        let e: DomainError = StatError::MissingBaseStats.into();
        assert!(matches!(e, DomainError::Configuration(_)));
    }

    #[test]
    fn loadout_sum() {
        let items = [Stats::new(1.0, 2.0, 3.0, 4.0), Stats::new(0.5, 0.5, 0.5, 0.5)];
        assert_eq!(sum_stats(&items), Stats::new(1.5, 2.5, 3.5, 4.5));
        assert_eq!(sum_stats(&[]), Stats::ZERO);
    }
}
