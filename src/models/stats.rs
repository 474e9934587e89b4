use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Derived combat stats of an item. Never authored directly, always computed
/// from the item type's base stats, its level and its applied materials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub attack_power: f64,
    pub attack_accuracy: f64,
    pub defense_power: f64,
    pub defense_accuracy: f64,
}

impl Stats {
    pub const ZERO: Stats = Stats {
        attack_power: 0.0,
        attack_accuracy: 0.0,
        defense_power: 0.0,
        defense_accuracy: 0.0,
    };

    pub fn new(attack_power: f64, attack_accuracy: f64, defense_power: f64, defense_accuracy: f64) -> Self {
        Self {
            attack_power,
            attack_accuracy,
            defense_power,
            defense_accuracy,
        }
    }

    pub fn components(&self) -> [f64; 4] {
        [
            self.attack_power,
            self.attack_accuracy,
            self.defense_power,
            self.defense_accuracy,
        ]
    }

    /// Applies `f` to every component
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            attack_power: f(self.attack_power),
            attack_accuracy: f(self.attack_accuracy),
            defense_power: f(self.defense_power),
            defense_accuracy: f(self.defense_accuracy),
        }
    }
}

impl Add for Stats {
    type Output = Stats;

    fn add(self, rhs: Stats) -> Stats {
        Stats {
            attack_power: self.attack_power + rhs.attack_power,
            attack_accuracy: self.attack_accuracy + rhs.attack_accuracy,
            defense_power: self.defense_power + rhs.defense_power,
            defense_accuracy: self.defense_accuracy + rhs.defense_accuracy,
        }
    }
}

impl Add<StatModifiers> for Stats {
    type Output = Stats;

    fn add(self, rhs: StatModifiers) -> Stats {
        self + rhs.0
    }
}

/// Base stats of an item type at level 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseStats(pub Stats);

/// Additive modifier vector contributed by one applied material. Components
/// may be negative (a heavy material trades accuracy for power).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatModifiers(pub Stats);
