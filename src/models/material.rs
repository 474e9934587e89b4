use crate::models::types::{MaterialId, ReservationId, StyleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of a material stack row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackKey {
    pub material_id: MaterialId,
    pub style_id: StyleId,
}

impl StackKey {
    pub fn new(material_id: MaterialId, style_id: StyleId) -> Self {
        Self { material_id, style_id }
    }
}

/// User's quantity of one (material, style) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialStack {
    pub user_id: UserId,
    pub material_id: MaterialId,
    pub style_id: StyleId,
    pub quantity: i32,
}

/// One line of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub key: StackKey,
    pub quantity: i32,
}

/// Handle to quantities already taken off a user's stacks but not yet
/// finalized. Must be committed or released.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationToken {
    pub id: ReservationId,
    pub user_id: UserId,
    pub lines: Vec<ReservationLine>,
    pub created_at: DateTime<Utc>,
}

/// Result of a reservation attempt at the storage level
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(ReservationToken),
    Insufficient {
        key: StackKey,
        available: i32,
        requested: i32,
    },
}

/// Merge lines that target the same stack and sort them by key, so that row
/// locks are always taken in the same order. Sums saturate at `i32::MAX`;
/// callers that accept client input check with [`try_merge_lines`] first.
pub fn merge_lines(lines: &[ReservationLine]) -> Vec<ReservationLine> {
    let mut merged: BTreeMap<StackKey, i32> = BTreeMap::new();
    for line in lines {
        let q = merged.entry(line.key).or_default();
        *q = q.saturating_add(line.quantity);
    }
    into_lines(merged)
}

/// Like [`merge_lines`], but `None` when a stack's total does not fit in `i32`
pub fn try_merge_lines(lines: &[ReservationLine]) -> Option<Vec<ReservationLine>> {
    let mut merged: BTreeMap<StackKey, i32> = BTreeMap::new();
    for line in lines {
        let q = merged.entry(line.key).or_default();
        *q = q.checked_add(line.quantity)?;
    }
    Some(into_lines(merged))
}

fn into_lines(merged: BTreeMap<StackKey, i32>) -> Vec<ReservationLine> {
    merged
        .into_iter()
        .map(|(key, quantity)| ReservationLine { key, quantity })
        .collect()
}
