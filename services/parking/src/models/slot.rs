//! Slot model and availability snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::vehicle::VehicleCategory;

/// A parking space on one level accepting one vehicle category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub level_number: i32,
    pub slot_number: i32,
    pub category: VehicleCategory,
    pub is_occupied: bool,
}

impl Slot {
    /// Allocation order: lowest level first, then lowest slot number
    pub fn position(&self) -> (i32, i32) {
        (self.level_number, self.slot_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub slot_id: Uuid,
    pub slot_number: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAvailability {
    pub total: usize,
    pub available: Vec<SlotRef>,
    pub occupied: Vec<SlotRef>,
}

/// Per-level view of the registry at a single point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelAvailability {
    pub level_number: i32,
    pub categories: BTreeMap<VehicleCategory, CategoryAvailability>,
}

impl LevelAvailability {
    /// Group slots by level and category, ordered by level then slot number.
    ///
    /// Levels without any slot never appear in the result.
    pub fn from_slots<I>(slots: I) -> Vec<LevelAvailability>
    where
        I: IntoIterator<Item = Slot>,
    {
        let mut slots: Vec<Slot> = slots.into_iter().collect();
        slots.sort_by_key(Slot::position);

        let mut levels: Vec<LevelAvailability> = Vec::new();
        for slot in slots {
            let needs_level = levels
                .last()
                .is_none_or(|level| level.level_number != slot.level_number);
            if needs_level {
                levels.push(LevelAvailability {
                    level_number: slot.level_number,
                    categories: BTreeMap::new(),
                });
            }

            let Some(level) = levels.last_mut() else {
                continue;
            };
            let entry = level.categories.entry(slot.category).or_default();
            entry.total += 1;
            let slot_ref = SlotRef {
                slot_id: slot.id,
                slot_number: slot.slot_number,
            };
            if slot.is_occupied {
                entry.occupied.push(slot_ref);
            } else {
                entry.available.push(slot_ref);
            }
        }

        levels
    }

    pub fn available_count(&self, category: VehicleCategory) -> usize {
        self.categories
            .get(&category)
            .map(|c| c.available.len())
            .unwrap_or(0)
    }
}
