//! Per-unit threat lists.
//!
//! Entries are kept in insertion order. Target selection walks the list and
//! only replaces the current best on a strictly greater value, so among
//! equal values the entry inserted first wins. That makes the choice
//! reproducible across runs regardless of hashing or sort stability.

use crate::types::ObjectGuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreatEntry {
    pub target: ObjectGuid,
    pub value: f32,
}

/// Threat held by one unit against others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreatManager {
    entries: Vec<ThreatEntry>,
}

impl ThreatManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` (may be negative) to `target`'s threat, creating the
    /// entry if needed. Values never drop below zero.
    ///
    /// # Returns
    ///
    /// `true` if the current target changed as a result.
    pub fn add_threat(&mut self, target: ObjectGuid, amount: f32) -> bool {
        let before = self.current_target();
        let amount = if amount.is_finite() { amount } else { 0.0 };
        match self.entries.iter_mut().find(|e| e.target == target) {
            Some(entry) => entry.value = (entry.value + amount).max(0.0),
            None => self.entries.push(ThreatEntry {
                target,
                value: amount.max(0.0),
            }),
        }
        self.current_target() != before
    }

    /// Removes `target` from the list. Returns whether it was present.
    pub fn clear_threat(&mut self, target: ObjectGuid) -> bool {
        let len = self.entries.len();
        self.entries.retain(|e| e.target != target);
        self.entries.len() != len
    }

    pub fn clear_all_threat(&mut self) {
        self.entries.clear();
    }

    /// Highest threat target; the earliest inserted wins ties.
    pub fn current_target(&self) -> Option<ObjectGuid> {
        let mut best: Option<&ThreatEntry> = None;
        for entry in &self.entries {
            match best {
                Some(current) if entry.value <= current.value => {}
                _ => best = Some(entry),
            }
        }
        best.map(|e| e.target)
    }

    pub fn threat_of(&self, target: ObjectGuid) -> Option<f32> {
        self.entries.iter().find(|e| e.target == target).map(|e| e.value)
    }

    pub fn contains(&self, target: ObjectGuid) -> bool {
        self.entries.iter().any(|e| e.target == target)
    }

    /// Entries ordered by descending value, insertion order among equals.
    pub fn sorted_list(&self) -> Vec<ThreatEntry> {
        let mut sorted = self.entries.clone();
        // `sort_by` is stable, which preserves insertion order for ties.
        sorted.sort_by(|a, b| b.value.total_cmp(&a.value));
        sorted
    }

    /// Scales `target`'s threat by `percent` (−100 removes all of it).
    pub fn modify_threat_by_percent(&mut self, target: ObjectGuid, percent: i32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.target == target) {
            let factor = 1.0 + percent as f32 / 100.0;
            entry.value = (entry.value * factor).max(0.0);
        }
    }

    /// Zeroes every value but keeps the entries.
    pub fn reset_all_threat(&mut self) {
        for entry in &mut self.entries {
            entry.value = 0.0;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
