// 🔄 Rotation Engine - who gets the next load
//
// Queue position is never stored. The engine keeps its drivers in queue
// order by re-sorting after every mutation:
//
//   1. active drivers before paused drivers
//   2. ascending total earnings (penalties included)
//   3. ascending last activity, "no entries" counting as 0 (oldest)
//   4. otherwise the previous relative order (stable sort)
//
// A refusal never touches a position field; it adds a ledger entry and the
// next sort does the rest.

use crate::driver::{Driver, DriverId, IdSequence};
use crate::error::{Missing, Result, RotationError};
use crate::ledger::{EntryId, EntryKind, FreightEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

// ============================================================================
// ORDERING
// ============================================================================

/// Queue comparator: a total preorder over drivers
pub fn compare_drivers(a: &Driver, b: &Driver) -> Ordering {
    a.paused
        .cmp(&b.paused)
        .then_with(|| a.total_earnings().total_cmp(&b.total_earnings()))
        .then_with(|| {
            a.ledger
                .last_activity_millis()
                .cmp(&b.ledger.last_activity_millis())
        })
}

/// Stable in-place sort into queue order
pub fn sort_queue(drivers: &mut [Driver]) {
    drivers.sort_by(compare_drivers);
}

// ============================================================================
// PENALTY STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyStrategy {
    /// Inject a cost that lifts the refusing driver strictly above everyone else
    #[serde(rename = "cost")]
    CostPenalty,

    /// Append a zero-value refusal; only the timestamp tie-break moves the driver
    #[serde(rename = "zero")]
    ZeroValueRefusal,
}

impl PenaltyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyStrategy::CostPenalty => "cost",
            PenaltyStrategy::ZeroValueRefusal => "zero",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cost" | "cost-penalty" | "penalty" => Some(PenaltyStrategy::CostPenalty),
            "zero" | "zero-value" | "refusal" => Some(PenaltyStrategy::ZeroValueRefusal),
            _ => None,
        }
    }

    pub fn entry_kind(&self) -> EntryKind {
        match self {
            PenaltyStrategy::CostPenalty => EntryKind::Penalty,
            PenaltyStrategy::ZeroValueRefusal => EntryKind::Refusal,
        }
    }
}

impl Default for PenaltyStrategy {
    fn default() -> Self {
        PenaltyStrategy::CostPenalty
    }
}

/// Value of a cost penalty: enough to land at `max_other + 1`, never below 1
pub fn cost_penalty_value(max_other_total: f64, current_total: f64) -> f64 {
    let target = max_other_total + 1.0;
    (target - current_total).max(1.0)
}

/// What a refusal would do, computed without mutating anything
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RefusalPreview {
    pub current_total: f64,
    pub penalty_value: f64,
    pub new_total: f64,
}

// ============================================================================
// ROTATION ENGINE
// ============================================================================

/// Owns the driver collection and keeps it in queue order
#[derive(Debug, Clone)]
pub struct RotationEngine {
    drivers: Vec<Driver>,
    strategy: PenaltyStrategy,
    ids: IdSequence,
}

impl RotationEngine {
    pub fn new(strategy: PenaltyStrategy) -> Self {
        RotationEngine {
            drivers: Vec::new(),
            strategy,
            ids: IdSequence::new(),
        }
    }

    /// Adopt a loaded collection. Stored order is the tie-break of last resort.
    pub fn from_drivers(drivers: Vec<Driver>, strategy: PenaltyStrategy) -> Self {
        let mut ids = IdSequence::new();
        for driver in &drivers {
            ids.observe(driver.id.0);
            if let Some(max) = driver.ledger.max_entry_id() {
                ids.observe(max.0);
            }
        }

        let mut engine = RotationEngine {
            drivers,
            strategy,
            ids,
        };
        engine.recompute();
        engine
    }

    pub fn strategy(&self) -> PenaltyStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: PenaltyStrategy) {
        self.strategy = strategy;
    }

    /// All drivers, in queue order
    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    fn recompute(&mut self) {
        sort_queue(&mut self.drivers);
        debug!(drivers = self.drivers.len(), "queue recomputed");
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Full ordering computed afresh from the current ledgers
    pub fn queue(&self) -> Vec<&Driver> {
        let mut ordered: Vec<&Driver> = self.drivers.iter().collect();
        ordered.sort_by(|a, b| compare_drivers(a, b));
        ordered
    }

    /// Non-paused drivers in queue order
    pub fn active_queue(&self) -> Vec<&Driver> {
        self.queue().into_iter().filter(|d| !d.paused).collect()
    }

    /// The driver who gets the next load
    pub fn next_up(&self) -> Option<&Driver> {
        self.active_queue().into_iter().next()
    }

    /// 1-based rank among active drivers; None when paused or unknown
    pub fn rank_of(&self, id: DriverId) -> Option<usize> {
        self.active_queue()
            .iter()
            .position(|d| d.id == id)
            .map(|i| i + 1)
    }

    pub fn get(&self, id: DriverId) -> Result<&Driver> {
        self.drivers
            .iter()
            .find(|d| d.id == id)
            .ok_or(RotationError::NotFound(Missing::Driver(id)))
    }

    fn get_mut(&mut self, id: DriverId) -> Result<&mut Driver> {
        self.drivers
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(RotationError::NotFound(Missing::Driver(id)))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.name_matches(name))
    }

    /// Resolve a name to an id, for entry points that address drivers by name
    pub fn id_by_name(&self, name: &str) -> Result<DriverId> {
        self.find_by_name(name)
            .map(|d| d.id)
            .ok_or_else(|| RotationError::NotFound(Missing::Name(name.trim().to_string())))
    }

    /// Case-insensitive substring match on names, in queue order
    pub fn search(&self, term: &str) -> Vec<&Driver> {
        let term = term.trim().to_lowercase();
        self.queue()
            .into_iter()
            .filter(|d| d.name.to_lowercase().contains(&term))
            .collect()
    }

    /// Highest total among every driver except `id` (paused included), 0 when alone
    pub fn max_total_excluding(&self, id: DriverId) -> f64 {
        self.drivers
            .iter()
            .filter(|d| d.id != id)
            .map(|d| d.total_earnings())
            .fold(0.0, f64::max)
    }

    pub fn refusal_preview(&self, id: DriverId) -> Result<RefusalPreview> {
        let driver = self.get(id)?;
        let current_total = driver.total_earnings();
        let penalty_value = match self.strategy {
            PenaltyStrategy::CostPenalty => {
                cost_penalty_value(self.max_total_excluding(id), current_total)
            }
            PenaltyStrategy::ZeroValueRefusal => 0.0,
        };

        Ok(RefusalPreview {
            current_total,
            penalty_value,
            new_total: current_total + penalty_value,
        })
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    pub fn add_driver(&mut self, name: &str, now: DateTime<Utc>) -> Result<DriverId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RotationError::EmptyName);
        }
        if self.find_by_name(name).is_some() {
            return Err(RotationError::DuplicateName(name.to_string()));
        }

        let id = self.ids.next_driver_id(now);
        self.drivers.push(Driver::new(id, name.to_string()));
        self.recompute();

        info!(driver = %id, name, "driver added");
        Ok(id)
    }

    pub fn remove_driver(&mut self, id: DriverId) -> Result<Driver> {
        let index = self
            .drivers
            .iter()
            .position(|d| d.id == id)
            .ok_or(RotationError::NotFound(Missing::Driver(id)))?;
        let removed = self.drivers.remove(index);

        info!(driver = %id, name = %removed.name, "driver removed");
        Ok(removed)
    }

    pub fn register_freight(
        &mut self,
        id: DriverId,
        value: f64,
        now: DateTime<Utc>,
    ) -> Result<FreightEntry> {
        let entry_id = self.peek_entry_id(now);
        let driver = self.get_mut(id)?;
        if driver.paused {
            return Err(RotationError::DriverPaused(driver.name.clone()));
        }

        let entry = driver.ledger.append_freight(entry_id, value, now)?;
        self.ids.observe(entry_id.0);
        self.recompute();

        info!(driver = %id, entry = %entry.id, value, "freight registered");
        Ok(entry)
    }

    /// Apply the configured refusal strategy to `id`
    pub fn refuse_job(&mut self, id: DriverId, now: DateTime<Utc>) -> Result<FreightEntry> {
        let preview = self.refusal_preview(id)?;
        let kind = self.strategy.entry_kind();
        let entry_id = self.peek_entry_id(now);

        let driver = self.get_mut(id)?;
        if driver.paused {
            return Err(RotationError::DriverPaused(driver.name.clone()));
        }

        let entry = driver
            .ledger
            .append_penalty(entry_id, kind, preview.penalty_value, now)?;
        self.ids.observe(entry_id.0);
        self.recompute();

        info!(
            driver = %id,
            strategy = self.strategy.as_str(),
            penalty = preview.penalty_value,
            new_total = preview.new_total,
            "job refused"
        );
        Ok(entry)
    }

    /// Flip the paused flag and return the new state
    pub fn toggle_pause(&mut self, id: DriverId) -> Result<bool> {
        let driver = self.get_mut(id)?;
        driver.paused = !driver.paused;
        let paused = driver.paused;
        self.recompute();

        info!(driver = %id, paused, "pause toggled");
        Ok(paused)
    }

    /// Returns the previous value
    pub fn edit_entry(&mut self, id: DriverId, entry: EntryId, new_value: f64) -> Result<f64> {
        let previous = self.get_mut(id)?.ledger.edit_entry(id, entry, new_value)?;
        self.recompute();

        info!(driver = %id, entry = %entry, previous, new_value, "entry edited");
        Ok(previous)
    }

    pub fn remove_entry(&mut self, id: DriverId, entry: EntryId) -> Result<FreightEntry> {
        let removed = self.get_mut(id)?.ledger.remove_entry(id, entry)?;
        self.recompute();

        info!(driver = %id, entry = %entry, kind = removed.kind.as_str(), "entry removed");
        Ok(removed)
    }

    /// Start a new earnings period: every ledger emptied, identity and pause kept
    pub fn reset_period(&mut self) {
        for driver in &mut self.drivers {
            driver.ledger.clear();
        }
        self.recompute();

        info!(drivers = self.drivers.len(), "period reset");
    }

    /// Next entry id without consuming it; consumed via `observe` once the append succeeds
    fn peek_entry_id(&self, now: DateTime<Utc>) -> EntryId {
        let mut preview_ids = self.ids.clone();
        preview_ids.next_entry_id(now)
    }
}

impl Default for RotationEngine {
    fn default() -> Self {
        Self::new(PenaltyStrategy::default())
    }
}
