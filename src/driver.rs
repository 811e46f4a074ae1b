// 🚚 Driver - a participant in the rotation
//
// Identity: DriverId (assigned once, never changes)
// Values: name, ledger, paused flag

use crate::ledger::{EntryId, Ledger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub u64);

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub ledger: Ledger,
    pub paused: bool,
}

impl Driver {
    pub fn new(id: DriverId, name: String) -> Self {
        Driver {
            id,
            name,
            ledger: Ledger::new(),
            paused: false,
        }
    }

    pub fn total_earnings(&self) -> f64 {
        self.ledger.total_earnings()
    }

    pub fn real_earnings(&self) -> f64 {
        self.ledger.real_earnings()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.ledger.last_activity()
    }

    /// True when the most recent ledger entry is a penalty or refusal
    pub fn refused_last(&self) -> bool {
        self.ledger.last_is_disciplinary()
    }

    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }
}

// ============================================================================
// ID SEQUENCE
// ============================================================================

/// Hands out ids for drivers and entries.
///
/// Ids are epoch millis when the clock moves forward, otherwise last + 1, so
/// they stay unique and increasing and look like the millisecond ids older
/// data already carries.
#[derive(Debug, Clone, Default)]
pub struct IdSequence {
    last: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        IdSequence { last: 0 }
    }

    /// Seed from ids already in use
    pub fn observe(&mut self, id: u64) {
        self.last = self.last.max(id);
    }

    pub fn next(&mut self, now: DateTime<Utc>) -> u64 {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let id = millis.max(self.last + 1);
        self.last = id;
        id
    }

    pub fn next_driver_id(&mut self, now: DateTime<Utc>) -> DriverId {
        DriverId(self.next(now))
    }

    pub fn next_entry_id(&mut self, now: DateTime<Utc>) -> EntryId {
        EntryId(self.next(now))
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}
