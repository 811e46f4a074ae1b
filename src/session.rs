// 🎛️ Session - one user action at a time
//
// Flow for every action:
//   validate → (confirm?) → mutate engine → persist (best effort) → notify
//
// Persistence is advisory. A failed write is logged and reported on the
// notification, the in-memory mutation stands.
//
// Stored data that could not be fully decoded is copied to a side key before
// the first save. If that copy cannot be made the session never writes.

use crate::driver::DriverId;
use crate::error::{Missing, Result, RotationError};
use crate::ledger::EntryId;
use crate::projection::format_money;
use crate::rotation::{PenaltyStrategy, RotationEngine};
use crate::store::{backup_value, decode_roster, save_drivers, KeyValueStore};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddDriver { name: String },
    RegisterFreight { driver: DriverId, value: f64 },
    RefuseJob { driver: DriverId, confirmed: bool },
    TogglePause { driver: DriverId },
    EditEntry { driver: DriverId, entry: EntryId, value: f64 },
    RemoveEntry { driver: DriverId, entry: EntryId, confirmed: bool },
    RemoveDriver { driver: DriverId, confirmed: bool },
    ResetPeriod { confirmed: bool },
}

impl Action {
    /// Same action with the confirmation flag set
    pub fn confirm(self) -> Self {
        match self {
            Action::RefuseJob { driver, .. } => Action::RefuseJob { driver, confirmed: true },
            Action::RemoveEntry { driver, entry, .. } => Action::RemoveEntry {
                driver,
                entry,
                confirmed: true,
            },
            Action::RemoveDriver { driver, .. } => Action::RemoveDriver { driver, confirmed: true },
            Action::ResetPeriod { .. } => Action::ResetPeriod { confirmed: true },
            other => other,
        }
    }
}

/// What an applied action changed
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    DriverAdded(DriverId),
    FreightRegistered { driver: DriverId, entry: EntryId },
    JobRefused { driver: DriverId, entry: EntryId, penalty: f64 },
    PauseToggled { driver: DriverId, paused: bool },
    EntryEdited { driver: DriverId, entry: EntryId, previous: f64 },
    EntryRemoved { driver: DriverId, entry: EntryId },
    DriverRemoved { driver: DriverId, name: String },
    PeriodReset,
}

/// Re-render signal for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub change: Change,
    pub message: String,
    /// False when the store write failed
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    RequiresConfirmation { prompt: String },
    Applied(Notification),
}

// ============================================================================
// SESSION
// ============================================================================

/// Copy unreadable stored data aside. False when the copy failed.
fn keep_raw<S: KeyValueStore>(store: &mut S, key: &str, raw: &str) -> bool {
    match backup_value(store, key, raw, Utc::now()) {
        Ok(_) => true,
        Err(e) => {
            let reason = format!("{:#}", e);
            error!(key, error = %reason, "could not back up stored roster");
            false
        }
    }
}

pub struct Session<S: KeyValueStore> {
    engine: RotationEngine,
    store: S,
    key: String,
    read_only: bool,
}

impl<S: KeyValueStore> Session<S> {
    /// Load the roster from `store`. Unreadable data starts an empty roster
    /// and is backed up before anything overwrites it.
    pub fn open(mut store: S, key: &str, strategy: PenaltyStrategy) -> Self {
        let (drivers, read_only) = match store.get(key) {
            Ok(None) => (Vec::new(), false),
            Ok(Some(raw)) => match decode_roster(&raw) {
                Ok(roster) if !roster.is_lossy() => (roster.drivers, false),
                Ok(roster) => {
                    warn!(key, dropped = roster.dropped, "stored roster was only partly readable");
                    let saved = keep_raw(&mut store, key, &raw);
                    (roster.drivers, !saved)
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(key, error = %reason, "could not load roster, starting empty");
                    let saved = keep_raw(&mut store, key, &raw);
                    (Vec::new(), !saved)
                }
            },
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(key, error = %reason, "could not read roster, changes will not be saved");
                (Vec::new(), true)
            }
        };

        info!(key, drivers = drivers.len(), strategy = strategy.as_str(), read_only, "session opened");
        Session {
            engine: RotationEngine::from_drivers(drivers, strategy),
            store,
            key: key.to_string(),
            read_only,
        }
    }

    /// True when stored data could not be preserved, so saving is disabled
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn engine(&self) -> &RotationEngine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) -> Result<Outcome> {
        if let Some(prompt) = self.confirmation_prompt(&action)? {
            return Ok(Outcome::RequiresConfirmation { prompt });
        }

        let (change, message) = self.mutate(action, now)?;
        let persisted = self.persist();

        Ok(Outcome::Applied(Notification {
            change,
            message,
            persisted,
        }))
    }

    /// Write the whole roster. Failures are logged and swallowed.
    pub fn persist(&mut self) -> bool {
        if self.read_only {
            error!(key = %self.key, "roster not saved: stored data could not be backed up");
            return false;
        }

        match save_drivers(&mut self.store, &self.key, self.engine.drivers()) {
            Ok(()) => true,
            Err(e) => {
                let err = RotationError::PersistenceFailure(format!("{:#}", e));
                error!(key = %self.key, error = %err, "roster not saved");
                false
            }
        }
    }

    /// Validates the action and returns a prompt when it still needs confirmation
    fn confirmation_prompt(&self, action: &Action) -> Result<Option<String>> {
        let prompt = match *action {
            Action::RefuseJob { driver, confirmed: false } => {
                let d = self.engine.get(driver)?;
                if d.paused {
                    return Err(RotationError::DriverPaused(d.name.clone()));
                }
                let preview = self.engine.refusal_preview(driver)?;
                format!(
                    "Register a refused load for '{}'? Rotation total goes from {} to {}.",
                    d.name,
                    format_money(preview.current_total),
                    format_money(preview.new_total)
                )
            }
            Action::RemoveEntry { driver, entry, confirmed: false } => {
                let d = self.engine.get(driver)?;
                let e = d
                    .ledger
                    .get(entry)
                    .ok_or(RotationError::NotFound(Missing::Entry { driver, entry }))?;
                format!(
                    "Delete the {} of {} from {} for '{}'?",
                    e.kind.as_str(),
                    format_money(e.value),
                    e.timestamp.format("%d/%m/%Y %H:%M"),
                    d.name
                )
            }
            Action::RemoveDriver { driver, confirmed: false } => {
                let d = self.engine.get(driver)?;
                format!(
                    "Remove driver '{}'? Their {} ledger entries will be lost.",
                    d.name,
                    d.ledger.len()
                )
            }
            Action::ResetPeriod { confirmed: false } => format!(
                "Start a new period? The ledgers of all {} drivers will be cleared.",
                self.engine.len()
            ),
            _ => return Ok(None),
        };
        Ok(Some(prompt))
    }

    fn mutate(&mut self, action: Action, now: DateTime<Utc>) -> Result<(Change, String)> {
        let engine = &mut self.engine;
        let applied = match action {
            Action::AddDriver { name } => {
                let id = engine.add_driver(&name, now)?;
                (Change::DriverAdded(id), format!("Driver '{}' added", name.trim()))
            }
            Action::RegisterFreight { driver, value } => {
                let entry = engine.register_freight(driver, value, now)?;
                let name = &engine.get(driver)?.name;
                (
                    Change::FreightRegistered { driver, entry: entry.id },
                    format!("Freight of {} registered for '{}'", format_money(value), name),
                )
            }
            Action::RefuseJob { driver, .. } => {
                let entry = engine.refuse_job(driver, now)?;
                let name = &engine.get(driver)?.name;
                (
                    Change::JobRefused { driver, entry: entry.id, penalty: entry.value },
                    format!("Refused load registered for '{}'", name),
                )
            }
            Action::TogglePause { driver } => {
                let paused = engine.toggle_pause(driver)?;
                let name = &engine.get(driver)?.name;
                let state = if paused { "paused" } else { "back in the queue" };
                (
                    Change::PauseToggled { driver, paused },
                    format!("'{}' is {}", name, state),
                )
            }
            Action::EditEntry { driver, entry, value } => {
                let previous = engine.edit_entry(driver, entry, value)?;
                (
                    Change::EntryEdited { driver, entry, previous },
                    format!("Entry changed from {} to {}", format_money(previous), format_money(value)),
                )
            }
            Action::RemoveEntry { driver, entry, .. } => {
                let removed = engine.remove_entry(driver, entry)?;
                (
                    Change::EntryRemoved { driver, entry },
                    format!("Entry of {} deleted", format_money(removed.value)),
                )
            }
            Action::RemoveDriver { driver, .. } => {
                let removed = engine.remove_driver(driver)?;
                let message = format!("Driver '{}' removed", removed.name);
                (Change::DriverRemoved { driver, name: removed.name }, message)
            }
            Action::ResetPeriod { .. } => {
                engine.reset_period();
                (Change::PeriodReset, "New period started".to_string())
            }
        };
        Ok(applied)
    }
}
