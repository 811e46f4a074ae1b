// 💾 Persistence boundary - key-value store holding the whole roster
//
// One key, one value: a JSON array of driver records. The record shape is
// the one older browser builds wrote, so legacy rows are migrated here, once,
// at load time:
//   - no `freights`  → one synthetic entry from accumulatedRevenue/lastFreightDate
//   - no `isPaused`  → active
//   - no entry `type` → ordinary freight
//
// Records are decoded one at a time. A broken entry is repaired when its value
// is readable and dropped otherwise; it never takes the rest of the roster
// down with it.

use crate::driver::{Driver, DriverId};
use crate::ledger::{EntryId, EntryKind, FreightEntry, Ledger};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Key the roster has always been stored under
pub const DEFAULT_STORAGE_KEY: &str = "freightSystemDrivers";

// ============================================================================
// KEY-VALUE STORE
// ============================================================================

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&mut self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed store (WAL mode, one row per key)
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read key '{}'", key))?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                               updated_at = CURRENT_TIMESTAMP",
                params![key, value],
            )
            .with_context(|| format!("Failed to write key '{}'", key))?;
        Ok(())
    }
}

/// In-process store for tests and throwaway sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// WIRE RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRecord {
    pub id: u64,
    pub name: String,

    #[serde(default)]
    pub freights: Option<Vec<EntryRecord>>,

    #[serde(default)]
    pub is_paused: Option<bool>,

    // Pre-history shape: a running total and the date of the last load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulated_revenue: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_freight_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: u64,
    pub value: f64,
    pub date: DateTime<Utc>,

    #[serde(rename = "type", default = "default_kind")]
    pub kind: EntryKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_kind() -> EntryKind {
    EntryKind::Freight
}

impl From<&FreightEntry> for EntryRecord {
    fn from(entry: &FreightEntry) -> Self {
        EntryRecord {
            id: entry.id.0,
            value: entry.value,
            date: entry.timestamp,
            kind: entry.kind,
            description: entry.description.clone(),
        }
    }
}

impl From<EntryRecord> for FreightEntry {
    fn from(record: EntryRecord) -> Self {
        FreightEntry {
            id: EntryId(record.id),
            value: record.value,
            timestamp: record.date,
            kind: record.kind,
            description: record.description,
        }
    }
}

impl From<&Driver> for DriverRecord {
    fn from(driver: &Driver) -> Self {
        DriverRecord {
            id: driver.id.0,
            name: driver.name.clone(),
            freights: Some(driver.ledger.entries().iter().map(EntryRecord::from).collect()),
            is_paused: Some(driver.paused),
            accumulated_revenue: None,
            last_freight_date: None,
        }
    }
}

impl DriverRecord {
    /// Convert to the domain type, migrating legacy shapes
    pub fn into_driver(self) -> Driver {
        self.migrate().0
    }

    /// Domain driver plus the number of stored entries that had to be dropped
    fn migrate(self) -> (Driver, usize) {
        let entries: Vec<FreightEntry> = match self.freights {
            Some(records) => records.into_iter().map(FreightEntry::from).collect(),
            None => {
                warn!(driver = self.id, name = %self.name, "migrating legacy record without freight history");
                legacy_entries(self.accumulated_revenue, self.last_freight_date.as_deref())
            }
        };

        let before = entries.len();
        let entries: Vec<FreightEntry> = entries
            .into_iter()
            .filter(|e| {
                let keep = e.value.is_finite() && e.value >= 0.0;
                if !keep {
                    warn!(driver = self.id, entry = %e.id, value = e.value, "dropping negative stored entry");
                }
                keep
            })
            .collect();
        let dropped = before - entries.len();

        let driver = Driver {
            id: DriverId(self.id),
            name: self.name,
            ledger: Ledger::from_entries(entries),
            paused: self.is_paused.unwrap_or(false),
        };
        (driver, dropped)
    }
}

/// Synthetic history for a legacy record: one entry carrying the running total
fn legacy_entries(accumulated: Option<f64>, last_date: Option<&str>) -> Vec<FreightEntry> {
    let value = match accumulated {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => return Vec::new(),
    };

    let timestamp = last_date
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| {
            warn!(date = ?last_date, "unreadable lastFreightDate, using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        });

    vec![FreightEntry {
        id: EntryId(u64::try_from(timestamp.timestamp_millis()).unwrap_or(0)),
        value,
        timestamp,
        kind: EntryKind::Freight,
        description: None,
    }]
}

// ============================================================================
// ENCODE / DECODE
// ============================================================================

pub fn encode_drivers(drivers: &[Driver]) -> Result<String> {
    let records: Vec<DriverRecord> = drivers.iter().map(DriverRecord::from).collect();
    serde_json::to_string(&records).context("Failed to serialize drivers")
}

/// Outcome of decoding a stored roster record by record
#[derive(Debug, Clone, Default)]
pub struct DecodedRoster {
    pub drivers: Vec<Driver>,
    /// Entries rebuilt from a partial shape (missing id or date)
    pub repaired: usize,
    /// Drivers and entries that could not be kept
    pub dropped: usize,
}

impl DecodedRoster {
    pub fn is_lossy(&self) -> bool {
        self.dropped > 0
    }
}

/// Decode a stored roster. Only a value that is not a JSON array is an error.
pub fn decode_roster(json: &str) -> Result<DecodedRoster> {
    let values: Vec<Value> = serde_json::from_str(json).context("Failed to parse stored drivers")?;

    let mut roster = DecodedRoster::default();
    let mut seen = HashSet::new();

    for (index, mut value) in values.into_iter().enumerate() {
        let freights = value.as_object_mut().and_then(|o| o.remove("freights"));

        let mut record = match DriverRecord::deserialize(&value) {
            Ok(record) => record,
            Err(e) => {
                warn!(index, error = %e, "dropping unreadable driver record");
                roster.dropped += 1;
                continue;
            }
        };

        if let Some(Value::Array(items)) = freights {
            let (entries, repaired, dropped) = decode_entries(record.id, &items);
            roster.repaired += repaired;
            roster.dropped += dropped;
            record.freights = Some(entries);
        }

        let (driver, dropped) = record.migrate();
        roster.dropped += dropped;

        if !seen.insert(driver.name.to_lowercase()) {
            warn!(name = %driver.name, "duplicate driver name in stored data");
        }
        roster.drivers.push(driver);
    }

    Ok(roster)
}

pub fn decode_drivers(json: &str) -> Result<Vec<Driver>> {
    Ok(decode_roster(json)?.drivers)
}

/// Entries of one driver: (kept, repaired, dropped)
fn decode_entries(driver: u64, items: &[Value]) -> (Vec<EntryRecord>, usize, usize) {
    let mut entries = Vec::with_capacity(items.len());
    let mut without_id = Vec::new();
    let (mut repaired, mut dropped) = (0, 0);

    for item in items {
        match EntryRecord::deserialize(item) {
            Ok(entry) => entries.push(entry),
            Err(e) => match repair_entry(item) {
                Some((entry, has_id)) => {
                    warn!(driver, error = %e, value = entry.value, "repaired stored entry");
                    if !has_id {
                        without_id.push(entries.len());
                    }
                    entries.push(entry);
                    repaired += 1;
                }
                None => {
                    warn!(driver, error = %e, entry = %item, "dropping unreadable stored entry");
                    dropped += 1;
                }
            },
        }
    }

    // Fresh ids above everything this driver already has
    let mut next = entries.iter().map(|e| e.id).max().unwrap_or(0);
    for index in without_id {
        next += 1;
        entries[index].id = next;
    }

    (entries, repaired, dropped)
}

/// Rebuild an entry whose value is readable. Missing dates fall back to the
/// epoch like legacy records do; the bool says whether the id survived.
fn repair_entry(item: &Value) -> Option<(EntryRecord, bool)> {
    let value = item.get("value").and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().replace(',', ".").parse().ok()))
    })?;
    if !value.is_finite() {
        return None;
    }

    let kind = match item.get("type") {
        None | Some(Value::Null) => EntryKind::Freight,
        Some(kind) => EntryKind::deserialize(kind).ok()?,
    };

    let date = item
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc));

    let id = item.get("id").and_then(Value::as_u64);
    let description = item
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let entry = EntryRecord {
        id: id.unwrap_or(0),
        value,
        date,
        kind,
        description,
    };
    Some((entry, id.is_some()))
}

/// Copy a raw stored value to a side key before it gets overwritten.
/// Returns the key it was written under.
pub fn backup_value<S: KeyValueStore + ?Sized>(
    store: &mut S,
    key: &str,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut backup_key = format!("{}.backup", key);
    match store.get(&backup_key)? {
        Some(existing) if existing == raw => return Ok(backup_key),
        Some(_) => backup_key = format!("{}.{}", backup_key, now.timestamp_millis()),
        None => {}
    }

    store.put(&backup_key, raw)?;
    warn!(key, backup = %backup_key, bytes = raw.len(), "stored roster backed up");
    Ok(backup_key)
}

/// Load the roster; a missing key is an empty roster
pub fn load_drivers<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Result<Vec<Driver>> {
    match store.get(key)? {
        Some(json) => {
            let roster = decode_roster(&json)?;
            debug!(
                key,
                drivers = roster.drivers.len(),
                repaired = roster.repaired,
                dropped = roster.dropped,
                "roster loaded"
            );
            Ok(roster.drivers)
        }
        None => Ok(Vec::new()),
    }
}

pub fn save_drivers<S: KeyValueStore + ?Sized>(
    store: &mut S,
    key: &str,
    drivers: &[Driver],
) -> Result<()> {
    let json = encode_drivers(drivers)?;
    store.put(key, &json)?;
    debug!(key, drivers = drivers.len(), bytes = json.len(), "roster saved");
    Ok(())
}
