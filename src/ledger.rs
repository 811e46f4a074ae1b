// 📒 Ledger - per-driver freight history
//
// Entries are kept sorted ascending by timestamp after every mutation.
// Nothing derived (totals, last activity) is ever stored: it is recomputed
// from the entries on every read.

use crate::error::{Missing, Result, RotationError};
use crate::driver::DriverId;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENTRY TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Ordinary paid freight
    Freight,

    /// Refusal under the cost strategy: carries a synthetic value
    Penalty,

    /// Refusal under the zero-value strategy
    Refusal,
}

impl EntryKind {
    /// Penalty and refusal entries affect rank but are not real income
    pub fn is_disciplinary(&self) -> bool {
        !matches!(self, EntryKind::Freight)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Freight => "freight",
            EntryKind::Penalty => "penalty",
            EntryKind::Refusal => "refusal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreightEntry {
    pub id: EntryId,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub description: Option<String>,
}

impl FreightEntry {
    pub fn is_disciplinary(&self) -> bool {
        self.kind.is_disciplinary()
    }
}

/// Reject anything that is not a finite, strictly positive amount
pub fn validate_value(value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RotationError::InvalidValue(value.to_string()));
    }
    Ok(value)
}

/// Parse user input such as "100", "100.5" or "100,50"
pub fn parse_value(input: &str) -> Result<f64> {
    let normalized = input.trim().replace(',', ".");
    let value: f64 = normalized
        .parse()
        .map_err(|_| RotationError::InvalidValue(input.trim().to_string()))?;
    validate_value(value)
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    entries: Vec<FreightEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger { entries: Vec::new() }
    }

    /// Build a ledger from stored entries, restoring timestamp order
    pub fn from_entries(mut entries: Vec<FreightEntry>) -> Self {
        entries.sort_by_key(|e| e.timestamp);
        Ledger { entries }
    }

    pub fn entries(&self) -> &[FreightEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&FreightEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Append an ordinary freight entry
    pub fn append_freight(
        &mut self,
        id: EntryId,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<FreightEntry> {
        let value = validate_value(value)?;
        self.insert(FreightEntry {
            id,
            value,
            timestamp,
            kind: EntryKind::Freight,
            description: Some(format!("Regular freight of {:.2}", value)),
        })
    }

    /// Append a disciplinary entry. Zero is allowed (refusal), negatives are not.
    pub fn append_penalty(
        &mut self,
        id: EntryId,
        kind: EntryKind,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<FreightEntry> {
        if !value.is_finite() || value < 0.0 || !kind.is_disciplinary() {
            return Err(RotationError::InvalidValue(value.to_string()));
        }
        self.insert(FreightEntry {
            id,
            value,
            timestamp,
            kind,
            description: Some("Refused load".to_string()),
        })
    }

    fn insert(&mut self, entry: FreightEntry) -> Result<FreightEntry> {
        self.entries.push(entry.clone());
        // Stable: equal timestamps keep insertion order
        self.entries.sort_by_key(|e| e.timestamp);
        Ok(entry)
    }

    /// Change the value of an ordinary entry. Order is untouched: the sort key is the timestamp.
    pub fn edit_entry(&mut self, owner: DriverId, id: EntryId, new_value: f64) -> Result<f64> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RotationError::NotFound(Missing::Entry { driver: owner, entry: id }))?;

        if entry.is_disciplinary() {
            return Err(RotationError::Immutable(id));
        }

        let new_value = validate_value(new_value)?;
        let previous = entry.value;
        entry.value = new_value;
        Ok(previous)
    }

    pub fn remove_entry(&mut self, owner: DriverId, id: EntryId) -> Result<FreightEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(RotationError::NotFound(Missing::Entry { driver: owner, entry: id }))?;
        Ok(self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // ========================================================================
    // DERIVED VALUES
    // ========================================================================

    /// Sum of every entry, penalties included. This is what the queue sorts on.
    pub fn total_earnings(&self) -> f64 {
        self.entries.iter().fold(0.0, |acc, e| acc + e.value)
    }

    /// Sum of ordinary freight only
    pub fn real_earnings(&self) -> f64 {
        self.entries
            .iter()
            .filter(|e| !e.is_disciplinary())
            .fold(0.0, |acc, e| acc + e.value)
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|e| e.timestamp)
    }

    /// Last activity in epoch millis, 0 when the ledger is empty
    pub fn last_activity_millis(&self) -> i64 {
        self.last_activity().map_or(0, |t| t.timestamp_millis())
    }

    pub fn last_is_disciplinary(&self) -> bool {
        self.entries.last().map_or(false, |e| e.is_disciplinary())
    }

    pub fn max_entry_id(&self) -> Option<EntryId> {
        self.entries.iter().map(|e| e.id).max()
    }

    /// Entries newest first, for history display
    pub fn history_newest_first(&self) -> Vec<&FreightEntry> {
        self.entries.iter().rev().collect()
    }

    /// Real earnings per weekday (Mon..Sun) of the calendar week containing `now`.
    /// Each entry is placed by its own local date in `now`'s time zone.
    pub fn week_breakdown<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> WeekBreakdown {
        let zone = now.timezone();
        let window = WeekWindow::containing(now);
        let mut days = [0.0; 7];

        for entry in self.entries.iter().filter(|e| !e.is_disciplinary()) {
            let day = entry.timestamp.with_timezone(&zone).date_naive();
            if window.contains(day) {
                days[day.weekday().num_days_from_monday() as usize] += entry.value;
            }
        }

        WeekBreakdown { days }
    }
}

// ============================================================================
// WEEK WINDOW
// ============================================================================

/// Monday 00:00:00.000 through Sunday 23:59:59.999 local time, held as the
/// two calendar dates so offset changes inside the week do not shift it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub monday: NaiveDate,
    pub sunday: NaiveDate,
}

impl WeekWindow {
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let today = now.date_naive();
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        WeekWindow {
            monday,
            sunday: monday + Duration::days(6),
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.monday && day <= self.sunday
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeekBreakdown {
    /// Index 0 is Monday, 6 is Sunday
    pub days: [f64; 7],
}

impl WeekBreakdown {
    pub const LABELS: [&'static str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    pub fn total(&self) -> f64 {
        self.days.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, LocalResult, NaiveDateTime, NaiveTime, TimeZone};

    const OWNER: DriverId = DriverId(1);

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_append_keeps_timestamp_order() {
        let mut ledger = Ledger::new();
        ledger.append_freight(EntryId(1), 50.0, at(2025, 3, 5, 10)).unwrap();
        ledger.append_freight(EntryId(2), 80.0, at(2025, 3, 3, 10)).unwrap();
        ledger.append_freight(EntryId(3), 20.0, at(2025, 3, 4, 10)).unwrap();

        let ids: Vec<u64> = ledger.entries().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(ledger.last_activity(), Some(at(2025, 3, 5, 10)));
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let mut ledger = Ledger::new();
        let t = at(2025, 3, 5, 10);
        ledger.append_freight(EntryId(10), 1.0, t).unwrap();
        ledger.append_freight(EntryId(11), 2.0, t).unwrap();
        ledger.append_freight(EntryId(12), 3.0, t).unwrap();

        let ids: Vec<u64> = ledger.entries().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_append_freight_rejects_bad_values() {
        let mut ledger = Ledger::new();
        let t = at(2025, 3, 5, 10);
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = ledger.append_freight(EntryId(1), bad, t).unwrap_err();
            assert!(matches!(err, RotationError::InvalidValue(_)), "{} accepted", bad);
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("100").unwrap(), 100.0);
        assert_eq!(parse_value(" 12,50 ").unwrap(), 12.5);
        assert!(matches!(parse_value("abc"), Err(RotationError::InvalidValue(_))));
        assert!(matches!(parse_value("-1"), Err(RotationError::InvalidValue(_))));
        assert!(matches!(parse_value("0"), Err(RotationError::InvalidValue(_))));
    }

    #[test]
    fn test_penalty_accepts_zero_but_not_freight_kind() {
        let mut ledger = Ledger::new();
        let t = at(2025, 3, 5, 10);
        ledger.append_penalty(EntryId(1), EntryKind::Refusal, 0.0, t).unwrap();
        assert!(ledger.append_penalty(EntryId(2), EntryKind::Penalty, -1.0, t).is_err());
        assert!(ledger.append_penalty(EntryId(3), EntryKind::Freight, 5.0, t).is_err());
        assert_eq!(ledger.len(), 1);
        assert!(ledger.last_is_disciplinary());
    }

    #[test]
    fn test_totals() {
        let mut ledger = Ledger::new();
        ledger.append_freight(EntryId(1), 100.0, at(2025, 3, 3, 9)).unwrap();
        ledger.append_freight(EntryId(2), 50.5, at(2025, 3, 4, 9)).unwrap();
        ledger.append_penalty(EntryId(3), EntryKind::Penalty, 30.0, at(2025, 3, 5, 9)).unwrap();

        assert_eq!(ledger.total_earnings(), 180.5);
        assert_eq!(ledger.real_earnings(), 150.5);

        let sum: f64 = ledger.entries().iter().map(|e| e.value).sum();
        assert_eq!(ledger.total_earnings(), sum);
    }

    #[test]
    fn test_empty_ledger_sentinels() {
        let ledger = Ledger::new();
        assert_eq!(ledger.total_earnings(), 0.0);
        assert_eq!(ledger.real_earnings(), 0.0);
        assert_eq!(ledger.last_activity(), None);
        assert_eq!(ledger.last_activity_millis(), 0);
        assert!(!ledger.last_is_disciplinary());
    }

    #[test]
    fn test_edit_entry() {
        let mut ledger = Ledger::new();
        ledger.append_freight(EntryId(1), 100.0, at(2025, 3, 3, 9)).unwrap();
        ledger.append_freight(EntryId(2), 40.0, at(2025, 3, 4, 9)).unwrap();

        let previous = ledger.edit_entry(OWNER, EntryId(1), 120.0).unwrap();
        assert_eq!(previous, 100.0);

        let entry = ledger.get(EntryId(1)).unwrap();
        assert_eq!(entry.value, 120.0);
        assert_eq!(entry.timestamp, at(2025, 3, 3, 9));
        assert_eq!(entry.kind, EntryKind::Freight);
        assert_eq!(ledger.entries()[0].id, EntryId(1));
    }

    #[test]
    fn test_edit_entry_failures() {
        let mut ledger = Ledger::new();
        ledger.append_freight(EntryId(1), 100.0, at(2025, 3, 3, 9)).unwrap();
        ledger.append_penalty(EntryId(2), EntryKind::Penalty, 101.0, at(2025, 3, 4, 9)).unwrap();

        assert_eq!(
            ledger.edit_entry(OWNER, EntryId(9), 10.0),
            Err(RotationError::NotFound(Missing::Entry { driver: OWNER, entry: EntryId(9) }))
        );
        assert_eq!(
            ledger.edit_entry(OWNER, EntryId(2), 10.0),
            Err(RotationError::Immutable(EntryId(2)))
        );
        assert_eq!(ledger.get(EntryId(2)).unwrap().value, 101.0);

        assert!(matches!(
            ledger.edit_entry(OWNER, EntryId(1), 0.0),
            Err(RotationError::InvalidValue(_))
        ));
        assert_eq!(ledger.get(EntryId(1)).unwrap().value, 100.0);
    }

    #[test]
    fn test_remove_entry() {
        let mut ledger = Ledger::new();
        ledger.append_freight(EntryId(1), 100.0, at(2025, 3, 3, 9)).unwrap();
        ledger.append_penalty(EntryId(2), EntryKind::Penalty, 101.0, at(2025, 3, 4, 9)).unwrap();

        // Penalties can be deleted even though they cannot be edited
        let removed = ledger.remove_entry(OWNER, EntryId(2)).unwrap();
        assert_eq!(removed.kind, EntryKind::Penalty);
        assert_eq!(ledger.total_earnings(), 100.0);

        assert!(ledger.remove_entry(OWNER, EntryId(2)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_history_newest_first() {
        let mut ledger = Ledger::new();
        ledger.append_freight(EntryId(1), 1.0, at(2025, 3, 3, 9)).unwrap();
        ledger.append_freight(EntryId(2), 2.0, at(2025, 3, 4, 9)).unwrap();

        let history: Vec<u64> = ledger.history_newest_first().iter().map(|e| e.id.0).collect();
        assert_eq!(history, vec![2, 1]);
    }

    #[test]
    fn test_week_window_bounds() {
        // Wednesday 2025-03-05
        let now = at(2025, 3, 5, 15);
        let window = WeekWindow::containing(&now);

        assert_eq!(window.monday, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(window.sunday, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert!(window.contains(window.sunday));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()));

        // Sunday belongs to the week that started the previous Monday
        let sunday = at(2025, 3, 9, 20);
        assert_eq!(WeekWindow::containing(&sunday), window);
    }

    #[test]
    fn test_week_breakdown() {
        let mut ledger = Ledger::new();
        // Previous week: ignored
        ledger.append_freight(EntryId(1), 999.0, at(2025, 3, 2, 23)).unwrap();
        // Monday
        ledger.append_freight(EntryId(2), 100.0, at(2025, 3, 3, 8)).unwrap();
        ledger.append_freight(EntryId(3), 50.0, at(2025, 3, 3, 18)).unwrap();
        // Wednesday penalty: ignored
        ledger.append_penalty(EntryId(4), EntryKind::Penalty, 500.0, at(2025, 3, 5, 9)).unwrap();
        // Sunday
        ledger.append_freight(EntryId(5), 70.0, at(2025, 3, 9, 22)).unwrap();

        let week = ledger.week_breakdown(&at(2025, 3, 5, 12));
        assert_eq!(week.days, [150.0, 0.0, 0.0, 0.0, 0.0, 0.0, 70.0]);
        assert_eq!(week.total(), 220.0);
    }

    #[test]
    fn test_week_breakdown_respects_offset() {
        let mut ledger = Ledger::new();
        // 02:00 UTC Monday is still Sunday evening at UTC-3
        ledger.append_freight(EntryId(1), 40.0, at(2025, 3, 3, 2)).unwrap();

        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        let now = at(2025, 3, 5, 12).with_timezone(&brt);
        let week = ledger.week_breakdown(&now);

        // Falls in the previous local week
        assert_eq!(week.total(), 0.0);
    }

    /// UTC-3 until 2025-03-05 03:00 UTC, UTC-2 from then on
    #[derive(Debug, Clone, Copy)]
    struct ShiftingZone;

    impl ShiftingZone {
        fn switch() -> NaiveDateTime {
            at(2025, 3, 5, 3).naive_utc()
        }

        fn before() -> FixedOffset {
            FixedOffset::west_opt(3 * 3600).unwrap()
        }

        fn after() -> FixedOffset {
            FixedOffset::west_opt(2 * 3600).unwrap()
        }
    }

    impl TimeZone for ShiftingZone {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            ShiftingZone
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::default()))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let utc_with = |o: FixedOffset| *local - Duration::seconds(o.local_minus_utc() as i64);
            let fits_before = utc_with(Self::before()) < Self::switch();
            let fits_after = utc_with(Self::after()) >= Self::switch();
            match (fits_before, fits_after) {
                (true, true) => LocalResult::Ambiguous(Self::before(), Self::after()),
                (true, false) => LocalResult::Single(Self::before()),
                (false, true) => LocalResult::Single(Self::after()),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::default()))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch() {
                Self::before()
            } else {
                Self::after()
            }
        }
    }

    #[test]
    fn test_week_breakdown_across_offset_change() {
        let mut ledger = Ledger::new();
        // Sunday 23:30 at UTC-3, the offset in force when it happened
        ledger.append_freight(EntryId(1), 40.0, Utc.with_ymd_and_hms(2025, 3, 3, 2, 30, 0).unwrap()).unwrap();
        // Monday 01:00 at UTC-3
        ledger.append_freight(EntryId(2), 60.0, at(2025, 3, 3, 4)).unwrap();

        // Thursday, already on UTC-2
        let now = at(2025, 3, 6, 12).with_timezone(&ShiftingZone);
        let week = ledger.week_breakdown(&now);

        assert_eq!(week.days, [60.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
