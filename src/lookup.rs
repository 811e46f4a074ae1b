// 🔍 Lookup - "where am I in the queue?"
//
// Read-only query over a driver collection, used by entry points that never
// mutate anything (the `lookup` command and the web server).

use crate::driver::Driver;
use crate::error::{Result, RotationError};
use crate::rotation::compare_drivers;
use serde::Serialize;

/// How close a driver is to the next load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Standing {
    /// First in line
    Next,
    /// Second or third
    Close,
    Waiting,
    Paused,
}

impl Standing {
    fn from_rank(rank: Option<usize>) -> Self {
        match rank {
            None => Standing::Paused,
            Some(1) => Standing::Next,
            Some(2..=3) => Standing::Close,
            Some(_) => Standing::Waiting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    pub found: bool,
    /// Name as stored, when found
    pub name: Option<String>,
    /// 1-based among active drivers; None when paused or not found
    pub rank: Option<usize>,
    pub total_earnings: Option<f64>,
    pub standing: Option<Standing>,
    /// First active driver, None when nobody is active
    pub next_driver_name: Option<String>,
}

/// Case-insensitive exact match on the trimmed name
pub fn lookup(drivers: &[Driver], name: &str) -> Result<LookupResult> {
    if name.trim().is_empty() {
        return Err(RotationError::EmptyName);
    }

    let mut ordered: Vec<&Driver> = drivers.iter().collect();
    ordered.sort_by(|a, b| compare_drivers(a, b));

    let active: Vec<&Driver> = ordered.iter().copied().filter(|d| !d.paused).collect();
    let next_driver_name = active.first().map(|d| d.name.clone());

    let Some(driver) = ordered.iter().find(|d| d.name_matches(name)) else {
        return Ok(LookupResult {
            found: false,
            name: None,
            rank: None,
            total_earnings: None,
            standing: None,
            next_driver_name,
        });
    };

    let rank = active.iter().position(|d| d.id == driver.id).map(|i| i + 1);

    Ok(LookupResult {
        found: true,
        name: Some(driver.name.clone()),
        rank,
        total_earnings: Some(driver.total_earnings()),
        standing: Some(Standing::from_rank(rank)),
        next_driver_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::{PenaltyStrategy, RotationEngine};
    use chrono::{DateTime, TimeZone, Utc};

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, 0, 0).unwrap()
    }

    fn roster() -> Vec<Driver> {
        let mut engine = RotationEngine::new(PenaltyStrategy::CostPenalty);
        let alice = engine.add_driver("Alice", t(8)).unwrap();
        let bob = engine.add_driver("Bob", t(8)).unwrap();
        engine.add_driver("Carol", t(8)).unwrap();
        let dave = engine.add_driver("Dave", t(8)).unwrap();
        engine.register_freight(alice, 300.0, t(9)).unwrap();
        engine.register_freight(bob, 100.0, t(9)).unwrap();
        engine.toggle_pause(dave).unwrap();
        engine.drivers().to_vec()
    }

    #[test]
    fn test_lookup_found() {
        let drivers = roster();

        let result = lookup(&drivers, "  alice ").unwrap();
        assert!(result.found);
        assert_eq!(result.name.as_deref(), Some("Alice"));
        assert_eq!(result.rank, Some(3));
        assert_eq!(result.total_earnings, Some(300.0));
        assert_eq!(result.standing, Some(Standing::Close));
        assert_eq!(result.next_driver_name.as_deref(), Some("Carol"));

        let carol = lookup(&drivers, "CAROL").unwrap();
        assert_eq!(carol.rank, Some(1));
        assert_eq!(carol.standing, Some(Standing::Next));
    }

    #[test]
    fn test_lookup_paused_has_no_rank() {
        let result = lookup(&roster(), "dave").unwrap();
        assert!(result.found);
        assert_eq!(result.rank, None);
        assert_eq!(result.standing, Some(Standing::Paused));
    }

    #[test]
    fn test_lookup_not_found_and_empty() {
        let drivers = roster();

        let result = lookup(&drivers, "Eve").unwrap();
        assert!(!result.found);
        assert_eq!(result.rank, None);
        assert_eq!(result.next_driver_name.as_deref(), Some("Carol"));

        assert_eq!(lookup(&drivers, "   "), Err(RotationError::EmptyName));
        assert_eq!(lookup(&[], "Alice").unwrap().next_driver_name, None);
    }

    #[test]
    fn test_lookup_does_not_reorder_input() {
        let drivers = roster();
        let before = drivers.clone();
        lookup(&drivers, "Bob").unwrap();
        assert_eq!(drivers, before);
    }

    #[test]
    fn test_standing_ranges() {
        assert_eq!(Standing::from_rank(Some(4)), Standing::Waiting);
        assert_eq!(Standing::from_rank(Some(2)), Standing::Close);
    }
}
