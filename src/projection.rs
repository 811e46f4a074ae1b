// 📊 Projection - read-only view of the queue for presentation layers
//
// One row per driver, in queue order. Nothing here mutates the engine.

use crate::driver::{Driver, DriverId};
use crate::ledger::FreightEntry;
use crate::rotation::RotationEngine;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;

/// Wall-clock now in the machine's time zone, for the week breakdown
pub fn local_now() -> DateTime<Local> {
    Local::now()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRow {
    pub id: DriverId,
    /// 1-based among active drivers, None when paused
    pub rank: Option<usize>,
    pub name: String,
    pub total_earnings: f64,
    pub real_earnings: f64,
    /// Real earnings Mon..Sun for the current week
    pub week: [f64; 7],
    /// Newest first
    pub history: Vec<FreightEntry>,
    pub paused: bool,
    pub refused_last: bool,
}

impl DriverRow {
    pub fn from_driver<Tz: TimeZone>(driver: &Driver, rank: Option<usize>, now: &DateTime<Tz>) -> Self {
        DriverRow {
            id: driver.id,
            rank,
            name: driver.name.clone(),
            total_earnings: driver.total_earnings(),
            real_earnings: driver.real_earnings(),
            week: driver.ledger.week_breakdown(now).days,
            history: driver
                .ledger
                .history_newest_first()
                .into_iter()
                .cloned()
                .collect(),
            paused: driver.paused,
            refused_last: driver.refused_last(),
        }
    }

    /// Rank column text: "1º", or "-" for paused drivers
    pub fn rank_label(&self) -> String {
        match self.rank {
            Some(rank) => format!("{}º", rank),
            None => "-".to_string(),
        }
    }
}

/// Every driver in queue order, active drivers ranked 1..n
pub fn project<Tz: TimeZone>(engine: &RotationEngine, now: DateTime<Tz>) -> Vec<DriverRow> {
    let mut next_rank = 0;
    engine
        .queue()
        .into_iter()
        .map(|driver| {
            let rank = if driver.paused {
                None
            } else {
                next_rank += 1;
                Some(next_rank)
            };
            DriverRow::from_driver(driver, rank, &now)
        })
        .collect()
}

// ============================================================================
// MONEY
// ============================================================================

/// Brazilian-real style: `R$ 1.234,56`
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let units = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}R$ {},{:02}", sign, grouped, fraction)
}

/// Week cell text: zero renders as `---`
pub fn week_cell(value: f64) -> String {
    if value == 0.0 {
        "---".to_string()
    } else {
        format_money(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::PenaltyStrategy;
    use chrono::{FixedOffset, TimeZone, Utc};

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "R$ 0,00");
        assert_eq!(format_money(5.5), "R$ 5,50");
        assert_eq!(format_money(100.0), "R$ 100,00");
        assert_eq!(format_money(1234.56), "R$ 1.234,56");
        assert_eq!(format_money(1_000_000.0), "R$ 1.000.000,00");
        assert_eq!(format_money(-12.3), "-R$ 12,30");
        assert_eq!(week_cell(0.0), "---");
        assert_eq!(week_cell(80.0), "R$ 80,00");
    }

    #[test]
    fn test_project_ranks_and_history() {
        let t = |h| Utc.with_ymd_and_hms(2025, 3, 5, h, 0, 0).unwrap();
        let now = FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 5, 18, 0, 0)
            .unwrap();

        let mut engine = RotationEngine::new(PenaltyStrategy::CostPenalty);
        let alice = engine.add_driver("Alice", t(8)).unwrap();
        let bob = engine.add_driver("Bob", t(8)).unwrap();
        let carol = engine.add_driver("Carol", t(8)).unwrap();
        engine.register_freight(alice, 100.0, t(12)).unwrap();
        engine.register_freight(alice, 50.0, t(13)).unwrap();
        engine.refuse_job(bob, t(14)).unwrap();
        engine.toggle_pause(carol).unwrap();

        let rows = project(&engine, now);
        let view: Vec<(&str, Option<usize>)> =
            rows.iter().map(|r| (r.name.as_str(), r.rank)).collect();
        assert_eq!(view, vec![("Alice", Some(1)), ("Bob", Some(2)), ("Carol", None)]);

        let alice_row = &rows[0];
        assert_eq!(alice_row.total_earnings, 150.0);
        assert_eq!(alice_row.real_earnings, 150.0);
        assert_eq!(alice_row.history[0].value, 50.0);
        assert_eq!(alice_row.week[2], 150.0); // Wednesday
        assert!(!alice_row.refused_last);

        let bob_row = &rows[1];
        assert_eq!(bob_row.total_earnings, 151.0);
        assert_eq!(bob_row.real_earnings, 0.0);
        assert_eq!(bob_row.week, [0.0; 7]);
        assert!(bob_row.refused_last);

        assert!(rows[2].paused);
        assert_eq!(rows[2].rank_label(), "-");
        assert_eq!(rows[0].rank_label(), "1º");
    }
}
