// 📤 Exports - text and files meant to leave the app
//
// - share text: the ranking posted to the drivers' group (active drivers only)
// - rules text: the announcement explaining how the rotation works
// - period statement: every ledger entry as CSV, archived before a reset

use crate::rotation::{PenaltyStrategy, RotationEngine};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

const RULE: &str = "-----------------------------------";

// ============================================================================
// SHARE TEXT
// ============================================================================

/// Ranking of active drivers, one `"{rank}º - {name}"` line each, ranks right-aligned
pub fn share_text(engine: &RotationEngine, title: &str, today: NaiveDate) -> String {
    let active = engine.active_queue();

    let mut text = format!("*{}*\n_Updated: {}_\n{}\n\n", title, today.format("%d/%m/%Y"), RULE);

    if active.is_empty() {
        text.push_str("No drivers in the queue.\n");
    } else {
        let width = active.len().to_string().len();
        for (i, driver) in active.iter().enumerate() {
            text.push_str(&format!("{:>width$}º - {}\n", i + 1, driver.name, width = width));
        }
    }

    text.push_str(RULE);
    text
}

// ============================================================================
// RULES ANNOUNCEMENT
// ============================================================================

pub fn rules_text(strategy: PenaltyStrategy) -> String {
    let refusal = match strategy {
        PenaltyStrategy::CostPenalty => {
            "A driver who *refuses a load on the spot* receives a *penalty*: their rotation \
             total is raised just above the highest total in the list, which moves them to \
             the *end of the queue*. They climb back as the others load and their totals grow."
        }
        PenaltyStrategy::ZeroValueRefusal => {
            "A driver who *refuses a load on the spot* has the refusal recorded with no value. \
             It counts as their most recent activity, so they lose every tie with drivers \
             who have the same total."
        }
    };

    format!(
        "*IMPORTANT NOTICE: NEW FREIGHT ROTATION SYSTEM*\n\
         \n\
         Attention, drivers!\n\
         \n\
         *1. HOW THE QUEUE WORKS*\n\
         The queue is based entirely on earnings in the current period. It runs from the \
         driver who *earned the least* to the one who *earned the most*, so the next load \
         goes to whoever is furthest behind.\n\
         \n\
         *2. WHAT IF SOMEONE REFUSES A LOAD?*\n\
         {}\n\
         \n\
         *3. WHAT IF I AM UNAVAILABLE?*\n\
         Let the dispatcher know in advance. Your name will be *paused*: you leave the queue \
         for a while with no penalty. When you are back you return at the position your \
         current total gives you.\n\
         \n\
         *4. HOW DO I KNOW MY POSITION?*\n\
         The updated ranking is shared in the group every day.\n\
         \n\
         Thanks for helping keep the rotation fair for everyone.",
        refusal
    )
}

// ============================================================================
// PERIOD STATEMENT (CSV)
// ============================================================================

#[derive(Debug, Serialize)]
struct StatementRow<'a> {
    driver: &'a str,
    entry_id: u64,
    date: String,
    kind: &'static str,
    value: f64,
    description: &'a str,
}

/// One row per ledger entry, drivers in queue order, entries oldest first.
/// Returns the number of rows written.
pub fn write_statement_csv<W: Write>(engine: &RotationEngine, out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    let mut rows = 0;

    for driver in engine.queue() {
        for entry in driver.ledger.entries() {
            writer
                .serialize(StatementRow {
                    driver: &driver.name,
                    entry_id: entry.id.0,
                    date: entry.timestamp.to_rfc3339(),
                    kind: entry.kind.as_str(),
                    value: entry.value,
                    description: entry.description.as_deref().unwrap_or(""),
                })
                .with_context(|| format!("Failed to write entry {} of {}", entry.id, driver.name))?;
            rows += 1;
        }
    }

    writer.flush().context("Failed to flush statement")?;
    Ok(rows)
}

pub fn write_statement_file(engine: &RotationEngine, path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create statement: {}", path.display()))?;
    write_statement_csv(engine, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
    }

    #[test]
    fn test_share_text_omits_paused() {
        let mut engine = RotationEngine::new(PenaltyStrategy::CostPenalty);
        let alice = engine.add_driver("Alice", t(8)).unwrap();
        engine.add_driver("Bob", t(8)).unwrap();
        let carol = engine.add_driver("Carol", t(8)).unwrap();
        engine.register_freight(alice, 100.0, t(9)).unwrap();
        engine.toggle_pause(carol).unwrap();

        let text = share_text(&engine, "FREIGHT ROTATION", today());
        let expected = "*FREIGHT ROTATION*\n\
                        _Updated: 05/03/2025_\n\
                        -----------------------------------\n\
                        \n\
                        1º - Bob\n\
                        2º - Alice\n\
                        -----------------------------------";
        assert_eq!(text, expected);
        assert!(!text.contains("Carol"));
    }

    #[test]
    fn test_share_text_right_aligns_ranks() {
        let mut engine = RotationEngine::new(PenaltyStrategy::CostPenalty);
        for i in 0..10 {
            engine.add_driver(&format!("Driver {:02}", i), t(8)).unwrap();
        }

        let text = share_text(&engine, "Q", today());
        assert!(text.contains("\n 1º - Driver 00\n"));
        assert!(text.contains("\n10º - Driver 09\n"));
    }

    #[test]
    fn test_share_text_empty_queue() {
        let engine = RotationEngine::new(PenaltyStrategy::CostPenalty);
        let text = share_text(&engine, "Q", today());
        assert!(text.contains("No drivers in the queue."));
    }

    #[test]
    fn test_rules_text_follows_strategy() {
        assert!(rules_text(PenaltyStrategy::CostPenalty).contains("end of the queue"));
        assert!(rules_text(PenaltyStrategy::ZeroValueRefusal).contains("with no value"));
        assert!(rules_text(PenaltyStrategy::CostPenalty).contains("*paused*"));
    }

    #[test]
    fn test_statement_csv() {
        let mut engine = RotationEngine::new(PenaltyStrategy::CostPenalty);
        let alice = engine.add_driver("Alice", t(8)).unwrap();
        let bob = engine.add_driver("Bob", t(8)).unwrap();
        engine.register_freight(alice, 100.0, t(9)).unwrap();
        engine.refuse_job(bob, t(10)).unwrap();

        let mut out = Vec::new();
        let rows = write_statement_csv(&engine, &mut out).unwrap();
        assert_eq!(rows, 2);

        let csv = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "driver,entry_id,date,kind,value,description");
        assert!(lines[1].starts_with("Alice,"));
        assert!(lines[1].ends_with(",freight,100.0,Regular freight of 100.00"));
        assert!(lines[2].starts_with("Bob,"));
        assert!(lines[2].ends_with(",penalty,101.0,Refused load"));
    }
}
