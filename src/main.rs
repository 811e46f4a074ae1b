// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;

// Use library instead of local modules
use freight_rotation::{
    export, format_money, local_now, logging, lookup, parse_value, project, week_cell,
    Action, Config, EntryId, Outcome, Session, SqliteStore, Standing, WeekBreakdown,
};

type AppSession = Session<SqliteStore>;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::load()?;

    if args.is_empty() {
        // UI mode (default)
        return run_ui_mode(&config);
    }

    logging::init();
    run_command(&config, &args)
}

fn open_session(config: &Config) -> Result<AppSession> {
    let store = SqliteStore::open(&config.database_path)?;
    Ok(Session::open(store, &config.storage_key, config.penalty_strategy))
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_command(config: &Config, args: &[String]) -> Result<()> {
    let yes = args.iter().any(|a| a == "--yes" || a == "-y");
    let rest: Vec<&str> = args[1..]
        .iter()
        .map(String::as_str)
        .filter(|a| *a != "--yes" && *a != "-y")
        .collect();

    match args[0].as_str() {
        "add" => {
            let mut session = open_session(config)?;
            apply(&mut session, Action::AddDriver { name: joined(&rest)? }, yes)
        }
        "freight" => {
            let (name, [value]) = name_then::<1>(&rest, "freight <name> <value>")?;
            let mut session = open_session(config)?;
            let driver = session.engine().id_by_name(&name)?;
            let value = parse_value(value)?;
            apply(&mut session, Action::RegisterFreight { driver, value }, yes)
        }
        "refuse" => {
            let mut session = open_session(config)?;
            let driver = session.engine().id_by_name(&joined(&rest)?)?;
            apply(&mut session, Action::RefuseJob { driver, confirmed: yes }, yes)
        }
        "pause" => {
            let mut session = open_session(config)?;
            let driver = session.engine().id_by_name(&joined(&rest)?)?;
            apply(&mut session, Action::TogglePause { driver }, yes)
        }
        "edit" => {
            let (name, [entry, value]) = name_then::<2>(&rest, "edit <name> <entry-id> <value>")?;
            let mut session = open_session(config)?;
            let driver = session.engine().id_by_name(&name)?;
            let entry = parse_entry_id(entry)?;
            let value = parse_value(value)?;
            apply(&mut session, Action::EditEntry { driver, entry, value }, yes)
        }
        "delete-entry" => {
            let (name, [entry]) = name_then::<1>(&rest, "delete-entry <name> <entry-id>")?;
            let mut session = open_session(config)?;
            let driver = session.engine().id_by_name(&name)?;
            let entry = parse_entry_id(entry)?;
            apply(&mut session, Action::RemoveEntry { driver, entry, confirmed: yes }, yes)
        }
        "remove" => {
            let mut session = open_session(config)?;
            let driver = session.engine().id_by_name(&joined(&rest)?)?;
            apply(&mut session, Action::RemoveDriver { driver, confirmed: yes }, yes)
        }
        "reset" => {
            let mut session = open_session(config)?;
            apply(&mut session, Action::ResetPeriod { confirmed: yes }, yes)
        }
        "queue" => print_queue(&open_session(config)?),
        "history" => print_history(&open_session(config)?, &joined(&rest)?),
        "share" => {
            let session = open_session(config)?;
            println!(
                "{}",
                export::share_text(session.engine(), &config.share_title, Local::now().date_naive())
            );
            Ok(())
        }
        "rules" => {
            println!("{}", export::rules_text(config.penalty_strategy));
            Ok(())
        }
        "lookup" => print_lookup(&open_session(config)?, &joined(&rest)?),
        "statement" => {
            let path = joined(&rest)?;
            let session = open_session(config)?;
            let rows = export::write_statement_file(session.engine(), Path::new(&path))?;
            println!("✓ Wrote {} entries to {}", rows, path);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("Unknown command: {}", other)
        }
    }
}

/// Run an action, asking on stdin when it needs confirmation
fn apply(session: &mut AppSession, action: Action, yes: bool) -> Result<()> {
    let outcome = match session.apply(action.clone(), Utc::now())? {
        Outcome::RequiresConfirmation { prompt } => {
            if !yes && !ask(&prompt)? {
                println!("Cancelled.");
                return Ok(());
            }
            session.apply(action.confirm(), Utc::now())?
        }
        applied => applied,
    };

    if let Outcome::Applied(notification) = outcome {
        println!("✓ {}", notification.message);
        if !notification.persisted {
            eprintln!("⚠️  Change applied but not saved. See the log for details.");
        }
    }
    Ok(())
}

fn ask(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn joined(rest: &[&str]) -> Result<String> {
    let name = rest.join(" ");
    if name.trim().is_empty() {
        bail!("Missing argument. Run `freight-rotation help` for usage.");
    }
    Ok(name)
}

/// `<name words...> <arg>...`: the last `N` words are arguments, the rest is the name
fn name_then<'a, const N: usize>(rest: &[&'a str], usage: &str) -> Result<(String, [&'a str; N])> {
    if rest.len() <= N {
        bail!("Usage: freight-rotation {}", usage);
    }
    let (name, args) = rest.split_at(rest.len() - N);
    let args = <[&'a str; N]>::try_from(args)?;
    Ok((joined(name)?, args))
}

fn parse_entry_id(s: &str) -> Result<EntryId> {
    let id = s
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid entry id: {}", s))?;
    Ok(EntryId(id))
}

// ============================================================================
// OUTPUT
// ============================================================================

fn print_queue(session: &AppSession) -> Result<()> {
    let rows = project(session.engine(), local_now());

    println!("🚚 Freight Rotation Queue");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if rows.is_empty() {
        println!("No drivers yet. Add one with: freight-rotation add <name>");
        return Ok(());
    }

    println!(
        "{:>4}  {:<20} {:>14} {:>14}  {}",
        "#",
        "Driver",
        "Real",
        "Rotation",
        WeekBreakdown::LABELS.join(" / ")
    );
    for row in &rows {
        let mut name = row.name.clone();
        if row.refused_last {
            name.push_str(" [REFUSED]");
        }
        if row.paused {
            name.push_str(" [PAUSED]");
        }
        let week: Vec<String> = row.week.iter().map(|v| week_cell(*v)).collect();
        println!(
            "{:>4}  {:<20} {:>14} {:>14}  {}",
            row.rank_label(),
            name,
            format_money(row.real_earnings),
            format_money(row.total_earnings),
            week.join(" / ")
        );
    }

    if let Some(next) = session.engine().next_up() {
        println!("\n➡️  Next up: {}", next.name);
    }
    Ok(())
}

fn print_history(session: &AppSession, name: &str) -> Result<()> {
    let id = session.engine().id_by_name(name)?;
    let driver = session.engine().get(id)?;

    println!("📒 History of {}", driver.name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if driver.ledger.is_empty() {
        println!("No entries in this period.");
    }
    for entry in driver.ledger.history_newest_first() {
        let local = entry.timestamp.with_timezone(&Local);
        println!(
            "{:>15}  {}  {:<8} {:>14}  {}",
            entry.id,
            local.format("%d/%m/%Y %H:%M"),
            entry.kind.as_str(),
            format_money(entry.value),
            entry.description.as_deref().unwrap_or("")
        );
    }
    println!(
        "\nReal: {}   Rotation: {}",
        format_money(driver.real_earnings()),
        format_money(driver.total_earnings())
    );
    Ok(())
}

fn print_lookup(session: &AppSession, name: &str) -> Result<()> {
    let result = lookup(session.engine().drivers(), name)?;

    if !result.found {
        println!("❌ Driver not found. Check the spelling of the name.");
        return Ok(());
    }

    println!("Hello, {}!", result.name.as_deref().unwrap_or(name));
    match (result.rank, result.standing) {
        (Some(rank), Some(Standing::Next)) => println!("Your position: {}º 🎉 you are next!", rank),
        (Some(rank), _) => println!("Your position: {}º", rank),
        _ => println!("You are paused and out of the queue."),
    }
    println!(
        "Next up: {}",
        result.next_driver_name.as_deref().unwrap_or("nobody")
    );
    Ok(())
}

fn print_usage() {
    println!("freight-rotation {}", freight_rotation::VERSION);
    println!();
    println!("Usage: freight-rotation [command]");
    println!();
    println!("  (no command)                        open the terminal UI");
    println!("  add <name>                          add a driver");
    println!("  freight <name> <value>              register a freight");
    println!("  refuse <name> [--yes]               register a refused load");
    println!("  pause <name>                        pause / unpause a driver");
    println!("  edit <name> <entry-id> <value>      change a freight value");
    println!("  delete-entry <name> <entry-id> [--yes]");
    println!("  remove <name> [--yes]               remove a driver");
    println!("  reset [--yes]                       start a new period");
    println!("  queue                               show the queue");
    println!("  history <name>                      show a driver's entries");
    println!("  share                               ranking text for the group");
    println!("  rules                               rules announcement text");
    println!("  lookup <name>                       position of one driver");
    println!("  statement <csv-path>                export every entry as CSV");
}

// ============================================================================
// UI MODE
// ============================================================================

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    logging::init_to_file(&config.log_file)?;

    println!("🖥️  Loading Freight Rotation...\n");
    let session = open_session(config)?;
    println!("✓ Loaded {} drivers", session.engine().len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(session, config.share_title.clone());
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or run a command: freight-rotation help");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_then_joins_multi_word_names() {
        let (name, [value]) = name_then::<1>(&["Alice", "Souza", "100"], "freight").unwrap();
        assert_eq!(name, "Alice Souza");
        assert_eq!(value, "100");

        let (name, [entry, value]) =
            name_then::<2>(&["Ana", "Maria", "Lima", "1700000000000", "80,5"], "edit").unwrap();
        assert_eq!(name, "Ana Maria Lima");
        assert_eq!(entry, "1700000000000");
        assert_eq!(value, "80,5");
    }

    #[test]
    fn test_name_then_needs_a_name() {
        assert!(name_then::<1>(&["100"], "freight").is_err());
        assert!(name_then::<2>(&["Alice", "5"], "edit").is_err());
        assert!(name_then::<1>(&[], "freight").is_err());
    }
}
