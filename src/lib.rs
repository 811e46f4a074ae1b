// Freight Rotation - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod ledger;      // Ledger: per-driver entries + derived earnings
pub mod driver;
pub mod rotation;    // Rotation Engine: queue order + refusal penalties
pub mod store;       // Persistence boundary (key-value, SQLite)
pub mod session;     // Action → mutate → persist → notify
pub mod projection;  // Read-only rows for presentation
pub mod export;      // Share text, rules, CSV statement
pub mod lookup;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{Missing, Result, RotationError};
pub use ledger::{
    EntryId, EntryKind, FreightEntry, Ledger,
    WeekBreakdown, WeekWindow,
    parse_value, validate_value,
};
pub use driver::{Driver, DriverId, IdSequence};
pub use rotation::{
    PenaltyStrategy, RefusalPreview, RotationEngine,
    compare_drivers, cost_penalty_value, sort_queue,
};
pub use store::{
    DecodedRoster, DriverRecord, EntryRecord, KeyValueStore, MemoryStore, SqliteStore,
    DEFAULT_STORAGE_KEY,
    backup_value, decode_drivers, decode_roster, encode_drivers, load_drivers, save_drivers,
};
pub use session::{Action, Change, Notification, Outcome, Session};
pub use projection::{DriverRow, format_money, local_now, project, week_cell};
pub use export::{rules_text, share_text, write_statement_csv, write_statement_file};
pub use lookup::{lookup, LookupResult, Standing};
pub use config::{Config, ConfigError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
