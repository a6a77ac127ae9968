// Food Safety Permits - Core Library
// Exposes all modules for use in the migration CLI, API server, and tests

pub mod cleaning;
pub mod config;
pub mod importer;
pub mod logging;
pub mod lookup;
pub mod migration;
pub mod reader;
pub mod report;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{Environment, Settings};
pub use importer::{import_records, ImportSummary};
pub use lookup::{build_lookups, LookupTables};
pub use migration::{run_migration, MigrationOptions, MigrationOutcome};
pub use reader::{load_csv, CleanedRecord, CsvRecords, RawRow, ReadStats};
pub use report::VerificationReport;
pub use store::{
    connect, BusinessDetails, DatabaseSummary, LookupKind, NewBusiness, PermitStatistics,
    PermitStore, RatingDistribution, SqliteStore, SuburbAnalysis,
};

#[cfg(feature = "postgres")]
pub use store::PgStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
