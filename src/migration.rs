// 🚀 Migration pipeline: CSV → lookups → businesses → verification
//
// Connection and schema problems abort the run. Everything after that is
// absorbed row by row or record by record.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::importer::{import_records, ImportSummary};
use crate::lookup::build_lookups;
use crate::reader::{load_csv, ReadStats};
use crate::report::VerificationReport;
use crate::store::PermitStore;

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub csv_path: PathBuf,
    /// Schema script to run instead of the backend's built-in one
    pub schema_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub read: ReadStats,
    pub suburbs: usize,
    pub permit_types: usize,
    pub import: ImportSummary,
    pub report: VerificationReport,
}

async fn apply_schema(store: &dyn PermitStore, options: &MigrationOptions) -> Result<()> {
    match &options.schema_path {
        Some(path) => {
            let sql = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read schema file {}", path.display()))?;
            store.apply_schema(&sql).await
        }
        None => store.apply_schema(store.default_schema()).await,
    }
}

pub async fn run_migration(
    store: &dyn PermitStore,
    options: &MigrationOptions,
) -> Result<MigrationOutcome> {
    info!(backend = store.backend(), "Starting food safety permits migration");

    store.ping().await.context("Database connection failed")?;
    info!("Database connection successful");

    apply_schema(store, options).await?;
    info!("Database schema ready");

    let (records, read) = load_csv(&options.csv_path)?;
    info!(
        valid = read.emitted,
        skipped = read.skipped(),
        "Loaded records from CSV"
    );

    let lookups = build_lookups(store, &records).await?;
    let import = import_records(store, &records, &lookups).await;
    let report = VerificationReport::collect(store).await?;

    Ok(MigrationOutcome {
        read,
        suburbs: lookups.suburbs.len(),
        permit_types: lookups.permit_types.len(),
        import,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::io::Write;

    const CSV: &str = "Index,Business Name,Business Address,Business Address(Line 1),Business Address(Line 2),Business Address Suburb,Business Phone Number,Eat Safe Rating,Permit Name,Business Address Suburb List
1,Joe's Deli,\"1 George St, Sydney\",1 George St,nan,Sydney,0412345678,5,\"Food Premises, Mobile Food Vendor\",\"S, Sydney\"
2,nan,,,,,,,,
3,Glebe Grocer,\"2 Glebe Pt Rd, Glebe\",2 Glebe Pt Rd,-,Glebe,-,4,Food Premises,\"G, Glebe\"
4,Pop-up Stall,-,-,-,-,02 9999 1234,Not rated,Temporary Event,-
";

    fn write_csv() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_full_migration() {
        let csv = write_csv();
        let store = SqliteStore::open_in_memory().unwrap();
        let options = MigrationOptions {
            csv_path: csv.path().to_path_buf(),
            schema_path: None,
        };

        let outcome = run_migration(&store, &options).await.unwrap();

        assert_eq!(outcome.read.emitted, 3);
        assert_eq!(outcome.read.skipped_blank_name, 1);
        assert_eq!(outcome.suburbs, 2);
        assert_eq!(outcome.permit_types, 3);
        assert_eq!(outcome.import, ImportSummary { processed: 3, errored: 0 });

        let summary = &outcome.report.summary;
        assert_eq!(summary.total_businesses, 3);
        assert_eq!(summary.total_permits, 4);
        assert_eq!(summary.avg_rating, Some(4.5));

        let deli = store.search_businesses("Joe", 10).await.unwrap();
        assert_eq!(deli[0].phone_number.as_deref(), Some("+61412345678"));
        assert_eq!(deli[0].suburb_name.as_deref(), Some("Sydney"));
    }

    #[tokio::test]
    async fn test_rerun_keeps_lookups_stable() {
        let csv = write_csv();
        let store = SqliteStore::open_in_memory().unwrap();
        let options = MigrationOptions {
            csv_path: csv.path().to_path_buf(),
            schema_path: None,
        };

        run_migration(&store, &options).await.unwrap();
        let second = run_migration(&store, &options).await.unwrap();

        // Lookups deduplicate; businesses are appended again
        assert_eq!(second.report.summary.total_suburbs, 2);
        assert_eq!(second.report.summary.total_permit_types, 3);
        assert_eq!(second.report.summary.total_businesses, 6);
    }

    #[tokio::test]
    async fn test_missing_schema_file_is_fatal() {
        let csv = write_csv();
        let store = SqliteStore::open_in_memory().unwrap();
        let options = MigrationOptions {
            csv_path: csv.path().to_path_buf(),
            schema_path: Some(PathBuf::from("/no/such/schema.sql")),
        };

        let err = run_migration(&store, &options).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read schema file"));
    }

    #[tokio::test]
    async fn test_missing_csv_is_fatal() {
        let store = SqliteStore::open_in_memory().unwrap();
        let options = MigrationOptions {
            csv_path: PathBuf::from("/no/such/permits.csv"),
            schema_path: None,
        };

        assert!(run_migration(&store, &options).await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_csv_is_fatal() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = MigrationOptions {
            csv_path: dir.path().to_path_buf(),
            schema_path: None,
        };

        assert!(run_migration(&store, &options).await.is_err());
        // Schema ran before the read failed; nothing was imported
        assert_eq!(store.database_summary().await.unwrap().total_businesses, 0);
    }
}
