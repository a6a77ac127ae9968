use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use food_permits::logging::init_logging;
use food_permits::{connect, run_migration, MigrationOptions, Settings, VerificationReport};

#[derive(Parser)]
#[command(name = "food-permits")]
#[command(about = "Food safety permits: CSV migration and verification")]
#[command(version)]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the CSV export and import it into the database
    Migrate {
        /// CSV export (defaults to FOOD_PERMITS_CSV or food-safety-permits.csv)
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Schema script to run instead of the built-in one
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Print the verification summary for an existing database
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load(cli.database_url.as_deref())?;

    let store = connect(&settings).await?;

    let result = match cli.command {
        Commands::Migrate { csv, schema } => {
            let options = MigrationOptions {
                csv_path: csv.unwrap_or_else(|| settings.csv_path.clone()),
                schema_path: schema,
            };

            println!("🚀 Starting food safety permits migration...");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

            run_migration(store.as_ref(), &options).await.map(|outcome| {
                println!("\n✓ Loaded {} valid records from CSV", outcome.read.emitted);
                println!("✓ Skipped rows: {}", outcome.read.skipped());
                println!("✓ Suburbs: {}", outcome.suburbs);
                println!("✓ Permit types: {}", outcome.permit_types);
                println!("\nMigration completed!");
                println!("Successfully processed: {} records", outcome.import.processed);
                println!("Errors encountered: {} records", outcome.import.errored);
                println!("\n{}", outcome.report);
                println!("🎉 Migration completed successfully!");
            })
        }
        Commands::Report => VerificationReport::collect(store.as_ref())
            .await
            .map(|report| println!("{}", report)),
    };

    store.close().await;

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Migration failed");
        eprintln!("❌ {e:#}");
    }
    result
}
