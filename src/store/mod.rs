// 🗄️ Store - relational persistence for permits
//
// One trait, two backends:
// - PostgreSQL through a sqlx connection pool (production)
// - SQLite through rusqlite (local files, in-memory databases, tests)
//
// The handle is built once by `connect` and passed to whoever needs it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::Settings;
use crate::reader::CleanedRecord;

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

// ============================================================================
// WRITE MODELS
// ============================================================================

/// Name-keyed lookup entities created by the migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Suburb,
    PermitType,
}

impl LookupKind {
    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::Suburb => "suburbs",
            LookupKind::PermitType => "permit_types",
        }
    }

    pub fn name_column(&self) -> &'static str {
        match self {
            LookupKind::Suburb => "suburb_name",
            LookupKind::PermitType => "permit_type_name",
        }
    }

    /// Insert-or-touch by unique name, returning the row id.
    /// Same statement on both backends.
    pub(crate) fn upsert_sql(&self) -> String {
        let table = self.table();
        let column = self.name_column();
        format!(
            "INSERT INTO {table} ({column}) VALUES ($1) \
             ON CONFLICT ({column}) DO UPDATE SET {column} = EXCLUDED.{column} \
             RETURNING id"
        )
    }
}

/// One business with its address and resolved permit-type ids
#[derive(Debug, Clone)]
pub struct NewBusiness<'a> {
    pub record: &'a CleanedRecord,
    pub suburb_id: Option<i64>,
    pub permit_type_ids: Vec<i64>,
}

impl NewBusiness<'_> {
    pub(crate) fn rating(&self) -> Option<i32> {
        self.record.eat_safe_rating.map(i32::from)
    }
}

// ============================================================================
// READ MODELS (rows of the reporting views)
// ============================================================================

/// Row of the `business_details` view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct BusinessDetails {
    pub business_id: i64,
    pub business_name: String,
    pub phone_number: Option<String>,
    pub eat_safe_rating: Option<i32>,
    pub full_address: String,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub suburb_name: Option<String>,
    /// Comma-joined permit type names, None when the business has no permits
    pub permit_types: Option<String>,
    pub permit_count: i64,
    pub original_index: i64,
    pub created_at: DateTime<Utc>,
}

/// Row of the `permit_statistics` view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct PermitStatistics {
    pub permit_type_name: String,
    pub business_count: i64,
    pub avg_rating: Option<f64>,
    pub rating_5_count: i64,
    pub rating_4_count: i64,
    pub rating_3_count: i64,
    pub rating_2_count: i64,
    pub rating_1_count: i64,
}

/// Row of the `suburb_analysis` view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct SuburbAnalysis {
    pub suburb_name: String,
    pub business_count: i64,
    pub avg_rating: Option<f64>,
    pub permit_variety: i64,
    pub latest_business_added: Option<DateTime<Utc>>,
}

/// Row of the `rating_distribution` view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct RatingDistribution {
    pub eat_safe_rating: i32,
    pub business_count: i64,
    pub percentage: f64,
}

/// Entity counts plus the mean rating of rated businesses
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    pub total_businesses: i64,
    pub total_permits: i64,
    pub total_suburbs: i64,
    pub total_permit_types: i64,
    pub avg_rating: Option<f64>,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Everything the migration and the API need from the database
#[async_trait]
pub trait PermitStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Built-in schema (tables, indexes, views) for this backend
    fn default_schema(&self) -> &'static str;

    /// Round-trip a trivial query to prove the connection works
    async fn ping(&self) -> Result<()>;

    /// Execute a multi-statement schema script
    async fn apply_schema(&self, sql: &str) -> Result<()>;

    /// Upsert a suburb or permit type by name and return its id
    async fn upsert_lookup(&self, kind: LookupKind, name: &str) -> Result<i64>;

    /// Insert address, business and permits in one transaction.
    /// Nothing is left behind if any step fails. Returns the business id.
    async fn insert_business(&self, business: &NewBusiness<'_>) -> Result<i64>;

    async fn list_businesses(&self, limit: i64, offset: i64) -> Result<Vec<BusinessDetails>>;

    /// Case-insensitive substring match over name, full address and suburb
    async fn search_businesses(&self, term: &str, limit: i64) -> Result<Vec<BusinessDetails>>;

    async fn businesses_by_rating(&self, rating: i32) -> Result<Vec<BusinessDetails>>;

    async fn businesses_by_suburb(&self, suburb: &str) -> Result<Vec<BusinessDetails>>;

    async fn businesses_by_permit_type(&self, permit_type: &str) -> Result<Vec<BusinessDetails>>;

    /// Businesses rated 5, by name
    async fn top_rated_businesses(&self, limit: i64) -> Result<Vec<BusinessDetails>>;

    /// Businesses rated 3 or lower, lowest first
    async fn low_rated_businesses(&self, limit: i64) -> Result<Vec<BusinessDetails>>;

    /// All permit types, most businesses first
    async fn permit_statistics(&self) -> Result<Vec<PermitStatistics>>;

    /// All suburbs, most businesses first
    async fn suburb_analysis(&self) -> Result<Vec<SuburbAnalysis>>;

    /// Rated businesses per rating, highest rating first
    async fn rating_distribution(&self) -> Result<Vec<RatingDistribution>>;

    async fn database_summary(&self) -> Result<DatabaseSummary>;

    /// Release pooled connections
    async fn close(&self);
}

// Shared column list for every business_details query
pub(crate) const BUSINESS_DETAILS_COLUMNS: &str = "business_id, business_name, phone_number, \
     eat_safe_rating, full_address, address_line_1, address_line_2, suburb_name, \
     permit_types, permit_count, original_index, created_at";

/// Wrap a search term for LIKE / ILIKE
pub(crate) fn like_pattern(term: &str) -> String {
    format!("%{}%", term)
}

// ============================================================================
// CONNECT
// ============================================================================

/// Which backend a DATABASE_URL points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Postgres(String),
    Sqlite(String),
}

impl DatabaseTarget {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            bail!("DATABASE_URL is empty");
        }

        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(DatabaseTarget::Postgres(url.to_string()));
        }

        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if path.is_empty() {
            bail!("DATABASE_URL has no SQLite path: {}", url);
        }

        Ok(DatabaseTarget::Sqlite(path.to_string()))
    }
}

/// Open the store `settings.database_url` points at
pub async fn connect(settings: &Settings) -> Result<Arc<dyn PermitStore>> {
    match DatabaseTarget::parse(&settings.database_url)? {
        #[cfg(feature = "postgres")]
        DatabaseTarget::Postgres(url) => {
            let store = PgStore::connect(&url, settings).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        DatabaseTarget::Postgres(_) => {
            bail!("PostgreSQL support not compiled in; rebuild with --features postgres")
        }
        DatabaseTarget::Sqlite(path) => {
            let store = if path == ":memory:" {
                SqliteStore::open_in_memory()?
            } else {
                SqliteStore::open(std::path::Path::new(&path))?
            };
            Ok(Arc::new(store))
        }
    }
}
