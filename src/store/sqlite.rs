// SQLite backend: one connection behind a mutex

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{
    like_pattern, BusinessDetails, DatabaseSummary, LookupKind, NewBusiness, PermitStatistics,
    PermitStore, RatingDistribution, SuburbAnalysis, BUSINESS_DETAILS_COLUMNS,
};

pub const SQLITE_SCHEMA: &str = include_str!("../../database/schema.sqlite.sql");

const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open SQLite database {}", db_path.display()))?;
        // WAL for crash recovery on file databases
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    fn query_businesses<P: rusqlite::Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<BusinessDetails>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {BUSINESS_DETAILS_COLUMNS} FROM business_details {filter}");
        let mut stmt = conn.prepare(&sql)?;

        let businesses = stmt
            .query_map(params, business_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(businesses)
    }

    fn count(conn: &Connection, table: &str) -> Result<i64> {
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SQLITE_TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn business_from_row(row: &Row<'_>) -> rusqlite::Result<BusinessDetails> {
    let created_at: String = row.get(11)?;

    Ok(BusinessDetails {
        business_id: row.get(0)?,
        business_name: row.get(1)?,
        phone_number: row.get(2)?,
        eat_safe_rating: row.get(3)?,
        full_address: row.get(4)?,
        address_line_1: row.get(5)?,
        address_line_2: row.get(6)?,
        suburb_name: row.get(7)?,
        permit_types: row.get(8)?,
        permit_count: row.get(9)?,
        original_index: row.get(10)?,
        created_at: parse_timestamp(11, &created_at)?,
    })
}

#[async_trait]
impl PermitStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn default_schema(&self) -> &'static str {
        SQLITE_SCHEMA
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        let _: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(())
    }

    async fn apply_schema(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql).context("Failed to apply schema")?;
        Ok(())
    }

    async fn upsert_lookup(&self, kind: LookupKind, name: &str) -> Result<i64> {
        let conn = self.lock()?;
        let id = conn.query_row(&kind.upsert_sql(), params![name], |row| row.get(0))?;
        Ok(id)
    }

    async fn insert_business(&self, business: &NewBusiness<'_>) -> Result<i64> {
        let mut conn = self.lock()?;
        let record = business.record;

        // Dropped without commit on any `?` below, which rolls back
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO addresses (address_line_1, address_line_2, full_address, suburb_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.address_line_1,
                record.address_line_2,
                record.full_address,
                business.suburb_id,
            ],
        )?;
        let address_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO businesses (business_name, address_id, phone_number, eat_safe_rating, original_index)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.business_name,
                address_id,
                record.phone_number,
                business.rating(),
                record.original_index,
            ],
        )?;
        let business_id = tx.last_insert_rowid();

        for permit_type_id in &business.permit_type_ids {
            let inserted = tx.execute(
                "INSERT INTO permits (business_id, permit_type_id) VALUES (?1, ?2)
                 ON CONFLICT (business_id, permit_type_id) DO NOTHING",
                params![business_id, permit_type_id],
            )?;
            if inserted == 0 {
                debug!(business_id, permit_type_id, "Permit already linked");
            }
        }

        tx.commit()?;
        Ok(business_id)
    }

    async fn list_businesses(&self, limit: i64, offset: i64) -> Result<Vec<BusinessDetails>> {
        self.query_businesses("ORDER BY business_name LIMIT ?1 OFFSET ?2", params![limit, offset])
    }

    async fn search_businesses(&self, term: &str, limit: i64) -> Result<Vec<BusinessDetails>> {
        // SQLite LIKE is case-insensitive for ASCII
        self.query_businesses(
            "WHERE business_name LIKE ?1 OR full_address LIKE ?1 OR suburb_name LIKE ?1
             ORDER BY business_name LIMIT ?2",
            params![like_pattern(term), limit],
        )
    }

    async fn businesses_by_rating(&self, rating: i32) -> Result<Vec<BusinessDetails>> {
        self.query_businesses(
            "WHERE eat_safe_rating = ?1 ORDER BY business_name",
            params![rating],
        )
    }

    async fn businesses_by_suburb(&self, suburb: &str) -> Result<Vec<BusinessDetails>> {
        self.query_businesses(
            "WHERE suburb_name LIKE ?1 ORDER BY business_name",
            params![like_pattern(suburb)],
        )
    }

    async fn businesses_by_permit_type(&self, permit_type: &str) -> Result<Vec<BusinessDetails>> {
        self.query_businesses(
            "WHERE permit_types LIKE ?1 ORDER BY business_name",
            params![like_pattern(permit_type)],
        )
    }

    async fn top_rated_businesses(&self, limit: i64) -> Result<Vec<BusinessDetails>> {
        self.query_businesses(
            "WHERE eat_safe_rating = 5 ORDER BY business_name LIMIT ?1",
            params![limit],
        )
    }

    async fn low_rated_businesses(&self, limit: i64) -> Result<Vec<BusinessDetails>> {
        self.query_businesses(
            "WHERE eat_safe_rating <= 3 ORDER BY eat_safe_rating ASC, business_name LIMIT ?1",
            params![limit],
        )
    }

    async fn permit_statistics(&self) -> Result<Vec<PermitStatistics>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT permit_type_name, business_count, avg_rating,
                    rating_5_count, rating_4_count, rating_3_count, rating_2_count, rating_1_count
             FROM permit_statistics
             ORDER BY business_count DESC, permit_type_name",
        )?;

        let stats = stmt
            .query_map([], |row| {
                Ok(PermitStatistics {
                    permit_type_name: row.get(0)?,
                    business_count: row.get(1)?,
                    avg_rating: row.get(2)?,
                    rating_5_count: row.get(3)?,
                    rating_4_count: row.get(4)?,
                    rating_3_count: row.get(5)?,
                    rating_2_count: row.get(6)?,
                    rating_1_count: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    async fn suburb_analysis(&self) -> Result<Vec<SuburbAnalysis>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT suburb_name, business_count, avg_rating, permit_variety, latest_business_added
             FROM suburb_analysis
             ORDER BY business_count DESC, suburb_name",
        )?;

        let suburbs = stmt
            .query_map([], |row| {
                let latest: Option<String> = row.get(4)?;
                Ok(SuburbAnalysis {
                    suburb_name: row.get(0)?,
                    business_count: row.get(1)?,
                    avg_rating: row.get(2)?,
                    permit_variety: row.get(3)?,
                    latest_business_added: latest
                        .map(|raw| parse_timestamp(4, &raw))
                        .transpose()?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(suburbs)
    }

    async fn rating_distribution(&self) -> Result<Vec<RatingDistribution>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT eat_safe_rating, business_count, percentage
             FROM rating_distribution
             ORDER BY eat_safe_rating DESC",
        )?;

        let distribution = stmt
            .query_map([], |row| {
                Ok(RatingDistribution {
                    eat_safe_rating: row.get(0)?,
                    business_count: row.get(1)?,
                    percentage: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(distribution)
    }

    async fn database_summary(&self) -> Result<DatabaseSummary> {
        let conn = self.lock()?;

        let avg_rating: Option<f64> = conn.query_row(
            "SELECT ROUND(AVG(eat_safe_rating), 2) FROM businesses WHERE eat_safe_rating IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(DatabaseSummary {
            total_businesses: Self::count(&conn, "businesses")?,
            total_permits: Self::count(&conn, "permits")?,
            total_suburbs: Self::count(&conn, "suburbs")?,
            total_permit_types: Self::count(&conn, "permit_types")?,
            avg_rating,
        })
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::CleanedRecord;

    fn record(name: &str, rating: Option<u8>, suburb: Option<&str>) -> CleanedRecord {
        CleanedRecord {
            business_name: name.to_string(),
            full_address: format!("1 {} St, Sydney", name),
            address_line_1: Some(format!("1 {} St", name)),
            address_line_2: None,
            phone_number: Some("+61412345678".to_string()),
            eat_safe_rating: rating,
            permit_types: vec![],
            suburb_name: suburb.map(str::to_string),
            original_index: 1,
        }
    }

    async fn setup() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.apply_schema(SQLITE_SCHEMA).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_schema_is_rerunnable() {
        let store = setup().await;
        store.apply_schema(SQLITE_SCHEMA).await.unwrap();

        let summary = store.database_summary().await.unwrap();
        assert_eq!(summary, DatabaseSummary::default());
    }

    #[tokio::test]
    async fn test_upsert_lookup_is_idempotent() {
        let store = setup().await;

        let first = store.upsert_lookup(LookupKind::Suburb, "Sydney").await.unwrap();
        let other = store.upsert_lookup(LookupKind::Suburb, "Glebe").await.unwrap();
        let again = store.upsert_lookup(LookupKind::Suburb, "Sydney").await.unwrap();

        assert_eq!(first, again, "Same name should keep its id");
        assert_ne!(first, other);
        assert_eq!(store.database_summary().await.unwrap().total_suburbs, 2);
    }

    #[tokio::test]
    async fn test_insert_business_with_permits() {
        let store = setup().await;
        let suburb = store.upsert_lookup(LookupKind::Suburb, "Sydney").await.unwrap();
        let premises = store.upsert_lookup(LookupKind::PermitType, "Food Premises").await.unwrap();
        let vendor = store.upsert_lookup(LookupKind::PermitType, "Mobile Food Vendor").await.unwrap();

        let deli = record("Joe's Deli", Some(5), Some("Sydney"));
        store
            .insert_business(&NewBusiness {
                record: &deli,
                suburb_id: Some(suburb),
                permit_type_ids: vec![premises, vendor],
            })
            .await
            .unwrap();

        let businesses = store.list_businesses(10, 0).await.unwrap();
        assert_eq!(businesses.len(), 1);

        let details = &businesses[0];
        assert_eq!(details.business_name, "Joe's Deli");
        assert_eq!(details.suburb_name.as_deref(), Some("Sydney"));
        assert_eq!(details.eat_safe_rating, Some(5));
        assert_eq!(details.permit_count, 2);
        let permit_types = details.permit_types.clone().unwrap();
        assert!(permit_types.contains("Food Premises"));
        assert!(permit_types.contains("Mobile Food Vendor"));
    }

    #[tokio::test]
    async fn test_duplicate_permit_ignored() {
        let store = setup().await;
        let premises = store.upsert_lookup(LookupKind::PermitType, "Food Premises").await.unwrap();

        let cafe = record("Cafe", None, None);
        store
            .insert_business(&NewBusiness {
                record: &cafe,
                suburb_id: None,
                permit_type_ids: vec![premises, premises],
            })
            .await
            .expect("duplicate permit pair should not error");

        let summary = store.database_summary().await.unwrap();
        assert_eq!(summary.total_businesses, 1);
        assert_eq!(summary.total_permits, 1);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back() {
        let store = setup().await;

        let cafe = record("Broken Cafe", Some(4), None);
        let result = store
            .insert_business(&NewBusiness {
                record: &cafe,
                suburb_id: None,
                permit_type_ids: vec![9999],
            })
            .await;
        assert!(result.is_err(), "Unknown permit type should violate the foreign key");

        let conn = store.lock().unwrap();
        assert_eq!(SqliteStore::count(&conn, "addresses").unwrap(), 0);
        assert_eq!(SqliteStore::count(&conn, "businesses").unwrap(), 0);
        assert_eq!(SqliteStore::count(&conn, "permits").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_and_filters() {
        let store = setup().await;
        let sydney = store.upsert_lookup(LookupKind::Suburb, "Sydney").await.unwrap();
        let glebe = store.upsert_lookup(LookupKind::Suburb, "Glebe").await.unwrap();
        let vendor = store.upsert_lookup(LookupKind::PermitType, "Mobile Food Vendor").await.unwrap();

        for (name, rating, suburb_id, permits) in [
            ("Alpha Bakery", Some(5), Some(sydney), vec![]),
            ("Beta Burgers", Some(3), Some(glebe), vec![vendor]),
            ("Gamma Grill", None, None, vec![]),
        ] {
            let rec = record(name, rating, None);
            store
                .insert_business(&NewBusiness {
                    record: &rec,
                    suburb_id,
                    permit_type_ids: permits,
                })
                .await
                .unwrap();
        }

        let found = store.search_businesses("bakery", 50).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].business_name, "Alpha Bakery");

        let by_suburb = store.search_businesses("glebe", 50).await.unwrap();
        assert_eq!(by_suburb[0].business_name, "Beta Burgers");

        assert_eq!(store.businesses_by_rating(5).await.unwrap().len(), 1);
        assert_eq!(store.businesses_by_suburb("Syd").await.unwrap().len(), 1);
        assert_eq!(
            store.businesses_by_permit_type("vendor").await.unwrap()[0].business_name,
            "Beta Burgers"
        );
        assert_eq!(store.top_rated_businesses(10).await.unwrap().len(), 1);
        assert_eq!(
            store.low_rated_businesses(10).await.unwrap()[0].business_name,
            "Beta Burgers"
        );

        let page = store.list_businesses(2, 1).await.unwrap();
        let names: Vec<_> = page.iter().map(|b| b.business_name.as_str()).collect();
        assert_eq!(names, vec!["Beta Burgers", "Gamma Grill"]);
    }

    #[tokio::test]
    async fn test_statistics_views() {
        let store = setup().await;
        let sydney = store.upsert_lookup(LookupKind::Suburb, "Sydney").await.unwrap();
        let premises = store.upsert_lookup(LookupKind::PermitType, "Food Premises").await.unwrap();
        store.upsert_lookup(LookupKind::PermitType, "Unused Permit").await.unwrap();

        for (name, rating) in [("A", Some(5)), ("B", Some(4)), ("C", Some(4)), ("D", None)] {
            let rec = record(name, rating, None);
            store
                .insert_business(&NewBusiness {
                    record: &rec,
                    suburb_id: Some(sydney),
                    permit_type_ids: vec![premises],
                })
                .await
                .unwrap();
        }

        let permits = store.permit_statistics().await.unwrap();
        assert_eq!(permits.len(), 2);
        assert_eq!(permits[0].permit_type_name, "Food Premises");
        assert_eq!(permits[0].business_count, 4);
        assert_eq!(permits[0].rating_4_count, 2);
        assert_eq!(permits[0].rating_5_count, 1);
        assert_eq!(permits[0].avg_rating, Some(4.33));
        assert_eq!(permits[1].business_count, 0);
        assert_eq!(permits[1].avg_rating, None);

        let suburbs = store.suburb_analysis().await.unwrap();
        assert_eq!(suburbs.len(), 1);
        assert_eq!(suburbs[0].business_count, 4);
        assert_eq!(suburbs[0].permit_variety, 1);
        assert!(suburbs[0].latest_business_added.is_some());

        let distribution = store.rating_distribution().await.unwrap();
        assert_eq!(distribution.len(), 2);
        assert_eq!(distribution[0].eat_safe_rating, 5);
        assert_eq!(distribution[0].percentage, 33.33);
        assert_eq!(distribution[1].business_count, 2);
        assert_eq!(distribution[1].percentage, 66.67);

        let summary = store.database_summary().await.unwrap();
        assert_eq!(summary.total_businesses, 4);
        assert_eq!(summary.total_permits, 4);
        assert_eq!(summary.total_permit_types, 2);
        assert_eq!(summary.avg_rating, Some(4.33));
    }
}
