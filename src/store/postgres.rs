// PostgreSQL backend over a sqlx connection pool

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    like_pattern, BusinessDetails, DatabaseSummary, LookupKind, NewBusiness, PermitStatistics,
    PermitStore, RatingDistribution, SuburbAnalysis, BUSINESS_DETAILS_COLUMNS,
};
use crate::config::Settings;

pub const POSTGRES_SCHEMA: &str = include_str!("../../database/schema.sql");

const ACQUIRE_TIMEOUT_SECS: u64 = 5;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, settings: &Settings) -> Result<Self> {
        let ssl_mode = if settings.environment.requires_tls() {
            // Encrypted, certificate not verified
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };

        let options = PgConnectOptions::from_str(database_url)
            .context("Invalid PostgreSQL connection string")?
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect_with(options)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!(
            max_connections = settings.max_connections,
            ?ssl_mode,
            "PostgreSQL pool ready"
        );

        Ok(PgStore { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    fn business_sql(filter: &str) -> String {
        format!("SELECT {BUSINESS_DETAILS_COLUMNS} FROM business_details {filter}")
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl PermitStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn default_schema(&self) -> &'static str {
        POSTGRES_SCHEMA
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT NOW()")
            .execute(&self.pool)
            .await
            .context("Database connection check failed")?;
        Ok(())
    }

    async fn apply_schema(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .context("Failed to apply schema")?;
        Ok(())
    }

    async fn upsert_lookup(&self, kind: LookupKind, name: &str) -> Result<i64> {
        let sql = kind.upsert_sql();
        let id: i64 = sqlx::query_scalar(&sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_business(&self, business: &NewBusiness<'_>) -> Result<i64> {
        let record = business.record;

        // Holds one pooled connection; rolled back on drop unless committed
        let mut tx = self.pool.begin().await?;

        let address_id: i64 = sqlx::query_scalar(
            "INSERT INTO addresses (address_line_1, address_line_2, full_address, suburb_id)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&record.address_line_1)
        .bind(&record.address_line_2)
        .bind(&record.full_address)
        .bind(business.suburb_id)
        .fetch_one(&mut *tx)
        .await?;

        let business_id: i64 = sqlx::query_scalar(
            "INSERT INTO businesses (business_name, address_id, phone_number, eat_safe_rating, original_index)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&record.business_name)
        .bind(address_id)
        .bind(&record.phone_number)
        .bind(business.rating())
        .bind(record.original_index)
        .fetch_one(&mut *tx)
        .await?;

        for permit_type_id in &business.permit_type_ids {
            let result = sqlx::query(
                "INSERT INTO permits (business_id, permit_type_id) VALUES ($1, $2)
                 ON CONFLICT (business_id, permit_type_id) DO NOTHING",
            )
            .bind(business_id)
            .bind(permit_type_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                debug!(business_id, permit_type_id, "Permit already linked");
            }
        }

        tx.commit().await?;
        Ok(business_id)
    }

    async fn list_businesses(&self, limit: i64, offset: i64) -> Result<Vec<BusinessDetails>> {
        let sql = Self::business_sql("ORDER BY business_name LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn search_businesses(&self, term: &str, limit: i64) -> Result<Vec<BusinessDetails>> {
        let sql = Self::business_sql(
            "WHERE business_name ILIKE $1 OR full_address ILIKE $1 OR suburb_name ILIKE $1
             ORDER BY business_name LIMIT $2",
        );
        let rows = sqlx::query_as(&sql)
            .bind(like_pattern(term))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn businesses_by_rating(&self, rating: i32) -> Result<Vec<BusinessDetails>> {
        let sql = Self::business_sql("WHERE eat_safe_rating = $1 ORDER BY business_name");
        let rows = sqlx::query_as(&sql)
            .bind(rating)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn businesses_by_suburb(&self, suburb: &str) -> Result<Vec<BusinessDetails>> {
        let sql = Self::business_sql("WHERE suburb_name ILIKE $1 ORDER BY business_name");
        let rows = sqlx::query_as(&sql)
            .bind(like_pattern(suburb))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn businesses_by_permit_type(&self, permit_type: &str) -> Result<Vec<BusinessDetails>> {
        let sql = Self::business_sql("WHERE permit_types ILIKE $1 ORDER BY business_name");
        let rows = sqlx::query_as(&sql)
            .bind(like_pattern(permit_type))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn top_rated_businesses(&self, limit: i64) -> Result<Vec<BusinessDetails>> {
        let sql = Self::business_sql("WHERE eat_safe_rating = 5 ORDER BY business_name LIMIT $1");
        let rows = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn low_rated_businesses(&self, limit: i64) -> Result<Vec<BusinessDetails>> {
        let sql = Self::business_sql(
            "WHERE eat_safe_rating <= 3 ORDER BY eat_safe_rating ASC, business_name LIMIT $1",
        );
        let rows = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn permit_statistics(&self) -> Result<Vec<PermitStatistics>> {
        let rows = sqlx::query_as(
            "SELECT permit_type_name, business_count, avg_rating,
                    rating_5_count, rating_4_count, rating_3_count, rating_2_count, rating_1_count
             FROM permit_statistics
             ORDER BY business_count DESC, permit_type_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn suburb_analysis(&self) -> Result<Vec<SuburbAnalysis>> {
        let rows = sqlx::query_as(
            "SELECT suburb_name, business_count, avg_rating, permit_variety, latest_business_added
             FROM suburb_analysis
             ORDER BY business_count DESC, suburb_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn rating_distribution(&self) -> Result<Vec<RatingDistribution>> {
        let rows = sqlx::query_as(
            "SELECT eat_safe_rating, business_count, percentage
             FROM rating_distribution
             ORDER BY eat_safe_rating DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn database_summary(&self) -> Result<DatabaseSummary> {
        let avg_rating: Option<f64> = sqlx::query_scalar(
            "SELECT ROUND(AVG(eat_safe_rating)::numeric, 2)::float8
             FROM businesses WHERE eat_safe_rating IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DatabaseSummary {
            total_businesses: self.count("businesses").await?,
            total_permits: self.count("permits").await?,
            total_suburbs: self.count("suburbs").await?,
            total_permit_types: self.count("permit_types").await?,
            avg_rating,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
