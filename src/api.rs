// 🌐 REST API - read-only endpoints over the permit store

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::store::{
    BusinessDetails, DatabaseSummary, PermitStatistics, PermitStore, RatingDistribution,
    SuburbAnalysis,
};

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const SEARCH_LIMIT: i64 = 50;
pub const STATISTICS_TOP_N: usize = 10;
pub const RATED_BUSINESSES_LIMIT: i64 = 10;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PermitStore>,
}

// ============================================================================
// Responses
// ============================================================================

/// Success envelope; `extra` is flattened next to `data`
#[derive(Serialize)]
pub struct ApiResponse<T, E = ()> {
    success: bool,
    data: T,
    #[serde(flatten)]
    extra: E,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            extra: (),
        }
    }
}

impl<T, E> ApiResponse<T, E> {
    fn with(data: T, extra: E) -> Self {
        Self {
            success: true,
            data,
            extra,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Serialize)]
struct PaginationExtra {
    pagination: Pagination,
}

#[derive(Serialize)]
struct Pagination {
    limit: i64,
    offset: i64,
    count: usize,
}

#[derive(Serialize)]
struct SearchExtra {
    query: String,
    count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub summary: DatabaseSummary,
    pub permit_statistics: Vec<PermitStatistics>,
    pub suburb_analysis: Vec<SuburbAnalysis>,
    pub rating_distribution: Vec<RatingDistribution>,
    pub top_rated_businesses: Vec<BusinessDetails>,
    pub low_rated_businesses: Vec<BusinessDetails>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Search query is required")]
    MissingQuery,

    #[error("Invalid rating: {0}")]
    InvalidRating(String),

    /// Message is what the client sees; the source is only logged
    #[error("{message}")]
    Internal {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    fn internal(message: &'static str) -> impl FnOnce(anyhow::Error) -> ApiError {
        move |source| ApiError::Internal { message, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingQuery | ApiError::InvalidRating(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal { message, source } => {
                error!(error = %format!("{source:#}"), "{}", message);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Query parameters
// ============================================================================

/// Raw strings so bad numbers fall back to defaults instead of rejecting
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    limit: Option<String>,
    offset: Option<String>,
}

impl PageParams {
    fn limit(&self) -> i64 {
        parse_non_negative(self.limit.as_deref()).unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    fn offset(&self) -> i64 {
        parse_non_negative(self.offset.as_deref()).unwrap_or(0)
    }
}

fn parse_non_negative(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse::<i64>().ok().filter(|v| *v >= 0)
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/businesses?limit&offset
async fn list_businesses(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<ApiResponse<Vec<BusinessDetails>, PaginationExtra>> {
    let limit = params.limit();
    let offset = params.offset();

    let businesses = state
        .store
        .list_businesses(limit, offset)
        .await
        .map_err(ApiError::internal("Failed to fetch businesses"))?;

    let count = businesses.len();
    Ok(Json(ApiResponse::with(
        businesses,
        PaginationExtra {
            pagination: Pagination {
                limit,
                offset,
                count,
            },
        },
    )))
}

/// GET /api/businesses/search?q=
async fn search_businesses(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<ApiResponse<Vec<BusinessDetails>, SearchExtra>> {
    let query = params
        .q
        .filter(|q| !q.is_empty())
        .ok_or(ApiError::MissingQuery)?;

    let businesses = state
        .store
        .search_businesses(&query, SEARCH_LIMIT)
        .await
        .map_err(ApiError::internal("Failed to search businesses"))?;

    let count = businesses.len();
    Ok(Json(ApiResponse::with(businesses, SearchExtra { query, count })))
}

/// GET /api/businesses/rating/:rating
async fn businesses_by_rating(
    State(state): State<AppState>,
    Path(rating): Path<String>,
) -> ApiResult<ApiResponse<Vec<BusinessDetails>>> {
    let rating: i32 = rating
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidRating(rating.clone()))?;

    let businesses = state
        .store
        .businesses_by_rating(rating)
        .await
        .map_err(ApiError::internal("Failed to fetch businesses by rating"))?;
    Ok(Json(ApiResponse::ok(businesses)))
}

/// GET /api/businesses/suburb/:suburb
async fn businesses_by_suburb(
    State(state): State<AppState>,
    Path(suburb): Path<String>,
) -> ApiResult<ApiResponse<Vec<BusinessDetails>>> {
    let businesses = state
        .store
        .businesses_by_suburb(&suburb)
        .await
        .map_err(ApiError::internal("Failed to fetch businesses by suburb"))?;
    Ok(Json(ApiResponse::ok(businesses)))
}

/// GET /api/businesses/permit-type/:permit_type
async fn businesses_by_permit_type(
    State(state): State<AppState>,
    Path(permit_type): Path<String>,
) -> ApiResult<ApiResponse<Vec<BusinessDetails>>> {
    let businesses = state
        .store
        .businesses_by_permit_type(&permit_type)
        .await
        .map_err(ApiError::internal("Failed to fetch businesses by permit type"))?;
    Ok(Json(ApiResponse::ok(businesses)))
}

/// GET /api/statistics
async fn statistics(State(state): State<AppState>) -> ApiResult<ApiResponse<Statistics>> {
    let store = &state.store;

    let (summary, mut permit_statistics, mut suburb_analysis, rating_distribution, top, low) =
        tokio::try_join!(
            store.database_summary(),
            store.permit_statistics(),
            store.suburb_analysis(),
            store.rating_distribution(),
            store.top_rated_businesses(RATED_BUSINESSES_LIMIT),
            store.low_rated_businesses(RATED_BUSINESSES_LIMIT),
        )
        .map_err(ApiError::internal("Failed to fetch statistics"))?;

    permit_statistics.truncate(STATISTICS_TOP_N);
    suburb_analysis.truncate(STATISTICS_TOP_N);

    Ok(Json(ApiResponse::ok(Statistics {
        summary,
        permit_statistics,
        suburb_analysis,
        rating_distribution,
        top_rated_businesses: top,
        low_rated_businesses: low,
    })))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/businesses", get(list_businesses))
        .route("/businesses/search", get(search_businesses))
        .route("/businesses/rating/:rating", get(businesses_by_rating))
        .route("/businesses/suburb/:suburb", get(businesses_by_suburb))
        .route("/businesses/permit-type/:permit_type", get(businesses_by_permit_type))
        .route("/statistics", get(statistics))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::build_lookups;
    use crate::importer::import_records;
    use crate::reader::CleanedRecord;
    use crate::store::SqliteStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn record(name: &str, rating: Option<u8>, suburb: &str, permits: &[&str]) -> CleanedRecord {
        CleanedRecord {
            business_name: name.to_string(),
            full_address: format!("1 Main St, {}", suburb),
            address_line_1: Some("1 Main St".to_string()),
            address_line_2: None,
            phone_number: None,
            eat_safe_rating: rating,
            permit_types: permits.iter().map(|p| p.to_string()).collect(),
            suburb_name: Some(suburb.to_string()),
            original_index: 0,
        }
    }

    async fn seeded_app() -> Router {
        let store = SqliteStore::open_in_memory().unwrap();
        store.apply_schema(store.default_schema()).await.unwrap();

        let records = vec![
            record("Alpha Cafe", Some(5), "Sydney", &["Food Premises"]),
            record("Beta Bistro", Some(3), "Glebe", &["Food Premises", "Mobile Food Vendor"]),
            record("Gamma Grill", Some(4), "Sydney", &[]),
        ];
        let lookups = build_lookups(&store, &records).await.unwrap();
        import_records(&store, &records, &lookups).await;

        router(AppState {
            store: Arc::new(store),
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(seeded_app().await, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_list_with_pagination() {
        let (status, body) = get_json(seeded_app().await, "/api/businesses?limit=2&offset=1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["pagination"]["limit"], 2);
        assert_eq!(body["pagination"]["offset"], 1);
        assert_eq!(body["pagination"]["count"], 2);
        assert_eq!(body["data"][0]["business_name"], "Beta Bistro");
    }

    #[tokio::test]
    async fn test_list_defaults_on_bad_params() {
        let (status, body) = get_json(seeded_app().await, "/api/businesses?limit=abc&offset=-4").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["limit"], DEFAULT_PAGE_LIMIT);
        assert_eq!(body["pagination"]["offset"], 0);
        assert_eq!(body["pagination"]["count"], 3);
    }

    #[tokio::test]
    async fn test_zero_limit_is_honoured() {
        let (status, body) = get_json(seeded_app().await, "/api/businesses?limit=0").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["limit"], 0);
        assert_eq!(body["pagination"]["count"], 0);
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_rating_is_400_envelope() {
        let (status, body) = get_json(seeded_app().await, "/api/businesses/rating/abc").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid rating: abc");
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (status, body) = get_json(seeded_app().await, "/api/businesses/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Search query is required");

        let (status, _) = get_json(seeded_app().await, "/api/businesses/search?q=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_matches_suburb() {
        let (status, body) = get_json(seeded_app().await, "/api/businesses/search?q=glebe").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "glebe");
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["business_name"], "Beta Bistro");
    }

    #[tokio::test]
    async fn test_filters() {
        let (_, body) = get_json(seeded_app().await, "/api/businesses/rating/5").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = get_json(seeded_app().await, "/api/businesses/suburb/Sydney").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = get_json(seeded_app().await, "/api/businesses/permit-type/Mobile%20Food").await;
        assert_eq!(body["data"][0]["business_name"], "Beta Bistro");
    }

    #[tokio::test]
    async fn test_statistics_bundle() {
        let (status, body) = get_json(seeded_app().await, "/api/statistics").await;

        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["summary"]["totalBusinesses"], 3);
        assert_eq!(data["summary"]["totalPermits"], 3);
        assert_eq!(data["permitStatistics"][0]["permit_type_name"], "Food Premises");
        assert_eq!(data["suburbAnalysis"][0]["suburb_name"], "Sydney");
        assert_eq!(data["ratingDistribution"].as_array().unwrap().len(), 3);
        assert_eq!(data["topRatedBusinesses"][0]["business_name"], "Alpha Cafe");
        assert_eq!(data["lowRatedBusinesses"][0]["business_name"], "Beta Bistro");
    }

    #[tokio::test]
    async fn test_store_failure_is_generic_500() {
        // No schema applied: every view query fails
        let store = SqliteStore::open_in_memory().unwrap();
        let app = router(AppState {
            store: Arc::new(store),
        });

        let (status, body) = get_json(app, "/api/businesses").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Failed to fetch businesses");
    }
}
