use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analytics::{CompetitorTracker, KeywordTracker, ProfitCalculator};
use crate::config::{DEFAULT_ALERT_THRESHOLD, DEFAULT_TOP_KEYWORDS_LIMIT, DEFAULT_TREND_DAYS};
use crate::db::{RecordStore, SaleWithAsin};
use crate::error::{AppError, Result};
use crate::provider::MarketplaceProvider;
use crate::types::{
    CompetitorPrice, KeywordHealth, KeywordOpportunity, KeywordPerformance, MarketPosition,
    PriceAlert, Product, ProductPerformance, ProfitMargin,
};

#[derive(Clone)]
pub struct ApiState {
    pub store: RecordStore,
    pub provider: Arc<dyn MarketplaceProvider>,
    pub competitor: CompetitorTracker,
    pub profit: ProfitCalculator,
    pub keywords: KeywordTracker,
}

impl ApiState {
    pub fn new(store: RecordStore, provider: Arc<dyn MarketplaceProvider>) -> Self {
        Self {
            competitor: CompetitorTracker::new(store.clone(), Arc::clone(&provider)),
            profit: ProfitCalculator::new(store.clone(), Arc::clone(&provider)),
            keywords: KeywordTracker::new(store.clone(), Arc::clone(&provider)),
            store,
            provider,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats/summary", get(stats_summary))
        .route("/sales", get(sales))
        .route("/products/:asin", get(product_summary))
        .route("/products/:asin/track", post(track_product))
        .route("/products/:asin/market-position", get(market_position))
        .route("/products/:asin/price-alerts", get(price_alerts))
        .route("/products/:asin/price-history", get(price_history))
        .route("/products/:asin/profit-trends", get(profit_trends))
        .route("/products/:asin/performance", get(product_performance))
        .route("/products/:asin/keywords/trends", get(keyword_trends))
        .route("/products/:asin/keywords/top", get(top_keywords))
        .route("/products/:asin/keywords/opportunities", get(keyword_opportunities))
        .route("/products/:asin/keywords/rankings", get(keyword_rankings))
        .route("/products/:asin/keywords/health", get(keyword_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

#[derive(Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<f64>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SalesQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub products: i64,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub total_products: i64,
    pub total_sales: i64,
    pub revenue_30d: f64,
}

#[derive(Serialize)]
pub struct ProductSummary {
    pub asin: String,
    pub title: String,
    pub total_sales: i64,
    pub total_revenue: f64,
}

/// Per-subsystem outcome of a tracking run. A false flag means that
/// subsystem failed (and wrote nothing); the others are unaffected.
#[derive(Serialize)]
pub struct TrackResponse {
    pub competitor_prices: bool,
    pub profit_margin: bool,
    pub keyword_performance: bool,
}

// ---------------------------------------------------------------------------
// Product resolution
// ---------------------------------------------------------------------------

/// Look the ASIN up in the store; on a miss, ask the marketplace and create
/// the product on first reference. Unknown everywhere → 404.
async fn find_or_create_product(state: &ApiState, asin: &str) -> Result<Product> {
    if let Some(product) = state.store.product_by_asin(asin).await? {
        return Ok(product);
    }
    match state.provider.get_product_details(asin).await? {
        Some(details) => state.store.insert_product(asin, &details.title).await,
        None => Err(AppError::ProductNotFound(asin.to_string())),
    }
}

/// Store-only lookup for read aggregates: a product we have never tracked
/// has no rows to aggregate, so it is a plain 404.
async fn require_product(state: &ApiState, asin: &str) -> Result<Product> {
    state
        .store
        .product_by_asin(asin)
        .await?
        .ok_or_else(|| AppError::ProductNotFound(asin.to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<ApiState>) -> Result<Json<HealthResponse>> {
    let products = state.store.product_count().await?;
    Ok(Json(HealthResponse { status: "ok", products }))
}

async fn stats_summary(State(state): State<ApiState>) -> Result<Json<SummaryResponse>> {
    let total_products = state.store.product_count().await?;
    let total_sales = state.store.sales_count().await?;
    let since = Utc::now().date_naive() - Duration::days(30);
    let revenue_30d = state.store.revenue_since(since).await?;
    Ok(Json(SummaryResponse { total_products, total_sales, revenue_30d }))
}

async fn sales(
    State(state): State<ApiState>,
    Query(params): Query<SalesQuery>,
) -> Result<Json<Vec<SaleWithAsin>>> {
    let (Some(start), Some(end)) = (params.start_date, params.end_date) else {
        return Err(AppError::MalformedInput(
            "start_date and end_date are required".to_string(),
        ));
    };
    let start = parse_date(&start)?;
    let end = parse_date(&end)?;
    Ok(Json(state.store.sales_between(start, end).await?))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::MalformedInput("Invalid date format. Use YYYY-MM-DD".to_string()))
}

async fn product_summary(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<ProductSummary>> {
    let product = find_or_create_product(&state, &asin).await?;
    let totals = state.store.sales_totals(product.id).await?;
    Ok(Json(ProductSummary {
        asin: product.asin,
        title: product.title,
        total_sales: totals.total_sales,
        total_revenue: totals.total_revenue,
    }))
}

/// Runs the three tracking subsystems for a product. Each subsystem is its
/// own write unit: one failing leaves the others' rows in place.
async fn track_product(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<TrackResponse>> {
    let product = find_or_create_product(&state, &asin).await?;

    let competitor_prices = match state.competitor.track_competitor_prices(&product).await {
        Ok(_) => true,
        Err(e) => {
            warn!(asin = %product.asin, "competitor tracking failed: {e}");
            false
        }
    };
    let profit_margin = match state.profit.calculate_profit_margin(&product, None).await {
        Ok(_) => true,
        Err(e) => {
            warn!(asin = %product.asin, "profit calculation failed: {e}");
            false
        }
    };
    let keyword_performance = match state.keywords.track_keyword_performance(&product, None).await
    {
        Ok(_) => true,
        Err(e) => {
            warn!(asin = %product.asin, "keyword tracking failed: {e}");
            false
        }
    };

    Ok(Json(TrackResponse { competitor_prices, profit_margin, keyword_performance }))
}

async fn market_position(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<Option<MarketPosition>>> {
    let product = require_product(&state, &asin).await?;
    Ok(Json(state.competitor.market_position(product.id).await?))
}

async fn price_alerts(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
    Query(params): Query<ThresholdQuery>,
) -> Result<Json<Vec<PriceAlert>>> {
    let product = require_product(&state, &asin).await?;
    let threshold = params.threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD);
    Ok(Json(state.competitor.price_alerts(product.id, threshold).await?))
}

async fn price_history(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Result<Json<Vec<CompetitorPrice>>> {
    let product = require_product(&state, &asin).await?;
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);
    Ok(Json(state.competitor.price_history(product.id, days).await?))
}

async fn profit_trends(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Result<Json<Vec<ProfitMargin>>> {
    let product = require_product(&state, &asin).await?;
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);
    Ok(Json(state.profit.profit_trends(product.id, days).await?))
}

async fn product_performance(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<Option<ProductPerformance>>> {
    let product = require_product(&state, &asin).await?;
    Ok(Json(state.profit.product_performance(product.id).await?))
}

async fn keyword_trends(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Result<Json<Vec<KeywordPerformance>>> {
    let product = require_product(&state, &asin).await?;
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);
    Ok(Json(state.keywords.keyword_trends(product.id, days).await?))
}

async fn top_keywords(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<KeywordPerformance>>> {
    let product = require_product(&state, &asin).await?;
    let limit = params.limit.unwrap_or(DEFAULT_TOP_KEYWORDS_LIMIT);
    Ok(Json(state.keywords.top_keywords(product.id, limit).await?))
}

async fn keyword_opportunities(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<Vec<KeywordOpportunity>>> {
    let product = require_product(&state, &asin).await?;
    Ok(Json(state.keywords.keyword_opportunities(product.id).await?))
}

async fn keyword_rankings(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<Vec<KeywordPerformance>>> {
    let product = require_product(&state, &asin).await?;
    Ok(Json(state.keywords.keyword_rankings(product.id).await?))
}

async fn keyword_health(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<Option<KeywordHealth>>> {
    let product = require_product(&state, &asin).await?;
    Ok(Json(state.keywords.keyword_health(product.id).await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
