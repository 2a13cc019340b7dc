use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// A tracked marketplace listing. Created on first reference (catalog lookup
/// or tracking call), never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    /// 10-char marketplace identifier, unique per product.
    pub asin: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Time-series records — append-only, owned by their product
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sale {
    pub id: i64,
    pub product_id: i64,
    pub date: NaiveDate,
    pub quantity: i64,
    pub revenue: f64,
    pub marketplace: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A competitor price snapshot, not a delta. Price history is reconstructed
/// by reading snapshots ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompetitorPrice {
    pub id: i64,
    pub product_id: i64,
    pub competitor_asin: String,
    pub price: f64,
    pub shipping_price: f64,
    pub is_prime: bool,
    pub is_fba: bool,
    pub condition: String,
    pub timestamp: DateTime<Utc>,
}

/// Input shape for a snapshot insert. Carries its own timestamp so callers
/// control the observation time.
#[derive(Debug, Clone)]
pub struct NewCompetitorPrice {
    pub product_id: i64,
    pub competitor_asin: String,
    pub price: f64,
    pub shipping_price: f64,
    pub is_prime: bool,
    pub is_fba: bool,
    pub condition: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfitMargin {
    pub id: i64,
    pub product_id: i64,
    pub date: NaiveDate,
    pub selling_price: f64,
    pub amazon_fees: f64,
    pub shipping_cost: f64,
    pub product_cost: f64,
    pub storage_fees: f64,
    pub advertising_cost: f64,
    pub returns_cost: f64,
    /// Invariant: `net_profit == revenue - (the six cost components)`.
    pub net_profit: f64,
    /// `net_profit / revenue * 100` when revenue > 0, else 0.
    pub margin_percentage: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProfitMargin {
    pub product_id: i64,
    pub date: NaiveDate,
    pub selling_price: f64,
    pub amazon_fees: f64,
    pub shipping_cost: f64,
    pub product_cost: f64,
    pub storage_fees: f64,
    pub advertising_cost: f64,
    pub returns_cost: f64,
    pub net_profit: f64,
    pub margin_percentage: f64,
}

/// One observation of a keyword's ad/search performance on a date.
/// `ctr` and `acos` come from the provider as-is — they are not derived from
/// clicks/impressions here and no consistency between them is enforced.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeywordPerformance {
    pub id: i64,
    pub product_id: i64,
    pub keyword: String,
    pub search_rank: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub ctr: f64,
    pub acos: f64,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewKeywordPerformance {
    pub product_id: i64,
    pub keyword: String,
    pub search_rank: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub ctr: f64,
    pub acos: f64,
    pub date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Derived aggregates — computed on demand, never persisted
// ---------------------------------------------------------------------------

/// Competitive standing from the last 24h of competitor snapshots.
/// Compares the raw `price` field; shipping is excluded from the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPosition {
    pub average_market_price: f64,
    pub lowest_price: f64,
    pub highest_price: f64,
    pub price_range: f64,
    pub competitor_count: usize,
}

/// A significant price movement by one competitor between the latest snapshot
/// and the most recent snapshot older than the alert baseline window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub competitor_asin: String,
    /// Relative change: `(new - old) / old`. Negative = price drop.
    pub price_change: f64,
    pub old_price: f64,
    pub new_price: f64,
}

/// Rollup over every ProfitMargin row a product has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPerformance {
    pub average_margin: f64,
    pub highest_margin: f64,
    pub lowest_margin: f64,
    pub total_profit: f64,
    pub average_profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    /// High impressions but almost no clicks — listing not compelling.
    LowCtr,
    /// Clicks arrive but don't convert — pricing or content issue.
    LowConversion,
    /// Ad spend is eating the margin — bids need adjustment.
    HighAcos,
}

impl OpportunityKind {
    pub fn suggestion(self) -> &'static str {
        match self {
            OpportunityKind::LowCtr => "Optimize listing for better click-through rate",
            OpportunityKind::LowConversion => "Review pricing and listing content",
            OpportunityKind::HighAcos => "Consider adjusting bid strategy",
        }
    }
}

impl std::fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpportunityKind::LowCtr => "low_ctr",
            OpportunityKind::LowConversion => "low_conversion",
            OpportunityKind::HighAcos => "high_acos",
        };
        write!(f, "{s}")
    }
}

/// One rule match on one performance row. A single row may produce up to
/// three of these; matches are not deduplicated across rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordOpportunity {
    pub keyword: String,
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
    pub suggestion: String,
}

/// Health rollup over the last 30 days of keyword rows. Averages are
/// unweighted arithmetic means across rows, not impression-weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHealth {
    pub total_keywords: usize,
    pub average_rank: f64,
    pub total_impressions: i64,
    pub average_ctr: f64,
    pub average_acos: f64,
}
