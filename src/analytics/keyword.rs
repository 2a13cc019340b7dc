use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use crate::config::{opportunity, KEYWORD_WINDOW_DAYS, TOP_KEYWORDS_WINDOW_DAYS};
use crate::db::RecordStore;
use crate::error::Result;
use crate::provider::MarketplaceProvider;
use crate::types::{
    KeywordHealth, KeywordOpportunity, KeywordPerformance, NewKeywordPerformance, OpportunityKind,
    Product,
};

/// Tracks per-keyword ad/search metrics and derives the keyword aggregates:
/// trends, top performers, rule-based opportunities and health.
#[derive(Clone)]
pub struct KeywordTracker {
    store: RecordStore,
    provider: Arc<dyn MarketplaceProvider>,
}

impl KeywordTracker {
    pub fn new(store: RecordStore, provider: Arc<dyn MarketplaceProvider>) -> Self {
        Self { store, provider }
    }

    /// Fetch today's metrics for each keyword and append one row per keyword.
    /// With no explicit list, keywords are derived from the product title.
    ///
    /// Every provider fetch completes before the insert transaction opens, so
    /// a failure partway through the fetches leaves zero new rows.
    pub async fn track_keyword_performance(
        &self,
        product: &Product,
        keywords: Option<Vec<String>>,
    ) -> Result<usize> {
        let keywords = keywords.unwrap_or_else(|| extract_keywords(&product.title));
        let today = Utc::now().date_naive();

        let mut rows = Vec::with_capacity(keywords.len());
        for keyword in &keywords {
            let metrics = self.provider.get_keyword_performance(&product.asin, keyword).await?;
            rows.push(NewKeywordPerformance {
                product_id: product.id,
                keyword: keyword.clone(),
                search_rank: metrics.rank,
                impressions: metrics.impressions,
                clicks: metrics.clicks,
                conversions: metrics.conversions,
                ctr: metrics.ctr,
                acos: metrics.acos,
                date: today,
            });
        }

        let inserted = self.store.insert_keyword_performances(&rows).await?;
        info!(asin = %product.asin, keywords = inserted, "tracked keyword performance");
        Ok(inserted)
    }

    /// Rows from the last `days` days, newest date first, keyword ascending
    /// within a date.
    pub async fn keyword_trends(
        &self,
        product_id: i64,
        days: i64,
    ) -> Result<Vec<KeywordPerformance>> {
        let since = Utc::now().date_naive() - Duration::days(days);
        self.store.keyword_performances_since(product_id, since).await
    }

    /// Best converters over the last 7 days: conversions descending,
    /// truncated to `limit`. Ties keep insertion order.
    pub async fn top_keywords(
        &self,
        product_id: i64,
        limit: usize,
    ) -> Result<Vec<KeywordPerformance>> {
        let since = Utc::now().date_naive() - Duration::days(TOP_KEYWORDS_WINDOW_DAYS);
        let mut rows = self.store.keyword_performances_since_by_id(product_id, since).await?;
        rows.sort_by(|a, b| b.conversions.cmp(&a.conversions));
        rows.truncate(limit);
        Ok(rows)
    }

    /// Rule scan over the last 30 days of rows. Each row is checked against
    /// three independent rules and can contribute up to three flags; the same
    /// keyword may appear once per matching row.
    pub async fn keyword_opportunities(&self, product_id: i64) -> Result<Vec<KeywordOpportunity>> {
        let since = Utc::now().date_naive() - Duration::days(KEYWORD_WINDOW_DAYS);
        let rows = self.store.keyword_performances_since_by_id(product_id, since).await?;

        let mut opportunities = Vec::new();
        for row in &rows {
            if row.impressions > opportunity::MIN_IMPRESSIONS && row.ctr < opportunity::LOW_CTR {
                opportunities.push(flag(&row.keyword, OpportunityKind::LowCtr));
            }
            if row.clicks > opportunity::MIN_CLICKS && row.conversions < opportunity::LOW_CONVERSIONS
            {
                opportunities.push(flag(&row.keyword, OpportunityKind::LowConversion));
            }
            if row.acos > opportunity::HIGH_ACOS {
                opportunities.push(flag(&row.keyword, OpportunityKind::HighAcos));
            }
        }
        Ok(opportunities)
    }

    /// Today's rows, best search rank first.
    pub async fn keyword_rankings(&self, product_id: i64) -> Result<Vec<KeywordPerformance>> {
        let today = Utc::now().date_naive();
        self.store.keyword_performances_on(product_id, today).await
    }

    /// Health rollup over the last 30 days. Averages are unweighted means
    /// across rows. `None` when the window holds no rows.
    pub async fn keyword_health(&self, product_id: i64) -> Result<Option<KeywordHealth>> {
        let since = Utc::now().date_naive() - Duration::days(KEYWORD_WINDOW_DAYS);
        let rows = self.store.keyword_performances_since_by_id(product_id, since).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let count = rows.len() as f64;
        let distinct: HashSet<&str> = rows.iter().map(|r| r.keyword.as_str()).collect();
        let rank_sum: i64 = rows.iter().map(|r| r.search_rank).sum();
        let impressions: i64 = rows.iter().map(|r| r.impressions).sum();
        let ctr_sum: f64 = rows.iter().map(|r| r.ctr).sum();
        let acos_sum: f64 = rows.iter().map(|r| r.acos).sum();

        Ok(Some(KeywordHealth {
            total_keywords: distinct.len(),
            average_rank: rank_sum as f64 / count,
            total_impressions: impressions,
            average_ctr: ctr_sum / count,
            average_acos: acos_sum / count,
        }))
    }
}

fn flag(keyword: &str, kind: OpportunityKind) -> KeywordOpportunity {
    KeywordOpportunity {
        keyword: keyword.to_string(),
        kind,
        suggestion: kind.suggestion().to_string(),
    }
}

/// Naive tokenizer: lowercase whitespace-split title tokens, deduplicated
/// keeping first occurrence. A placeholder for real keyword research, not an
/// NLP pass.
fn extract_keywords(title: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|word| seen.insert(word.to_string()))
        .map(|word| word.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
