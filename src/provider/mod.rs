//! Marketplace data provider: the SP-API surface the trackers consume.
//!
//! The trait is the contract; `SpApiClient` is the HTTP implementation.
//! Tests inject stubs, so nothing below the trait leaks into the analytics
//! layer.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;

/// Catalog details for one listing. Fields default when the API omits them,
/// mirroring how loosely the upstream payloads are specified.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductDetails {
    #[serde(default)]
    pub asin: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: f64,
}

/// One competing offer for an ASIN.
#[derive(Debug, Clone, Deserialize)]
pub struct CompetingOffer {
    pub asin: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub shipping_price: f64,
    #[serde(default)]
    pub is_prime: bool,
    #[serde(default)]
    pub is_fba: bool,
    #[serde(default = "default_condition")]
    pub condition: String,
}

fn default_condition() -> String {
    "New".to_string()
}

/// Ad/search metrics for one (asin, keyword) pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordMetrics {
    #[serde(default)]
    pub rank: i64,
    #[serde(default)]
    pub impressions: i64,
    #[serde(default)]
    pub clicks: i64,
    #[serde(default)]
    pub conversions: i64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub acos: f64,
}

#[async_trait]
pub trait MarketplaceProvider: Send + Sync {
    /// Catalog lookup. `None` means the marketplace doesn't know the ASIN —
    /// a normal outcome, not an error.
    async fn get_product_details(&self, asin: &str) -> Result<Option<ProductDetails>>;

    async fn get_competing_offers(&self, asin: &str) -> Result<Vec<CompetingOffer>>;

    async fn get_keyword_performance(&self, asin: &str, keyword: &str) -> Result<KeywordMetrics>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

// SP-API wraps every response body in a `payload` object.
#[derive(Debug, Deserialize)]
struct DetailsEnvelope {
    #[serde(default)]
    payload: ProductDetails,
}

#[derive(Debug, Deserialize)]
struct OffersEnvelope {
    #[serde(default)]
    payload: Vec<CompetingOffer>,
}

#[derive(Debug, Deserialize)]
struct MetricsEnvelope {
    #[serde(default)]
    payload: KeywordMetrics,
}

pub struct SpApiClient {
    client: reqwest::Client,
    base_url: String,
    marketplace_id: String,
    access_token: Option<String>,
}

impl SpApiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.sp_api_url.clone(),
            marketplace_id: cfg.marketplace_id.clone(),
            access_token: cfg.access_token.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.get(url).query(&[("marketplaceIds", &self.marketplace_id)]);
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl MarketplaceProvider for SpApiClient {
    async fn get_product_details(&self, asin: &str) -> Result<Option<ProductDetails>> {
        let url = format!("{}/catalog/v0/items/{asin}", self.base_url);
        let resp = self.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(asin, "catalog item not found");
            return Ok(None);
        }
        let envelope: DetailsEnvelope = resp.error_for_status()?.json().await?;
        Ok(Some(envelope.payload))
    }

    async fn get_competing_offers(&self, asin: &str) -> Result<Vec<CompetingOffer>> {
        let url = format!("{}/products/pricing/v0/items/{asin}/offers", self.base_url);
        let resp = self.get(&url).send().await?;
        let envelope: OffersEnvelope = resp.error_for_status()?.json().await?;
        Ok(envelope.payload)
    }

    async fn get_keyword_performance(&self, asin: &str, keyword: &str) -> Result<KeywordMetrics> {
        let url = format!("{}/brandAnalytics/v1/items/{asin}/keywordMetrics", self.base_url);
        let resp = self.get(&url).query(&[("keyword", keyword)]).send().await?;
        let envelope: MetricsEnvelope = resp.error_for_status()?.json().await?;
        Ok(envelope.payload)
    }
}

// ---------------------------------------------------------------------------
// Test stub
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::AppError;

    /// Scriptable in-memory provider for service tests. Failure toggles let
    /// tests exercise the abort/rollback paths without a network.
    #[derive(Default)]
    pub(crate) struct StubProvider {
        pub details: Option<ProductDetails>,
        pub offers: Vec<CompetingOffer>,
        /// keyword → metrics; unknown keywords resolve to all-zero metrics.
        pub metrics: HashMap<String, KeywordMetrics>,
        pub fail_details: bool,
        pub fail_offers: bool,
        /// Fail the Nth keyword fetch (0-based) and every one after it.
        pub fail_keyword_calls_from: Option<usize>,
        pub keyword_calls: AtomicUsize,
    }

    impl StubProvider {
        pub(crate) fn offer(asin: &str, price: f64) -> CompetingOffer {
            CompetingOffer {
                asin: asin.to_string(),
                price,
                shipping_price: 0.0,
                is_prime: false,
                is_fba: false,
                condition: "New".to_string(),
            }
        }
    }

    #[async_trait]
    impl MarketplaceProvider for StubProvider {
        async fn get_product_details(&self, asin: &str) -> Result<Option<ProductDetails>> {
            if self.fail_details {
                return Err(AppError::Provider("stubbed catalog outage".to_string()));
            }
            let _ = asin;
            Ok(self.details.clone())
        }

        async fn get_competing_offers(&self, _asin: &str) -> Result<Vec<CompetingOffer>> {
            if self.fail_offers {
                return Err(AppError::Provider("stubbed pricing outage".to_string()));
            }
            Ok(self.offers.clone())
        }

        async fn get_keyword_performance(
            &self,
            _asin: &str,
            keyword: &str,
        ) -> Result<KeywordMetrics> {
            let call = self.keyword_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(from) = self.fail_keyword_calls_from {
                if call >= from {
                    return Err(AppError::Provider("stubbed keyword outage".to_string()));
                }
            }
            Ok(self.metrics.get(keyword).cloned().unwrap_or_default())
        }
    }
}
