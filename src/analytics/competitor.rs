use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use crate::config::{ALERT_BASELINE_HOURS, MARKET_POSITION_WINDOW_HOURS};
use crate::db::RecordStore;
use crate::error::Result;
use crate::provider::MarketplaceProvider;
use crate::types::{CompetitorPrice, MarketPosition, NewCompetitorPrice, PriceAlert, Product};

/// Tracks competing offers for a product and derives the competitive
/// aggregates: market position and price alerts.
#[derive(Clone)]
pub struct CompetitorTracker {
    store: RecordStore,
    provider: Arc<dyn MarketplaceProvider>,
}

impl CompetitorTracker {
    pub fn new(store: RecordStore, provider: Arc<dyn MarketplaceProvider>) -> Self {
        Self { store, provider }
    }

    /// Fetch the current competing offers and append one snapshot per offer,
    /// all stamped with the same observation time. The batch lands in a
    /// single transaction; a provider failure leaves the store untouched.
    pub async fn track_competitor_prices(&self, product: &Product) -> Result<usize> {
        let offers = self.provider.get_competing_offers(&product.asin).await?;
        let now = Utc::now();
        let rows: Vec<NewCompetitorPrice> = offers
            .into_iter()
            .map(|offer| NewCompetitorPrice {
                product_id: product.id,
                competitor_asin: offer.asin,
                price: offer.price,
                shipping_price: offer.shipping_price,
                is_prime: offer.is_prime,
                is_fba: offer.is_fba,
                condition: offer.condition,
                timestamp: now,
            })
            .collect();

        let inserted = self.store.insert_competitor_prices(&rows).await?;
        info!(asin = %product.asin, snapshots = inserted, "tracked competitor prices");
        Ok(inserted)
    }

    /// Competitor snapshots from the last `days` days, oldest first.
    pub async fn price_history(&self, product_id: i64, days: i64) -> Result<Vec<CompetitorPrice>> {
        let since = Utc::now() - Duration::days(days);
        self.store.competitor_prices_since(product_id, since).await
    }

    /// Competitive standing over the last 24 hours of snapshots. `None` when
    /// no competitor has been observed in the window — absence of
    /// competition is a valid state, not an error.
    ///
    /// Comparison uses the raw item price; shipping is excluded.
    pub async fn market_position(&self, product_id: i64) -> Result<Option<MarketPosition>> {
        let since = Utc::now() - Duration::hours(MARKET_POSITION_WINDOW_HOURS);
        let snapshots = self.store.competitor_prices_since(product_id, since).await?;
        if snapshots.is_empty() {
            return Ok(None);
        }

        let mut min_price = f64::INFINITY;
        let mut max_price = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for snapshot in &snapshots {
            min_price = min_price.min(snapshot.price);
            max_price = max_price.max(snapshot.price);
            sum += snapshot.price;
        }

        Ok(Some(MarketPosition {
            average_market_price: sum / snapshots.len() as f64,
            lowest_price: min_price,
            highest_price: max_price,
            price_range: max_price - min_price,
            competitor_count: snapshots.len(),
        }))
    }

    /// Significant price movements per competitor: the latest snapshot vs the
    /// most recent snapshot strictly older than the 24h baseline, joined by
    /// `competitor_asin`. A competitor present in only one set yields no
    /// alert, and a zero baseline price is skipped rather than divided by.
    ///
    /// A change of exactly `threshold` fires (`>=`). Alerts come back in
    /// recency order of the latest snapshot.
    pub async fn price_alerts(&self, product_id: i64, threshold: f64) -> Result<Vec<PriceAlert>> {
        let cutoff = Utc::now() - Duration::hours(ALERT_BASELINE_HOURS);
        let latest_rows = self.store.competitor_prices_desc(product_id).await?;
        let previous_rows = self.store.competitor_prices_before(product_id, cutoff).await?;

        let baseline = first_price_per_competitor(&previous_rows);

        let mut alerts = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for row in &latest_rows {
            // Rows are newest-first, so the first hit per competitor is its
            // latest price.
            if !seen.insert(row.competitor_asin.as_str()) {
                continue;
            }
            let Some(&old_price) = baseline.get(row.competitor_asin.as_str()) else {
                continue;
            };
            if old_price <= 0.0 {
                continue;
            }
            let price_change = (row.price - old_price) / old_price;
            if price_change.abs() >= threshold {
                alerts.push(PriceAlert {
                    competitor_asin: row.competitor_asin.clone(),
                    price_change,
                    old_price,
                    new_price: row.price,
                });
            }
        }
        Ok(alerts)
    }
}

/// First (i.e. most recent, given newest-first input) price per competitor.
fn first_price_per_competitor(rows: &[CompetitorPrice]) -> HashMap<&str, f64> {
    let mut prices: HashMap<&str, f64> = HashMap::new();
    for row in rows {
        prices.entry(row.competitor_asin.as_str()).or_insert(row.price);
    }
    prices
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_store;
    use crate::provider::testing::StubProvider;
    use crate::types::NewCompetitorPrice;

    async fn seeded(store: &RecordStore) -> Product {
        store.insert_product("B000TEST01", "Bamboo Cutting Board").await.unwrap()
    }

    fn snapshot(
        product_id: i64,
        asin: &str,
        price: f64,
        hours_ago: i64,
    ) -> NewCompetitorPrice {
        NewCompetitorPrice {
            product_id,
            competitor_asin: asin.to_string(),
            price,
            shipping_price: 1.0,
            is_prime: true,
            is_fba: false,
            condition: "New".to_string(),
            timestamp: Utc::now() - Duration::hours(hours_ago),
        }
    }

    fn tracker(store: RecordStore) -> CompetitorTracker {
        CompetitorTracker::new(store, Arc::new(StubProvider::default()))
    }

    #[tokio::test]
    async fn market_position_over_three_competitors() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        store
            .insert_competitor_prices(&[
                snapshot(product.id, "B000COMP01", 10.0, 1),
                snapshot(product.id, "B000COMP02", 12.0, 2),
                snapshot(product.id, "B000COMP03", 14.0, 3),
            ])
            .await
            .unwrap();

        let position = tracker(store).market_position(product.id).await.unwrap().unwrap();
        assert!((position.average_market_price - 12.0).abs() < 1e-9);
        assert!((position.lowest_price - 10.0).abs() < 1e-9);
        assert!((position.highest_price - 14.0).abs() < 1e-9);
        assert!((position.price_range - 4.0).abs() < 1e-9);
        assert_eq!(position.competitor_count, 3);
    }

    #[tokio::test]
    async fn market_position_without_snapshots_is_none() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        let position = tracker(store).market_position(product.id).await.unwrap();
        assert!(position.is_none());
    }

    #[tokio::test]
    async fn market_position_ignores_stale_snapshots() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        store
            .insert_competitor_prices(&[
                snapshot(product.id, "B000COMP01", 10.0, 48),
                snapshot(product.id, "B000COMP02", 20.0, 1),
            ])
            .await
            .unwrap();

        let position = tracker(store).market_position(product.id).await.unwrap().unwrap();
        assert_eq!(position.competitor_count, 1);
        assert!((position.average_market_price - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn alert_fires_at_threshold_but_not_below() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        store
            .insert_competitor_prices(&[
                // Baselines, older than 24h.
                snapshot(product.id, "B000COMP01", 100.0, 30),
                snapshot(product.id, "B000COMP02", 100.0, 30),
                // Latest: exactly +10% and +9.99%.
                snapshot(product.id, "B000COMP01", 110.0, 1),
                snapshot(product.id, "B000COMP02", 109.99, 1),
            ])
            .await
            .unwrap();

        let alerts = tracker(store).price_alerts(product.id, 0.10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].competitor_asin, "B000COMP01");
        assert!((alerts[0].price_change - 0.10).abs() < 1e-9);
        assert!((alerts[0].old_price - 100.0).abs() < 1e-9);
        assert!((alerts[0].new_price - 110.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn alerts_join_by_competitor_not_position() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        store
            .insert_competitor_prices(&[
                // Baseline set has an extra competitor that later delisted,
                // which would misalign a positional zip.
                snapshot(product.id, "B000GONE00", 55.0, 40),
                snapshot(product.id, "B000COMP01", 100.0, 30),
                // Latest set leads with a brand-new competitor.
                snapshot(product.id, "B000FRESH0", 9.0, 2),
                snapshot(product.id, "B000COMP01", 80.0, 1),
            ])
            .await
            .unwrap();

        let alerts = tracker(store).price_alerts(product.id, 0.10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].competitor_asin, "B000COMP01");
        assert!((alerts[0].price_change + 0.20).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_baseline_price_produces_no_alert() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        store
            .insert_competitor_prices(&[
                snapshot(product.id, "B000COMP01", 0.0, 30),
                snapshot(product.id, "B000COMP01", 50.0, 1),
            ])
            .await
            .unwrap();

        let alerts = tracker(store).price_alerts(product.id, 0.10).await.unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn alerts_on_empty_store_are_empty() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        let alerts = tracker(store).price_alerts(product.id, 0.10).await.unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn tracking_appends_one_snapshot_per_offer() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        let provider = StubProvider {
            offers: vec![
                StubProvider::offer("B000COMP01", 19.99),
                StubProvider::offer("B000COMP02", 24.99),
            ],
            ..Default::default()
        };
        let tracker = CompetitorTracker::new(store.clone(), Arc::new(provider));

        let inserted = tracker.track_competitor_prices(&product).await.unwrap();
        assert_eq!(inserted, 2);
        let rows = store.competitor_prices_desc(product.id).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn tracking_writes_nothing_when_offers_fetch_fails() {
        let store = memory_store().await;
        let product = seeded(&store).await;
        let provider = StubProvider { fail_offers: true, ..Default::default() };
        let tracker = CompetitorTracker::new(store.clone(), Arc::new(provider));

        assert!(tracker.track_competitor_prices(&product).await.is_err());
        let rows = store.competitor_prices_desc(product.id).await.unwrap();
        assert!(rows.is_empty());
    }
}
