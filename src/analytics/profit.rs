use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::config::fees;
use crate::db::RecordStore;
use crate::error::{AppError, Result};
use crate::provider::{MarketplaceProvider, ProductDetails};
use crate::types::{NewProfitMargin, Product, ProductPerformance, ProfitMargin, Sale};

/// The six cost components of a day's profit, each independently pluggable.
/// `FlatRateCosts` carries placeholder formulas; a real fee table implements
/// this trait and drops in without touching the aggregation.
pub trait CostSchedule: Send + Sync {
    /// Marketplace fees (referral + fulfillment) across the day's units.
    fn marketplace_fees(&self, details: &ProductDetails, sales: &[Sale]) -> f64;

    /// Outbound shipping across the day's units.
    fn shipping_cost(&self, details: &ProductDetails, sales: &[Sale]) -> f64;

    /// Landed unit cost of the goods sold.
    fn product_cost(&self, product: &Product) -> f64;

    /// Warehouse storage fees.
    fn storage_fees(&self, details: &ProductDetails) -> f64;

    /// Ad spend attributed to the product on the date.
    fn advertising_cost(&self, product: &Product, date: NaiveDate) -> f64;

    /// Cost of returns attributed to the product on the date.
    fn returns_cost(&self, product: &Product, date: NaiveDate) -> f64;
}

/// Placeholder schedule: 15% referral on list price plus a flat fulfillment
/// fee per unit, flat shipping per unit, everything else zero.
#[derive(Debug, Default)]
pub struct FlatRateCosts;

impl FlatRateCosts {
    fn units(sales: &[Sale]) -> f64 {
        sales.iter().map(|s| s.quantity).sum::<i64>() as f64
    }
}

impl CostSchedule for FlatRateCosts {
    fn marketplace_fees(&self, details: &ProductDetails, sales: &[Sale]) -> f64 {
        let per_unit = details.price * fees::REFERRAL_FEE_RATE + fees::FULFILLMENT_FEE_PER_UNIT;
        per_unit * Self::units(sales)
    }

    fn shipping_cost(&self, _details: &ProductDetails, sales: &[Sale]) -> f64 {
        Self::units(sales) * fees::SHIPPING_COST_PER_UNIT
    }

    fn product_cost(&self, _product: &Product) -> f64 {
        0.0
    }

    fn storage_fees(&self, _details: &ProductDetails) -> f64 {
        0.0
    }

    fn advertising_cost(&self, _product: &Product, _date: NaiveDate) -> f64 {
        0.0
    }

    fn returns_cost(&self, _product: &Product, _date: NaiveDate) -> f64 {
        0.0
    }
}

/// Derives per-date net profit and margin from sales revenue and the cost
/// schedule, and summarizes margin history.
#[derive(Clone)]
pub struct ProfitCalculator {
    store: RecordStore,
    provider: Arc<dyn MarketplaceProvider>,
    costs: Arc<dyn CostSchedule>,
}

impl ProfitCalculator {
    pub fn new(store: RecordStore, provider: Arc<dyn MarketplaceProvider>) -> Self {
        Self::with_schedule(store, provider, Arc::new(FlatRateCosts))
    }

    pub fn with_schedule(
        store: RecordStore,
        provider: Arc<dyn MarketplaceProvider>,
        costs: Arc<dyn CostSchedule>,
    ) -> Self {
        Self { store, provider, costs }
    }

    /// Compute and append one ProfitMargin row for the product on `date`
    /// (today when absent). Repeated calls for the same (product, date)
    /// append further rows.
    ///
    /// The catalog lookup happens before anything is written, so a provider
    /// failure (or an ASIN the marketplace doesn't know) aborts with no
    /// partial state.
    pub async fn calculate_profit_margin(
        &self,
        product: &Product,
        date: Option<NaiveDate>,
    ) -> Result<ProfitMargin> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());

        let details = self
            .provider
            .get_product_details(&product.asin)
            .await?
            .ok_or_else(|| AppError::ProductNotFound(product.asin.clone()))?;

        let sales = self.store.sales_on(product.id, date).await?;
        let total_revenue: f64 = sales.iter().map(|s| s.revenue).sum();

        let amazon_fees = self.costs.marketplace_fees(&details, &sales);
        let shipping_cost = self.costs.shipping_cost(&details, &sales);
        let product_cost = self.costs.product_cost(product);
        let storage_fees = self.costs.storage_fees(&details);
        let advertising_cost = self.costs.advertising_cost(product, date);
        let returns_cost = self.costs.returns_cost(product, date);

        let total_costs = amazon_fees
            + shipping_cost
            + product_cost
            + storage_fees
            + advertising_cost
            + returns_cost;

        let net_profit = total_revenue - total_costs;
        let margin_percentage = if total_revenue > 0.0 {
            net_profit / total_revenue * 100.0
        } else {
            0.0
        };

        let margin = self
            .store
            .insert_profit_margin(&NewProfitMargin {
                product_id: product.id,
                date,
                selling_price: details.price,
                amazon_fees,
                shipping_cost,
                product_cost,
                storage_fees,
                advertising_cost,
                returns_cost,
                net_profit,
                margin_percentage,
            })
            .await?;

        info!(
            asin = %product.asin,
            %date,
            net_profit,
            margin_percentage,
            "calculated profit margin"
        );
        Ok(margin)
    }

    /// The most recent `days` margin rows, newest date first. `days` caps the
    /// row count, not the calendar span: with several rows per date the
    /// result can cover fewer than `days` distinct dates.
    pub async fn profit_trends(&self, product_id: i64, days: i64) -> Result<Vec<ProfitMargin>> {
        self.store.profit_margins_recent(product_id, days).await
    }

    /// Rollup over every margin row the product has. `None` when the product
    /// has no margin history yet.
    pub async fn product_performance(&self, product_id: i64) -> Result<Option<ProductPerformance>> {
        let margins = self.store.profit_margins_all(product_id).await?;
        if margins.is_empty() {
            return Ok(None);
        }

        let count = margins.len() as f64;
        let mut highest = f64::NEG_INFINITY;
        let mut lowest = f64::INFINITY;
        let mut margin_sum = 0.0;
        let mut profit_sum = 0.0;
        for margin in &margins {
            highest = highest.max(margin.margin_percentage);
            lowest = lowest.min(margin.margin_percentage);
            margin_sum += margin.margin_percentage;
            profit_sum += margin.net_profit;
        }

        Ok(Some(ProductPerformance {
            average_margin: margin_sum / count,
            highest_margin: highest,
            lowest_margin: lowest,
            total_profit: profit_sum,
            average_profit: profit_sum / count,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
