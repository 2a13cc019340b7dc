//! SQLite-backed record store for the four time-series collections.
//!
//! Append-mostly: records are inserted and read back, never updated. Writes
//! that span multiple rows go through one transaction so a tracking call
//! either lands completely or not at all.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::types::{
    CompetitorPrice, KeywordPerformance, NewCompetitorPrice, NewKeywordPerformance,
    NewProfitMargin, Product, ProfitMargin, Sale,
};

/// A sale row joined with its product's ASIN, for the date-range export.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SaleWithAsin {
    pub id: i64,
    pub product_asin: String,
    pub date: NaiveDate,
    pub quantity: i64,
    pub revenue: f64,
    pub marketplace: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, sqlx::FromRow)]
pub struct SalesTotals {
    pub total_sales: i64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: sqlx::SqlitePool,
}

impl RecordStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    // -----------------------------------------------------------------------
    // Products
    // -----------------------------------------------------------------------

    pub async fn insert_product(&self, asin: &str, title: &str) -> Result<Product> {
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO products (asin, title, created_at) VALUES (?, ?, ?)")
            .bind(asin)
            .bind(title)
            .bind(now)
            .execute(&self.pool)
            .await?;

        let product = sqlx::query_as::<_, Product>(
            "SELECT id, asin, title, created_at FROM products WHERE id = ?",
        )
        .bind(result.last_insert_rowid())
        .fetch_one(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn product_by_asin(&self, asin: &str) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, asin, title, created_at FROM products WHERE asin = ?",
        )
        .bind(asin)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn product_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Sales
    // -----------------------------------------------------------------------

    pub async fn insert_sale(
        &self,
        product_id: i64,
        date: NaiveDate,
        quantity: i64,
        revenue: f64,
        marketplace: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO sales (product_id, date, quantity, revenue, marketplace, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(product_id)
        .bind(date)
        .bind(quantity)
        .bind(revenue)
        .bind(marketplace)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// All sale rows for a product on one exact date. Multiple rows per day
    /// are allowed; consumers sum them.
    pub async fn sales_on(&self, product_id: i64, date: NaiveDate) -> Result<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, product_id, date, quantity, revenue, marketplace, created_at
            FROM sales
            WHERE product_id = ? AND date = ?
            ORDER BY id ASC
            "#,
        )
        .bind(product_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    pub async fn sales_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SaleWithAsin>> {
        let sales = sqlx::query_as::<_, SaleWithAsin>(
            r#"
            SELECT s.id, p.asin AS product_asin, s.date, s.quantity, s.revenue, s.marketplace
            FROM sales s
            JOIN products p ON p.id = s.product_id
            WHERE s.date >= ? AND s.date <= ?
            ORDER BY s.date ASC, s.id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    pub async fn sales_totals(&self, product_id: i64) -> Result<SalesTotals> {
        let totals = sqlx::query_as::<_, SalesTotals>(
            r#"
            SELECT COUNT(*) AS total_sales, COALESCE(SUM(revenue), 0.0) AS total_revenue
            FROM sales
            WHERE product_id = ?
            "#,
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    pub async fn sales_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn revenue_since(&self, since: NaiveDate) -> Result<f64> {
        let revenue: f64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(revenue), 0.0) FROM sales WHERE date >= ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        Ok(revenue)
    }

    // -----------------------------------------------------------------------
    // Competitor prices
    // -----------------------------------------------------------------------

    /// Insert a batch of snapshots in one transaction. Either all rows land
    /// or none do.
    pub async fn insert_competitor_prices(&self, rows: &[NewCompetitorPrice]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO competitor_prices
                    (product_id, competitor_asin, price, shipping_price,
                     is_prime, is_fba, condition, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.product_id)
            .bind(&row.competitor_asin)
            .bind(row.price)
            .bind(row.shipping_price)
            .bind(row.is_prime)
            .bind(row.is_fba)
            .bind(&row.condition)
            .bind(row.timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    /// Snapshots at or after `since`, oldest first.
    pub async fn competitor_prices_since(
        &self,
        product_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<CompetitorPrice>> {
        let prices = sqlx::query_as::<_, CompetitorPrice>(
            r#"
            SELECT id, product_id, competitor_asin, price, shipping_price,
                   is_prime, is_fba, condition, timestamp
            FROM competitor_prices
            WHERE product_id = ? AND timestamp >= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(product_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    /// Every snapshot for the product, newest first.
    pub async fn competitor_prices_desc(&self, product_id: i64) -> Result<Vec<CompetitorPrice>> {
        let prices = sqlx::query_as::<_, CompetitorPrice>(
            r#"
            SELECT id, product_id, competitor_asin, price, shipping_price,
                   is_prime, is_fba, condition, timestamp
            FROM competitor_prices
            WHERE product_id = ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    /// Snapshots strictly older than `cutoff`, newest first.
    pub async fn competitor_prices_before(
        &self,
        product_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CompetitorPrice>> {
        let prices = sqlx::query_as::<_, CompetitorPrice>(
            r#"
            SELECT id, product_id, competitor_asin, price, shipping_price,
                   is_prime, is_fba, condition, timestamp
            FROM competitor_prices
            WHERE product_id = ? AND timestamp < ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(product_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    // -----------------------------------------------------------------------
    // Profit margins
    // -----------------------------------------------------------------------

    /// Append one margin row. Repeated calculations for the same
    /// (product, date) append further rows; there is no upsert.
    pub async fn insert_profit_margin(&self, row: &NewProfitMargin) -> Result<ProfitMargin> {
        let result = sqlx::query(
            r#"
            INSERT INTO profit_margins
                (product_id, date, selling_price, amazon_fees, shipping_cost,
                 product_cost, storage_fees, advertising_cost, returns_cost,
                 net_profit, margin_percentage, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.product_id)
        .bind(row.date)
        .bind(row.selling_price)
        .bind(row.amazon_fees)
        .bind(row.shipping_cost)
        .bind(row.product_cost)
        .bind(row.storage_fees)
        .bind(row.advertising_cost)
        .bind(row.returns_cost)
        .bind(row.net_profit)
        .bind(row.margin_percentage)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let margin = sqlx::query_as::<_, ProfitMargin>(
            r#"
            SELECT id, product_id, date, selling_price, amazon_fees, shipping_cost,
                   product_cost, storage_fees, advertising_cost, returns_cost,
                   net_profit, margin_percentage, created_at
            FROM profit_margins WHERE id = ?
            "#,
        )
        .bind(result.last_insert_rowid())
        .fetch_one(&self.pool)
        .await?;
        Ok(margin)
    }

    /// The most recent `limit` margin rows by date. `limit` caps row count,
    /// not the calendar span.
    pub async fn profit_margins_recent(
        &self,
        product_id: i64,
        limit: i64,
    ) -> Result<Vec<ProfitMargin>> {
        let margins = sqlx::query_as::<_, ProfitMargin>(
            r#"
            SELECT id, product_id, date, selling_price, amazon_fees, shipping_cost,
                   product_cost, storage_fees, advertising_cost, returns_cost,
                   net_profit, margin_percentage, created_at
            FROM profit_margins
            WHERE product_id = ?
            ORDER BY date DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(margins)
    }

    pub async fn profit_margins_all(&self, product_id: i64) -> Result<Vec<ProfitMargin>> {
        let margins = sqlx::query_as::<_, ProfitMargin>(
            r#"
            SELECT id, product_id, date, selling_price, amazon_fees, shipping_cost,
                   product_cost, storage_fees, advertising_cost, returns_cost,
                   net_profit, margin_percentage, created_at
            FROM profit_margins
            WHERE product_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(margins)
    }

    // -----------------------------------------------------------------------
    // Keyword performances
    // -----------------------------------------------------------------------

    /// Insert a batch of keyword rows in one transaction.
    pub async fn insert_keyword_performances(
        &self,
        rows: &[NewKeywordPerformance],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO keyword_performances
                    (product_id, keyword, search_rank, impressions, clicks,
                     conversions, ctr, acos, date, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.product_id)
            .bind(&row.keyword)
            .bind(row.search_rank)
            .bind(row.impressions)
            .bind(row.clicks)
            .bind(row.conversions)
            .bind(row.ctr)
            .bind(row.acos)
            .bind(row.date)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    /// Rows on or after `since`, newest date first, keyword ascending within
    /// a date.
    pub async fn keyword_performances_since(
        &self,
        product_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<KeywordPerformance>> {
        let rows = sqlx::query_as::<_, KeywordPerformance>(
            r#"
            SELECT id, product_id, keyword, search_rank, impressions, clicks,
                   conversions, ctr, acos, date, created_at
            FROM keyword_performances
            WHERE product_id = ? AND date >= ?
            ORDER BY date DESC, keyword ASC
            "#,
        )
        .bind(product_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rows on or after `since` in insertion order. Consumers that rank or
    /// scan rows rely on this order being stable.
    pub async fn keyword_performances_since_by_id(
        &self,
        product_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<KeywordPerformance>> {
        let rows = sqlx::query_as::<_, KeywordPerformance>(
            r#"
            SELECT id, product_id, keyword, search_rank, impressions, clicks,
                   conversions, ctr, acos, date, created_at
            FROM keyword_performances
            WHERE product_id = ? AND date >= ?
            ORDER BY id ASC
            "#,
        )
        .bind(product_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rows for one exact date, best search rank first.
    pub async fn keyword_performances_on(
        &self,
        product_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<KeywordPerformance>> {
        let rows = sqlx::query_as::<_, KeywordPerformance>(
            r#"
            SELECT id, product_id, keyword, search_rank, impressions, clicks,
                   conversions, ctr, acos, date, created_at
            FROM keyword_performances
            WHERE product_id = ? AND date = ?
            ORDER BY search_rank ASC, id ASC
            "#,
        )
        .bind(product_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory store with the real migrations applied. A single connection
    /// is required: every pooled connection to `sqlite::memory:` would
    /// otherwise get its own empty database.
    pub(crate) async fn memory_store() -> RecordStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
        RecordStore::new(pool)
    }

    fn snapshot(product_id: i64, asin: &str, price: f64, ts: DateTime<Utc>) -> NewCompetitorPrice {
        NewCompetitorPrice {
            product_id,
            competitor_asin: asin.to_string(),
            price,
            shipping_price: 0.0,
            is_prime: false,
            is_fba: false,
            condition: "New".to_string(),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn product_roundtrip() {
        let store = memory_store().await;
        let product = store.insert_product("B000TEST01", "Bamboo Cutting Board").await.unwrap();
        assert_eq!(product.asin, "B000TEST01");

        let found = store.product_by_asin("B000TEST01").await.unwrap();
        assert_eq!(found.unwrap().id, product.id);
        assert!(store.product_by_asin("B000MISSING").await.unwrap().is_none());
        assert_eq!(store.product_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sales_sum_per_exact_date() {
        let store = memory_store().await;
        let product = store.insert_product("B000TEST01", "Board").await.unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let other = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();

        store.insert_sale(product.id, day, 2, 40.0, Some("US")).await.unwrap();
        store.insert_sale(product.id, day, 1, 20.0, Some("US")).await.unwrap();
        store.insert_sale(product.id, other, 5, 100.0, None).await.unwrap();

        let rows = store.sales_on(product.id, day).await.unwrap();
        assert_eq!(rows.len(), 2);
        let revenue: f64 = rows.iter().map(|s| s.revenue).sum();
        assert!((revenue - 60.0).abs() < 1e-9);

        let totals = store.sales_totals(product.id).await.unwrap();
        assert_eq!(totals.total_sales, 3);
        assert!((totals.total_revenue - 160.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sales_between_joins_asin_and_orders_by_date() {
        let store = memory_store().await;
        let product = store.insert_product("B000TEST01", "Board").await.unwrap();
        let d1 = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 7, 3).unwrap();
        store.insert_sale(product.id, d2, 1, 10.0, None).await.unwrap();
        store.insert_sale(product.id, d1, 1, 10.0, None).await.unwrap();

        let rows = store
            .sales_between(d1, NaiveDate::from_ymd_opt(2025, 7, 31).unwrap())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d1);
        assert_eq!(rows[0].product_asin, "B000TEST01");
    }

    #[tokio::test]
    async fn competitor_price_windows_and_ordering() {
        let store = memory_store().await;
        let product = store.insert_product("B000TEST01", "Board").await.unwrap();
        let now = Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap();

        store
            .insert_competitor_prices(&[
                snapshot(product.id, "B000COMP01", 10.0, now - Duration::hours(30)),
                snapshot(product.id, "B000COMP01", 12.0, now - Duration::hours(1)),
                snapshot(product.id, "B000COMP02", 14.0, now - Duration::hours(2)),
            ])
            .await
            .unwrap();

        let recent = store
            .competitor_prices_since(product.id, now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        // oldest first
        assert_eq!(recent[0].competitor_asin, "B000COMP02");

        let before = store
            .competitor_prices_before(product.id, now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(before.len(), 1);
        assert!((before[0].price - 10.0).abs() < 1e-9);

        let all = store.competitor_prices_desc(product.id).await.unwrap();
        assert_eq!(all.len(), 3);
        // newest first
        assert!((all[0].price - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn profit_margin_recent_caps_row_count() {
        let store = memory_store().await;
        let product = store.insert_product("B000TEST01", "Board").await.unwrap();
        for day in 1..=5 {
            let row = NewProfitMargin {
                product_id: product.id,
                date: NaiveDate::from_ymd_opt(2025, 7, day).unwrap(),
                selling_price: 20.0,
                amazon_fees: 3.0,
                shipping_cost: 2.5,
                product_cost: 0.0,
                storage_fees: 0.0,
                advertising_cost: 0.0,
                returns_cost: 0.0,
                net_profit: 14.5,
                margin_percentage: 72.5,
            };
            store.insert_profit_margin(&row).await.unwrap();
        }

        let recent = store.profit_margins_recent(product.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].date, NaiveDate::from_ymd_opt(2025, 7, 5).unwrap());

        let all = store.profit_margins_all(product.id).await.unwrap();
        assert_eq!(all.len(), 5);
    }
}
