use crate::error::{AppError, Result};

pub const SP_API_URL: &str = "https://sellingpartnerapi-na.amazon.com";

/// Default marketplace (US) when AMAZON_MARKETPLACE_ID is not set.
pub const DEFAULT_MARKETPLACE_ID: &str = "ATVPDKIKX0DER";

/// Lookback for the market-position aggregate (hours).
pub const MARKET_POSITION_WINDOW_HOURS: i64 = 24;

/// A price alert compares the latest snapshot per competitor against the most
/// recent snapshot strictly older than this baseline (hours).
pub const ALERT_BASELINE_HOURS: i64 = 24;

/// Relative price change at or above which an alert fires (0.10 = 10%).
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.10;

/// Default row cap for profit trends and default calendar window (days) for
/// keyword trends and competitor price history.
pub const DEFAULT_TREND_DAYS: i64 = 30;

/// Top-keywords ranking looks at the last 7 days of rows.
pub const TOP_KEYWORDS_WINDOW_DAYS: i64 = 7;

/// Default result cap for the top-keywords ranking.
pub const DEFAULT_TOP_KEYWORDS_LIMIT: usize = 10;

/// Opportunity detection and keyword health read the last 30 days of rows.
pub const KEYWORD_WINDOW_DAYS: i64 = 30;

/// Placeholder fee schedule. Real fee tables plug in through the
/// `CostSchedule` trait without touching the aggregation logic.
pub mod fees {
    /// Referral fee as a fraction of the list price.
    pub const REFERRAL_FEE_RATE: f64 = 0.15;
    /// Flat FBA fulfillment fee per unit sold.
    pub const FULFILLMENT_FEE_PER_UNIT: f64 = 3.31;
    /// Flat outbound shipping cost per unit sold.
    pub const SHIPPING_COST_PER_UNIT: f64 = 2.50;
}

/// Rule thresholds for keyword opportunity detection.
pub mod opportunity {
    /// impressions > MIN_IMPRESSIONS and ctr < LOW_CTR → low_ctr flag.
    pub const MIN_IMPRESSIONS: i64 = 1000;
    pub const LOW_CTR: f64 = 0.01;
    /// clicks > MIN_CLICKS and conversions < LOW_CONVERSIONS → low_conversion flag.
    pub const MIN_CLICKS: i64 = 100;
    pub const LOW_CONVERSIONS: i64 = 5;
    /// acos > HIGH_ACOS → high_acos flag.
    pub const HIGH_ACOS: f64 = 0.3;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub sp_api_url: String,
    pub marketplace_id: String,
    /// LWA access token sent as a bearer header when present.
    pub access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "salessuite.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            sp_api_url: std::env::var("SP_API_URL").unwrap_or_else(|_| SP_API_URL.to_string()),
            marketplace_id: std::env::var("AMAZON_MARKETPLACE_ID")
                .unwrap_or_else(|_| DEFAULT_MARKETPLACE_ID.to_string()),
            access_token: std::env::var("AMAZON_ACCESS_TOKEN").ok().filter(|s| !s.is_empty()),
        })
    }
}
