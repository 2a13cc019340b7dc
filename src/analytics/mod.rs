//! The aggregation core: everything here reads filtered row sets from the
//! record store and reduces them in memory, or fetches provider data and
//! appends derived records.

mod competitor;
mod keyword;
mod profit;

pub use competitor::CompetitorTracker;
pub use keyword::KeywordTracker;
pub use profit::{CostSchedule, FlatRateCosts, ProfitCalculator};
