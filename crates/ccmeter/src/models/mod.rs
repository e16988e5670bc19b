pub mod project;
pub mod stats;
pub mod summary;
pub mod usage;

pub use project::{ProjectConfig, PROJECT_FIELDS};
pub use stats::{
    DailyActivity, DailyModelTokens, LongestSession, ModelUsage, UsageStats, STATS_FIELDS,
};
pub use summary::{
    AllTimeSummary, ModelSummary, ProjectSummary, StatusView, TodayCostMethod, TodaySummary,
    TokenSummary,
};
pub use usage::UsageInfo;
