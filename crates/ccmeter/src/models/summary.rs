use super::usage::UsageInfo;
use chrono::{DateTime, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// How the "today" cost figure was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TodayCostMethod {
    /// Per-day output tokens priced at each model's output rate.
    OutputTokens,
    /// All-time cost scaled by the day's share of all messages.
    MessageShare,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TodaySummary {
    pub message_count: u64,
    pub session_count: u64,
    pub tool_call_count: u64,
    pub estimated_cost_usd: Decimal,
    pub cost_method: TodayCostMethod,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllTimeSummary {
    pub messages: u64,
    pub sessions: u64,
    pub estimated_cost_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model_id: String,
    pub short_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub estimated_cost_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub full_path: String,
    pub short_name: String,
    pub last_cost: Decimal,
}

/// Everything a status surface shows, rebuilt from scratch on each refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenSummary {
    pub display_date: NaiveDate,
    pub today: TodaySummary,
    pub all_time: AllTimeSummary,
    pub models: Vec<ModelSummary>,
    pub projects: Vec<ProjectSummary>,
}

impl TokenSummary {
    pub fn empty(today: NaiveDate) -> Self {
        Self {
            display_date: today,
            today: TodaySummary::default(),
            all_time: AllTimeSummary::default(),
            models: Vec::new(),
            projects: Vec::new(),
        }
    }

    /// Header label such as "Oct 19".
    pub fn display_label(&self) -> String {
        self.display_date.format("%b %-d").to_string()
    }
}

/// The value published to presentation subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub summary: TokenSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
    pub refreshed_at: DateTime<Local>,
}

impl StatusView {
    pub fn new(summary: TokenSummary, usage: Option<UsageInfo>) -> Self {
        Self {
            summary,
            usage,
            refreshed_at: Local::now(),
        }
    }

    pub fn remaining_percent(&self) -> Option<u8> {
        self.usage.as_ref().map(UsageInfo::display_percent)
    }
}
