use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field names of the usage cache, matched case-insensitively on load.
pub const STATS_FIELDS: &[&str] = &[
    "version",
    "lastComputedDate",
    "dailyActivity",
    "date",
    "messageCount",
    "sessionCount",
    "toolCallCount",
    "dailyModelTokens",
    "tokensByModel",
    "modelUsage",
    "inputTokens",
    "outputTokens",
    "cacheReadInputTokens",
    "cacheCreationInputTokens",
    "webSearchRequests",
    "costUSD",
    "contextWindow",
    "maxOutputTokens",
    "totalSessions",
    "totalMessages",
    "longestSession",
    "sessionId",
    "duration",
    "timestamp",
    "firstSessionDate",
    "hourCounts",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    pub version: u32,
    pub last_computed_date: String,
    pub daily_activity: Vec<DailyActivity>,
    pub daily_model_tokens: Vec<DailyModelTokens>,
    pub model_usage: BTreeMap<String, ModelUsage>,
    pub total_sessions: u64,
    pub total_messages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longest_session: Option<LongestSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_session_date: Option<String>,
    pub hour_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyActivity {
    pub date: String,
    pub message_count: u64,
    pub session_count: u64,
    pub tool_call_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyModelTokens {
    pub date: String,
    pub tokens_by_model: BTreeMap<String, u64>,
}

/// Cumulative token usage for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub web_search_requests: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: Decimal,
    pub context_window: u64,
    pub max_output_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LongestSession {
    pub session_id: String,
    pub duration: u64,
    pub message_count: u64,
    pub timestamp: String,
}

impl UsageStats {
    pub fn activity_by_date(&self, date: &str) -> Option<&DailyActivity> {
        self.daily_activity.iter().find(|a| a.date == date)
    }

    pub fn model_tokens_by_date(&self, date: &str) -> Option<&DailyModelTokens> {
        self.daily_model_tokens.iter().find(|t| t.date == date)
    }
}
