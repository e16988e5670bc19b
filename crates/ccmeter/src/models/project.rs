use super::stats::ModelUsage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROJECT_FIELDS: &[&str] = &[
    "lastCost",
    "lastTotalInputTokens",
    "lastTotalOutputTokens",
    "lastTotalCacheCreationInputTokens",
    "lastTotalCacheReadInputTokens",
    "lastModelUsage",
    "lastSessionId",
    "inputTokens",
    "outputTokens",
    "cacheReadInputTokens",
    "cacheCreationInputTokens",
    "webSearchRequests",
    "costUSD",
];

/// Last-session figures the assistant records per project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub last_cost: Option<Decimal>,
    pub last_total_input_tokens: Option<u64>,
    pub last_total_output_tokens: Option<u64>,
    pub last_total_cache_creation_input_tokens: Option<u64>,
    pub last_total_cache_read_input_tokens: Option<u64>,
    pub last_model_usage: Option<BTreeMap<String, ModelUsage>>,
    pub last_session_id: Option<String>,
}
