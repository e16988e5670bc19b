//! Remote quota probe.
//!
//! Quota is read from the rate-limit headers of a token-counting request,
//! which costs nothing and generates no output.

use crate::error::{Error, Result};
use crate::models::UsageInfo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const PROBE_MODEL: &str = "claude-haiku-4-5-20251001";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TOKENS_LIMIT: &str = "anthropic-ratelimit-tokens-limit";
const TOKENS_REMAINING: &str = "anthropic-ratelimit-tokens-remaining";
const TOKENS_RESET: &str = "anthropic-ratelimit-tokens-reset";
const REQUESTS_LIMIT: &str = "anthropic-ratelimit-requests-limit";
const REQUESTS_REMAINING: &str = "anthropic-ratelimit-requests-remaining";
const REQUESTS_RESET: &str = "anthropic-ratelimit-requests-reset";

#[async_trait]
pub trait QuotaProbe: Send + Sync {
    async fn poll(&self, credential: &str) -> Result<UsageInfo>;
}

pub struct AnthropicProbe {
    client: reqwest::Client,
    endpoint: String,
}

impl AnthropicProbe {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl QuotaProbe for AnthropicProbe {
    async fn poll(&self, credential: &str) -> Result<UsageInfo> {
        let body = serde_json::json!({
            "model": PROBE_MODEL,
            "messages": [{"role": "user", "content": "."}],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        // A throttled response still carries the quota headers.
        if !status.is_success() && status != StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RemoteUnavailable(format!("HTTP {}", status)));
        }

        parse_rate_limit_headers(response.headers()).ok_or_else(|| {
            Error::RemoteUnavailable("response carried no token rate-limit headers".to_string())
        })
    }
}

/// Polls once, mapping every failure to `None`.
pub async fn poll_usage(probe: &dyn QuotaProbe, credential: &str) -> Option<UsageInfo> {
    match probe.poll(credential).await {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::warn!("Remote usage poll failed: {}", e);
            None
        }
    }
}

/// Extracts quota fields. Absent or unparsable fields keep their defaults;
/// the result is `None` only when neither token limit nor token remaining
/// is present.
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<UsageInfo> {
    let tokens_limit = header_u64(headers, TOKENS_LIMIT);
    let tokens_remaining = header_u64(headers, TOKENS_REMAINING);

    if tokens_limit.is_none() && tokens_remaining.is_none() {
        return None;
    }

    Some(UsageInfo {
        tokens_limit: tokens_limit.unwrap_or_default(),
        tokens_remaining: tokens_remaining.unwrap_or_default(),
        tokens_reset: header_time(headers, TOKENS_RESET),
        requests_limit: header_u64(headers, REQUESTS_LIMIT).unwrap_or_default(),
        requests_remaining: header_u64(headers, REQUESTS_REMAINING).unwrap_or_default(),
        requests_reset: header_time(headers, REQUESTS_RESET),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name)?.parse().ok()
}

fn header_time(headers: &HeaderMap, name: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(header_str(headers, name)?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
