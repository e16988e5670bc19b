//! Combines the local sources and the pricing table into a [`TokenSummary`].

pub mod format;

pub use format::{format_cost, format_grouped, format_token_count};

use crate::models::{
    DailyActivity, ModelSummary, ProjectConfig, ProjectSummary, TodayCostMethod, TokenSummary,
    UsageStats,
};
use crate::pricing::{short_model_name, PricingTable};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which estimate to use for the displayed day's cost.
///
/// Daily data only carries output tokens per model, while real spend is
/// dominated by cache tokens that are tracked only cumulatively. Neither
/// figure is exact; the choice is explicit and reported back through
/// [`TodayCostMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TodayCostStrategy {
    /// Price the day's per-model output tokens at the output rate. Days
    /// without a per-model breakdown use the message share instead.
    #[default]
    OutputTokens,
    /// Always scale the all-time cost by the day's share of messages.
    MessageShare,
}

pub struct SummaryBuilder {
    pricing: Arc<PricingTable>,
    strategy: TodayCostStrategy,
}

impl SummaryBuilder {
    pub fn new(pricing: Arc<PricingTable>, strategy: TodayCostStrategy) -> Self {
        Self { pricing, strategy }
    }

    pub fn build(
        &self,
        stats: Option<&UsageStats>,
        projects: &BTreeMap<String, ProjectConfig>,
        today: NaiveDate,
    ) -> TokenSummary {
        let mut summary = TokenSummary::empty(today);

        if let Some(stats) = stats {
            self.fill_usage(&mut summary, stats, today);
        }

        summary.projects = project_summaries(projects);
        summary
    }

    fn fill_usage(&self, summary: &mut TokenSummary, stats: &UsageStats, today: NaiveDate) {
        let today_key = today.format(DATE_FORMAT).to_string();
        // Records with an unparseable date are never displayed, so the date
        // and the counters always come from the same record.
        let display = stats
            .activity_by_date(&today_key)
            .map(|activity| (today, activity))
            .or_else(|| {
                stats
                    .daily_activity
                    .iter()
                    .filter_map(|a| {
                        NaiveDate::parse_from_str(&a.date, DATE_FORMAT)
                            .ok()
                            .map(|d| (d, a))
                    })
                    .max_by_key(|(d, _)| *d)
            });

        if let Some((date, activity)) = display {
            summary.display_date = date;
            summary.today.message_count = activity.message_count;
            summary.today.session_count = activity.session_count;
            summary.today.tool_call_count = activity.tool_call_count;
        }

        summary.all_time.messages = stats.total_messages;
        summary.all_time.sessions = stats.total_sessions;

        let mut total_cost = Decimal::ZERO;
        for (model_id, usage) in &stats.model_usage {
            let cost = self.pricing.estimate_cost(model_id, usage);
            total_cost = total_cost.saturating_add(cost);

            summary.models.push(ModelSummary {
                model_id: model_id.clone(),
                short_name: short_model_name(model_id),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cache_read_tokens: usage.cache_read_input_tokens,
                cache_creation_tokens: usage.cache_creation_input_tokens,
                estimated_cost_usd: cost,
            });
        }

        summary
            .models
            .sort_by(|a, b| b.estimated_cost_usd.cmp(&a.estimated_cost_usd));
        summary.all_time.estimated_cost_usd = total_cost;

        if let Some((_, activity)) = display {
            let (cost, method) = self.today_cost(stats, activity, total_cost);
            summary.today.estimated_cost_usd = cost;
            summary.today.cost_method = method;
        }
    }

    fn today_cost(
        &self,
        stats: &UsageStats,
        activity: &DailyActivity,
        total_cost: Decimal,
    ) -> (Decimal, TodayCostMethod) {
        if self.strategy == TodayCostStrategy::OutputTokens {
            let breakdown = stats
                .model_tokens_by_date(&activity.date)
                .filter(|day| !day.tokens_by_model.is_empty());

            if let Some(day) = breakdown {
                let cost = day
                    .tokens_by_model
                    .iter()
                    .map(|(model_id, tokens)| self.pricing.output_cost(model_id, *tokens))
                    .fold(Decimal::ZERO, Decimal::saturating_add);
                return (cost, TodayCostMethod::OutputTokens);
            }
        }

        message_share(activity.message_count, stats.total_messages, total_cost)
    }
}

fn message_share(day_messages: u64, total_messages: u64, total_cost: Decimal) -> (Decimal, TodayCostMethod) {
    if total_messages == 0 || total_cost.is_zero() {
        return (Decimal::ZERO, TodayCostMethod::None);
    }
    match total_cost
        .checked_mul(Decimal::from(day_messages))
        .and_then(|scaled| scaled.checked_div(Decimal::from(total_messages)))
    {
        Some(cost) => (cost, TodayCostMethod::MessageShare),
        None => {
            tracing::debug!("Message-share cost overflowed, reporting none");
            (Decimal::ZERO, TodayCostMethod::None)
        }
    }
}

fn project_summaries(projects: &BTreeMap<String, ProjectConfig>) -> Vec<ProjectSummary> {
    let mut summaries: Vec<ProjectSummary> = projects
        .iter()
        .filter_map(|(path, config)| {
            config.last_cost.map(|cost| ProjectSummary {
                full_path: path.clone(),
                short_name: project_short_name(path),
                last_cost: cost,
            })
        })
        .collect();

    summaries.sort_by(|a, b| b.last_cost.cmp(&a.last_cost));
    summaries
}

fn project_short_name(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyModelTokens, ModelUsage};
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn builder(strategy: TodayCostStrategy) -> SummaryBuilder {
        SummaryBuilder::new(Arc::new(PricingTable::default()), strategy)
    }

    fn activity(date: &str, messages: u64) -> DailyActivity {
        DailyActivity {
            date: date.to_string(),
            message_count: messages,
            session_count: 2,
            tool_call_count: 7,
        }
    }

    fn sample_stats() -> UsageStats {
        let mut stats = UsageStats {
            total_messages: 100,
            total_sessions: 9,
            daily_activity: vec![activity("2025-10-17", 30), activity("2025-10-18", 20)],
            ..Default::default()
        };
        stats.model_usage.insert(
            "claude-sonnet-4-5-20250929".to_string(),
            ModelUsage {
                input_tokens: 1_000_000,
                output_tokens: 500_000,
                ..Default::default()
            },
        );
        stats.model_usage.insert(
            "claude-opus-4-6".to_string(),
            ModelUsage {
                output_tokens: 1_000_000,
                ..Default::default()
            },
        );
        stats
    }

    #[test]
    fn test_empty_sources() {
        let today = date("2025-10-19");
        let summary = builder(TodayCostStrategy::default()).build(None, &BTreeMap::new(), today);

        assert_eq!(summary, TokenSummary::empty(today));
        assert_eq!(summary.display_date, today);
        assert_eq!(summary.today.message_count, 0);
        assert_eq!(summary.all_time.estimated_cost_usd, Decimal::ZERO);
        assert!(summary.models.is_empty());
        assert!(summary.projects.is_empty());
    }

    #[test]
    fn test_models_sorted_by_cost_and_summed() {
        let stats = sample_stats();
        let summary = builder(TodayCostStrategy::default()).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-18"),
        );

        assert_eq!(summary.models.len(), 2);
        assert_eq!(summary.models[0].short_name, "Opus 4.6");
        assert_eq!(summary.models[0].estimated_cost_usd, dec!(75));
        assert_eq!(summary.models[1].short_name, "Sonnet 4.5");
        assert_eq!(summary.models[1].estimated_cost_usd, dec!(10.50));
        assert_eq!(summary.all_time.estimated_cost_usd, dec!(85.50));
        assert_eq!(summary.all_time.messages, 100);
        assert_eq!(summary.all_time.sessions, 9);
    }

    #[test]
    fn test_equal_costs_keep_model_order() {
        let mut stats = UsageStats::default();
        for id in ["model-b", "model-a", "model-c"] {
            stats.model_usage.insert(
                id.to_string(),
                ModelUsage {
                    input_tokens: 10,
                    ..Default::default()
                },
            );
        }
        let summary =
            builder(TodayCostStrategy::default()).build(Some(&stats), &BTreeMap::new(), date("2025-01-01"));
        let ids: Vec<_> = summary.models.iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(ids, ["model-a", "model-b", "model-c"]);
    }

    #[test]
    fn test_display_date_prefers_today() {
        let mut stats = sample_stats();
        stats.daily_activity.push(activity("2025-10-19", 5));
        let summary = builder(TodayCostStrategy::MessageShare).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-19"),
        );
        assert_eq!(summary.display_date, date("2025-10-19"));
        assert_eq!(summary.today.message_count, 5);
    }

    #[test]
    fn test_display_date_falls_back_to_latest_day() {
        let stats = sample_stats();
        let summary = builder(TodayCostStrategy::MessageShare).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-25"),
        );
        assert_eq!(summary.display_date, date("2025-10-18"));
        assert_eq!(summary.display_label(), "Oct 18");
        assert_eq!(summary.today.message_count, 20);
        assert_eq!(summary.today.session_count, 2);
        assert_eq!(summary.today.tool_call_count, 7);
    }

    #[test]
    fn test_no_daily_activity_keeps_today_at_zero() {
        let mut stats = sample_stats();
        stats.daily_activity.clear();
        let today = date("2025-10-19");
        let summary = builder(TodayCostStrategy::default()).build(Some(&stats), &BTreeMap::new(), today);
        assert_eq!(summary.display_date, today);
        assert_eq!(summary.today.estimated_cost_usd, Decimal::ZERO);
        assert_eq!(summary.today.cost_method, TodayCostMethod::None);
        assert_eq!(summary.all_time.estimated_cost_usd, dec!(85.50));
    }

    // Today-cost strategy: message share.
    #[test]
    fn test_today_cost_strategy_message_share() {
        let mut stats = sample_stats();
        stats.daily_model_tokens.push(DailyModelTokens {
            date: "2025-10-18".to_string(),
            tokens_by_model: BTreeMap::from([("claude-opus-4-6".to_string(), 1_000)]),
        });
        let summary = builder(TodayCostStrategy::MessageShare).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-18"),
        );
        // 85.50 * 20 / 100, breakdown ignored
        assert_eq!(summary.today.estimated_cost_usd, dec!(17.10));
        assert_eq!(summary.today.cost_method, TodayCostMethod::MessageShare);
    }

    // Today-cost strategy: output tokens, priced at output rate only.
    #[test]
    fn test_today_cost_strategy_output_tokens() {
        let mut stats = sample_stats();
        stats.daily_model_tokens.push(DailyModelTokens {
            date: "2025-10-18".to_string(),
            tokens_by_model: BTreeMap::from([
                ("claude-opus-4-6".to_string(), 10_000),
                ("claude-sonnet-4-5-20250929".to_string(), 100_000),
            ]),
        });
        let summary = builder(TodayCostStrategy::OutputTokens).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-18"),
        );
        // 10k * $75/M + 100k * $15/M
        assert_eq!(summary.today.estimated_cost_usd, dec!(2.25));
        assert_eq!(summary.today.cost_method, TodayCostMethod::OutputTokens);
    }

    #[test]
    fn test_today_cost_strategy_output_tokens_without_breakdown() {
        let stats = sample_stats();
        let summary = builder(TodayCostStrategy::OutputTokens).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-18"),
        );
        assert_eq!(summary.today.estimated_cost_usd, dec!(17.10));
        assert_eq!(summary.today.cost_method, TodayCostMethod::MessageShare);
    }

    #[test]
    fn test_message_share_with_zero_totals() {
        assert_eq!(message_share(5, 0, dec!(10)), (Decimal::ZERO, TodayCostMethod::None));
        assert_eq!(message_share(5, 10, Decimal::ZERO), (Decimal::ZERO, TodayCostMethod::None));
    }

    #[test]
    fn test_projects_sorted_by_cost() {
        let mut projects = BTreeMap::new();
        projects.insert(
            "/home/dev/small".to_string(),
            ProjectConfig {
                last_cost: Some(dec!(5.00)),
                ..Default::default()
            },
        );
        projects.insert(
            "/home/dev/big/".to_string(),
            ProjectConfig {
                last_cost: Some(dec!(12.00)),
                ..Default::default()
            },
        );
        projects.insert("/home/dev/none".to_string(), ProjectConfig::default());

        let summary = builder(TodayCostStrategy::default()).build(None, &projects, date("2025-10-19"));
        let costs: Vec<_> = summary.projects.iter().map(|p| p.last_cost).collect();
        assert_eq!(costs, [dec!(12.00), dec!(5.00)]);
        assert_eq!(summary.projects[0].short_name, "big");
        assert_eq!(summary.projects[0].full_path, "/home/dev/big/");
    }

    #[test]
    fn test_project_short_name() {
        assert_eq!(project_short_name("/Users/me/code/app"), "app");
        assert_eq!(project_short_name("C:\\work\\tool\\"), "tool");
        assert_eq!(project_short_name("/"), "/");
    }

    #[test]
    fn test_message_share_overflow_reports_none() {
        let mut stats = UsageStats {
            total_messages: u64::MAX,
            daily_activity: vec![DailyActivity {
                date: "2025-10-19".to_string(),
                message_count: u64::MAX,
                ..Default::default()
            }],
            ..Default::default()
        };
        stats.model_usage.insert(
            "claude-opus-4-6".to_string(),
            ModelUsage {
                output_tokens: u64::MAX,
                ..Default::default()
            },
        );

        let summary = builder(TodayCostStrategy::MessageShare).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-19"),
        );
        assert!(summary.all_time.estimated_cost_usd > Decimal::ZERO);
        assert_eq!(summary.today.estimated_cost_usd, Decimal::ZERO);
        assert_eq!(summary.today.cost_method, TodayCostMethod::None);
        assert_eq!(summary.today.message_count, u64::MAX);
    }

    #[test]
    fn test_unparseable_dates_are_never_displayed() {
        let mut stats = sample_stats();
        stats.daily_activity = vec![activity("2025-10-17", 30), activity("last tuesday", 99)];

        let summary = builder(TodayCostStrategy::MessageShare).build(
            Some(&stats),
            &BTreeMap::new(),
            date("2025-10-19"),
        );
        assert_eq!(summary.display_date, date("2025-10-17"));
        assert_eq!(summary.today.message_count, 30);
    }
}
