//! Per-token pricing and cost estimation.
//!
//! Rates are held as [`Decimal`] per single token so that sums over millions
//! of tokens stay exact; rounding happens only when a cost is displayed.

use crate::error::{Error, Result};
use crate::models::ModelUsage;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

const TOKENS_PER_MILLION: Decimal = dec!(1000000);

/// Currency per token for the four token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input: Decimal,
    pub output: Decimal,
    pub cache_read: Decimal,
    pub cache_write: Decimal,
}

impl ModelPricing {
    pub fn per_million(
        input: Decimal,
        output: Decimal,
        cache_read: Decimal,
        cache_write: Decimal,
    ) -> Self {
        Self {
            input: input / TOKENS_PER_MILLION,
            output: output / TOKENS_PER_MILLION,
            cache_read: cache_read / TOKENS_PER_MILLION,
            cache_write: cache_write / TOKENS_PER_MILLION,
        }
    }

    fn is_non_negative(&self) -> bool {
        [self.input, self.output, self.cache_read, self.cache_write]
            .iter()
            .all(|r| !r.is_sign_negative())
    }
}

/// Ordered model table plus a fallback for unmatched ids. Order matters:
/// partial matching takes the first entry that matches.
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: Vec<(String, ModelPricing)>,
    fallback: ModelPricing,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateFile {
    #[serde(default)]
    models: Vec<RateEntry>,
    fallback: Option<Rates>,
}

#[derive(Deserialize)]
struct RateEntry {
    model: String,
    #[serde(flatten)]
    rates: Rates,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Rates {
    input: Decimal,
    output: Decimal,
    #[serde(default)]
    cache_read: Decimal,
    #[serde(default)]
    cache_write: Decimal,
}

impl From<Rates> for ModelPricing {
    fn from(r: Rates) -> Self {
        ModelPricing::per_million(r.input, r.output, r.cache_read, r.cache_write)
    }
}

impl PricingTable {
    pub fn new(entries: Vec<(String, ModelPricing)>, fallback: ModelPricing) -> Result<Self> {
        if let Some((model, _)) = entries.iter().find(|(_, p)| !p.is_non_negative()) {
            return Err(Error::Config(format!("Negative rate for model {}", model)));
        }
        if !fallback.is_non_negative() {
            return Err(Error::Config("Negative fallback rate".to_string()));
        }
        Ok(Self { entries, fallback })
    }

    /// Parses a table with rates given per million tokens:
    /// `{"models": [{"model": "...", "input": 3, "output": 15, "cacheRead": 0.3, "cacheWrite": 3.75}], "fallback": {...}}`.
    /// Without a `fallback` entry the default mid-tier fallback is kept.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RateFile = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid pricing table: {}", e)))?;

        let entries = file
            .models
            .into_iter()
            .map(|e| (e.model, ModelPricing::from(e.rates)))
            .collect();
        let fallback = file
            .fallback
            .map(ModelPricing::from)
            .unwrap_or_else(sonnet_rates);

        Self::new(entries, fallback)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn entries(&self) -> &[(String, ModelPricing)] {
        &self.entries
    }

    pub fn fallback(&self) -> &ModelPricing {
        &self.fallback
    }

    /// Exact id, then the first case-insensitive substring match in either
    /// direction, then the fallback.
    pub fn pricing_for(&self, model_id: &str) -> &ModelPricing {
        if let Some((_, pricing)) = self.entries.iter().find(|(key, _)| key == model_id) {
            return pricing;
        }

        let lower = model_id.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| {
                let key = key.to_lowercase();
                lower.contains(&key) || key.contains(&lower)
            })
            .map(|(_, pricing)| pricing)
            .unwrap_or(&self.fallback)
    }

    /// Exact cost of `usage`. Saturates at [`Decimal::MAX`] instead of
    /// overflowing.
    pub fn estimate_cost(&self, model_id: &str, usage: &ModelUsage) -> Decimal {
        let p = self.pricing_for(model_id);
        let parts = [
            (usage.input_tokens, p.input),
            (usage.output_tokens, p.output),
            (usage.cache_read_input_tokens, p.cache_read),
            (usage.cache_creation_input_tokens, p.cache_write),
        ];

        parts
            .iter()
            .try_fold(Decimal::ZERO, |acc, (tokens, rate)| {
                Decimal::from(*tokens)
                    .checked_mul(*rate)
                    .and_then(|cost| acc.checked_add(cost))
            })
            .unwrap_or_else(|| saturated(model_id))
    }

    /// Output tokens only, for daily data that has no cache breakdown.
    pub fn output_cost(&self, model_id: &str, output_tokens: u64) -> Decimal {
        Decimal::from(output_tokens)
            .checked_mul(self.pricing_for(model_id).output)
            .unwrap_or_else(|| saturated(model_id))
    }
}

fn saturated(model_id: &str) -> Decimal {
    tracing::debug!("Cost for {} overflowed, saturating", model_id);
    Decimal::MAX
}

fn opus_rates() -> ModelPricing {
    ModelPricing::per_million(dec!(15), dec!(75), dec!(1.5), dec!(18.75))
}

fn sonnet_rates() -> ModelPricing {
    ModelPricing::per_million(dec!(3), dec!(15), dec!(0.3), dec!(3.75))
}

fn haiku_rates() -> ModelPricing {
    ModelPricing::per_million(dec!(0.8), dec!(4), dec!(0.08), dec!(1))
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            entries: vec![
                ("claude-opus-4-6".to_string(), opus_rates()),
                ("claude-opus-4-5-20251101".to_string(), opus_rates()),
                ("claude-sonnet-4-5-20250929".to_string(), sonnet_rates()),
                ("claude-haiku-4-5-20251001".to_string(), haiku_rates()),
            ],
            fallback: sonnet_rates(),
        }
    }
}

/// Display name such as "Opus 4.6"; falls back to the family, then the raw id.
pub fn short_model_name(model_id: &str) -> String {
    let id = model_id.to_lowercase();
    let name = if id.contains("opus-4-6") {
        "Opus 4.6"
    } else if id.contains("opus-4-5") {
        "Opus 4.5"
    } else if id.contains("sonnet-4-5") {
        "Sonnet 4.5"
    } else if id.contains("haiku-4-5") {
        "Haiku 4.5"
    } else if id.contains("opus") {
        "Opus"
    } else if id.contains("sonnet") {
        "Sonnet"
    } else if id.contains("haiku") {
        "Haiku"
    } else {
        return model_id.to_string();
    };
    name.to_string()
}
