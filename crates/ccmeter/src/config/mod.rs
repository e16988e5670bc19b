use crate::error::{Error, Result};
use crate::pricing::PricingTable;
use crate::summary::TodayCostStrategy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages/count_tokens";

/// Locations of the two local usage sources.
#[derive(Debug, Clone)]
pub struct Config {
    pub stats_file: PathBuf,
    pub global_config_file: PathBuf,
}

impl Config {
    pub fn new(stats_file: PathBuf, global_config_file: PathBuf) -> Self {
        Self {
            stats_file,
            global_config_file,
        }
    }

    /// Sources under `data_dir`, with the global config beside the user's home.
    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidPath("Data directory is empty".to_string()));
        }

        Ok(Self {
            stats_file: data_dir.join("stats-cache.json"),
            global_config_file: Self::default_global_config_file(),
        })
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|p| p.join(".claude"))
            .unwrap_or_else(|| PathBuf::from(".claude"))
    }

    pub fn default_global_config_file() -> PathBuf {
        dirs::home_dir()
            .map(|p| p.join(".claude.json"))
            .unwrap_or_else(|| PathBuf::from(".claude.json"))
    }

    pub fn with_global_config_file(mut self, path: PathBuf) -> Self {
        self.global_config_file = path;
        self
    }

    pub fn watched_files(&self) -> [&Path; 2] {
        [self.stats_file.as_path(), self.global_config_file.as_path()]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_file: Self::default_data_dir().join("stats-cache.json"),
            global_config_file: Self::default_global_config_file(),
        }
    }
}

/// Everything the engine needs, injected at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub config: Config,
    pub debounce: Duration,
    pub fallback_interval: Duration,
    pub poll_interval: Duration,
    pub credential: Option<String>,
    pub endpoint: String,
    pub pricing: Arc<PricingTable>,
    pub today_cost: TodayCostStrategy,
}

impl EngineSettings {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            debounce: DEFAULT_DEBOUNCE,
            fallback_interval: DEFAULT_FALLBACK_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            credential: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            pricing: Arc::new(PricingTable::default()),
            today_cost: TodayCostStrategy::default(),
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fallback_interval(mut self, interval: Duration) -> Self {
        self.fallback_interval = interval;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    pub fn with_today_cost(mut self, strategy: TodayCostStrategy) -> Self {
        self.today_cost = strategy;
        self
    }

    /// Poll interval floored at [`MIN_POLL_INTERVAL`] to bound request rate.
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}
