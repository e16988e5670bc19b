use crate::config::Config;
use crate::error::Result;
use crate::models::{UsageStats, STATS_FIELDS};
use crate::reader;

pub struct StatsDataSource {
    config: Config,
}

impl StatsDataSource {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn load(&self) -> Result<UsageStats> {
        reader::read_json(&self.config.stats_file, STATS_FIELDS).await
    }
}
