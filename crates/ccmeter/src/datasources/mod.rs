pub mod projects;
pub mod stats;

pub use projects::ProjectDataSource;
pub use stats::StatsDataSource;

use crate::config::Config;
use crate::models::{ProjectConfig, UsageStats};
use std::collections::BTreeMap;

/// Fail-soft access to both local sources. Missing or corrupt files read as
/// "no data"; the reason is only logged.
pub struct SnapshotLoader {
    stats: StatsDataSource,
    projects: ProjectDataSource,
}

impl SnapshotLoader {
    pub fn new(config: Config) -> Self {
        Self {
            stats: StatsDataSource::new(config.clone()),
            projects: ProjectDataSource::new(config),
        }
    }

    pub async fn load_stats(&self) -> Option<UsageStats> {
        match self.stats.load().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::debug!("No usage stats this cycle: {}", e);
                None
            }
        }
    }

    pub async fn load_project_configs(&self) -> BTreeMap<String, ProjectConfig> {
        match self.projects.load().await {
            Ok(projects) => projects,
            Err(e) => {
                tracing::debug!("No project configs this cycle: {}", e);
                BTreeMap::new()
            }
        }
    }
}
