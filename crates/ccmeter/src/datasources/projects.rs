use crate::config::Config;
use crate::error::Result;
use crate::models::{ProjectConfig, PROJECT_FIELDS};
use crate::reader::{self, canonicalize_keys, malformed};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub struct ProjectDataSource {
    config: Config,
}

impl ProjectDataSource {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Projects from the global config that carry a last-session cost.
    pub async fn load(&self) -> Result<BTreeMap<String, ProjectConfig>> {
        let path = &self.config.global_config_file;
        let root = reader::read_json_value(path).await?;
        parse_projects(path, root)
    }
}

/// Pulls the `projects` map out of the global config document. The rest of
/// the document is ignored.
pub fn parse_projects(path: &Path, root: Value) -> Result<BTreeMap<String, ProjectConfig>> {
    let Value::Object(root) = root else {
        return Err(malformed(path, "top-level value is not an object"));
    };

    let projects = root
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("projects"))
        .map(|(_, v)| v);

    let Some(Value::Object(projects)) = projects else {
        return Ok(BTreeMap::new());
    };

    let mut result = BTreeMap::new();
    for (project_path, mut entry) in projects {
        canonicalize_keys(&mut entry, PROJECT_FIELDS);

        let has_cost = entry
            .as_object()
            .map(|obj| obj.contains_key("lastCost"))
            .unwrap_or(false);
        if !has_cost {
            continue;
        }

        match serde_json::from_value::<ProjectConfig>(entry) {
            Ok(config) => {
                result.insert(project_path, config);
            }
            Err(e) => {
                tracing::debug!("Skipping project {}: {}", project_path, e);
            }
        }
    }

    Ok(result)
}
