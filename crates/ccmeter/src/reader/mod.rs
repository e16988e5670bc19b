//! Shared-read, time-bounded access to files owned by another process.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Upper bound on a single source read.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn read_shared(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::SourceUnavailable(path.display().to_string()));
    }

    let file = open_shared(path)
        .map_err(|e| Error::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
    let mut file = tokio::fs::File::from_std(file);
    let mut content = String::new();

    match tokio::time::timeout(READ_TIMEOUT, file.read_to_string(&mut content)).await {
        Ok(Ok(_)) => Ok(content),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => Err(Error::SourceMalformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
        Ok(Err(e)) => Err(Error::SourceUnavailable(format!(
            "{}: {}",
            path.display(),
            e
        ))),
        Err(_) => Err(Error::SourceUnavailable(format!(
            "{}: read timed out after {:?}",
            path.display(),
            READ_TIMEOUT
        ))),
    }
}

pub async fn read_json_value(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content = read_shared(path).await?;
    serde_json::from_str(&content).map_err(|e| malformed(path, e))
}

/// Reads `path` as JSON, matching `fields` case-insensitively.
pub async fn read_json<T>(path: impl AsRef<Path>, fields: &[&str]) -> Result<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let mut value = read_json_value(path).await?;
    canonicalize_keys(&mut value, fields);
    serde_json::from_value(value).map_err(|e| malformed(path, e))
}

pub(crate) fn malformed(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::SourceMalformed {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Rewrites every object key equal to one of `fields` ignoring ASCII case to
/// its canonical spelling. Keys that match nothing (model ids, paths) are
/// left untouched; an exact spelling wins over a case-folded duplicate.
pub fn canonicalize_keys(value: &mut Value, fields: &[&str]) {
    match value {
        Value::Object(map) => {
            let renames: Vec<(String, &str)> = map
                .keys()
                .filter(|k| !fields.contains(&k.as_str()))
                .filter_map(|k| {
                    fields
                        .iter()
                        .find(|f| f.eq_ignore_ascii_case(k))
                        .map(|f| (k.clone(), *f))
                })
                .collect();

            for (from, to) in renames {
                if let Some(v) = map.remove(&from) {
                    map.entry(to.to_string()).or_insert(v);
                }
            }

            for v in map.values_mut() {
                canonicalize_keys(v, fields);
            }
        }
        Value::Array(items) => {
            for v in items {
                canonicalize_keys(v, fields);
            }
        }
        _ => {}
    }
}

#[cfg(windows)]
fn open_shared(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_SHARE_READ: u32 = 0x1;
    const FILE_SHARE_WRITE: u32 = 0x2;
    const FILE_SHARE_DELETE: u32 = 0x4;

    std::fs::OpenOptions::new()
        .read(true)
        .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
        .open(path)
}

#[cfg(not(windows))]
fn open_shared(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().read(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_keys_nested() {
        let mut value = json!({
            "DailyActivity": [{"DATE": "2025-01-01", "messagecount": 3}],
            "modelUsage": {"claude-opus-4-6": {"InputTokens": 10}}
        });
        canonicalize_keys(
            &mut value,
            &["dailyActivity", "date", "messageCount", "modelUsage", "inputTokens"],
        );

        assert_eq!(value["dailyActivity"][0]["date"], "2025-01-01");
        assert_eq!(value["dailyActivity"][0]["messageCount"], 3);
        assert_eq!(value["modelUsage"]["claude-opus-4-6"]["inputTokens"], 10);
    }

    #[test]
    fn test_canonicalize_keeps_exact_spelling() {
        let mut value = json!({"totalMessages": 1, "TOTALMESSAGES": 2});
        canonicalize_keys(&mut value, &["totalMessages"]);
        assert_eq!(value, json!({"totalMessages": 1}));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_shared("/definitely/not/here.json").await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_read_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = read_json_value(&path).await.unwrap_err();
        assert!(matches!(err, Error::SourceMalformed { .. }));
    }
}
