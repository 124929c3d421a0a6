//! Pretty JSON files written with the write-replace pattern.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::DomainError;

/// Atomic save:
/// 1. Write to `<path>.tmp`
/// 2. sync_all() to flush to disk
/// 3. Rename over the target
///
/// `err` picks the DomainError variant for the calling store.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    err: fn(String) -> DomainError,
) -> Result<(), DomainError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| err(format!("create dir {}: {}", parent.display(), e)))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| err(e.to_string()))?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = std::path::PathBuf::from(temp_name);
    let mut f = fs::File::create(&temp_path)
        .await
        .map_err(|e| err(format!("create temp file: {}", e)))?;
    f.write_all(json.as_bytes())
        .await
        .map_err(|e| err(format!("write temp file: {}", e)))?;
    f.sync_all()
        .await
        .map_err(|e| err(format!("sync temp file: {}", e)))?;
    drop(f);

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| err(format!("atomic rename failed: {}", e)))?;
    Ok(())
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(
    path: &Path,
    err: fn(String) -> DomainError,
) -> Result<Option<T>, DomainError> {
    let content = match fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(err(format!("read {}: {}", path.display(), e))),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| err(format!("corrupt JSON in {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("a.json");
        let mut value = BTreeMap::new();
        value.insert("k".to_string(), 1);
        write_json_atomic(&path, &value, DomainError::Store).await.unwrap();

        assert!(!dir.path().join("nested").join("a.json.tmp").exists());
        let back: Option<BTreeMap<String, i32>> =
            read_json(&path, DomainError::Store).await.unwrap();
        assert_eq!(back, Some(value));
    }

    #[tokio::test]
    async fn test_read_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<i32> = read_json(&dir.path().join("none.json"), DomainError::Store)
            .await
            .unwrap();
        assert!(missing.is_none());

        let bad = dir.path().join("bad.json");
        tokio::fs::write(&bad, "{not json").await.unwrap();
        let res: Result<Option<i32>, _> = read_json(&bad, DomainError::Store).await;
        assert!(matches!(res, Err(DomainError::Store(_))));
    }
}
