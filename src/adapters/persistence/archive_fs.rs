//! Implements ArchiveStore: `<base>/<YYYY-MM-DD>/<channel>.json`.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use super::json_file::{read_json, write_json_atomic};
use crate::domain::entities::clean_channel;
use crate::domain::{DomainError, Snapshot};
use crate::ports::{ArchiveEntry, ArchiveStore};

pub struct FsArchiveStore {
    base_dir: PathBuf,
}

impl FsArchiveStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, channel: &str, date: &str) -> PathBuf {
        self.base_dir
            .join(date)
            .join(format!("{}.json", clean_channel(channel)))
    }

    async fn read_dir_names(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>, DomainError> {
        let mut rd = match fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::Archive(e.to_string())),
        };
        let mut out = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| DomainError::Archive(e.to_string()))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| DomainError::Archive(e.to_string()))?
                .is_dir();
            out.push((
                entry.file_name().to_string_lossy().into_owned(),
                entry.path(),
                is_dir,
            ));
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn write(
        &self,
        channel: &str,
        date: &str,
        snapshot: &Snapshot,
    ) -> Result<PathBuf, DomainError> {
        let path = self.file_path(channel, date);
        write_json_atomic(&path, snapshot, DomainError::Archive).await?;
        info!(path = %path.display(), channel, date, "archived snapshot");
        Ok(path)
    }

    async fn read(&self, channel: &str, date: &str) -> Result<Option<Snapshot>, DomainError> {
        read_json(&self.file_path(channel, date), DomainError::Archive).await
    }

    async fn list(&self, channel: Option<&str>) -> Result<Vec<ArchiveEntry>, DomainError> {
        let wanted = channel.map(clean_channel);
        let mut out = Vec::new();
        for (date, date_path, is_dir) in Self::read_dir_names(&self.base_dir).await? {
            if !is_dir {
                continue;
            }
            for (name, path, is_dir) in Self::read_dir_names(&date_path).await? {
                let Some(file_channel) = name.strip_suffix(".json") else {
                    continue;
                };
                if is_dir || wanted.as_deref().is_some_and(|w| w != file_channel) {
                    continue;
                }
                let size = fs::metadata(&path)
                    .await
                    .map_err(|e| DomainError::Archive(e.to_string()))?
                    .len();
                out.push(ArchiveEntry {
                    date: date.clone(),
                    channel: file_channel.to_string(),
                    path,
                    size,
                });
            }
        }
        out.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.channel.cmp(&b.channel)));
        Ok(out)
    }

    async fn dates(&self) -> Result<Vec<String>, DomainError> {
        let mut dates: Vec<String> = Self::read_dir_names(&self.base_dir)
            .await?
            .into_iter()
            .filter(|(_, _, is_dir)| *is_dir)
            .map(|(name, _, _)| name)
            .collect();
        dates.sort();
        Ok(dates)
    }

    async fn remove_date(&self, date: &str) -> Result<(), DomainError> {
        let dir = self.base_dir.join(date);
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| DomainError::Archive(format!("remove {}: {}", dir.display(), e)))?;
        info!(date, "removed archive date");
        Ok(())
    }
}
