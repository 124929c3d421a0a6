//! Implements ReportStore: pretty JSON reports in the verification directory.

use std::path::{Path, PathBuf};

use tracing::info;

use super::json_file::write_json_atomic;
use crate::domain::DomainError;
use crate::ports::ReportStore;

pub struct FsReportStore {
    base_dir: PathBuf,
}

impl FsReportStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl ReportStore for FsReportStore {
    async fn save(
        &self,
        file_name: &str,
        report: &serde_json::Value,
    ) -> Result<PathBuf, DomainError> {
        let path = self.base_dir.join(file_name);
        write_json_atomic(&path, report, DomainError::Report).await?;
        info!(path = %path.display(), "saved report");
        Ok(path)
    }
}
