//! Filesystem persistence: snapshots, anchors, daily archive, reports, OCR cache.

pub mod anchors_json;
pub mod archive_fs;
pub mod json_file;
pub mod ocr_cache;
pub mod report_fs;
pub mod snapshot_fs;

pub use anchors_json::AnchorsJson;
pub use archive_fs::FsArchiveStore;
pub use ocr_cache::OcrCache;
pub use report_fs::FsReportStore;
pub use snapshot_fs::FsSnapshotStore;
