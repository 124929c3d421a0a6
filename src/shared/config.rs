//! Application configuration. Paths, timezone, validation policy.

use chrono::FixedOffset;
use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::DomainError;

pub const DEFAULT_DATA_DIR: &str = "./telegram_cache";
pub const DEFAULT_TZ_OFFSET_HOURS: i32 = 3;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Snapshot directory. Read from TG_CACHE_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Where verification reports go. Defaults to `<data_dir>/verification`.
    #[serde(default)]
    pub verification_dir: Option<String>,

    /// Where boundary media is downloaded. Defaults to `<data_dir>/media`.
    #[serde(default)]
    pub media_dir: Option<String>,

    /// Flat KEY=VALUE credentials file. Read from TG_CACHE_CREDENTIALS_PATH.
    #[serde(default)]
    pub credentials_path: Option<String>,

    /// Fixed offset (hours east of UTC) used for `date_msk` and date selectors.
    #[serde(default)]
    pub tz_offset_hours: Option<i32>,

    /// Optional delay in ms between history requests in paged fetches. Read from EXPORT_DELAY_MS.
    #[serde(default)]
    pub export_delay_ms: Option<u64>,

    // ─────────────────────────────────────────────────────────────────────────
    // Validation policy
    // ─────────────────────────────────────────────────────────────────────────
    /// Gaps up to this size are treated as deleted posts.
    #[serde(default)]
    pub deletion_threshold: Option<i64>,

    /// Largest significant gap a sequence may contain and still be valid.
    #[serde(default)]
    pub max_gap_size: Option<i64>,

    /// Fewer messages than this cannot be judged for gaps.
    #[serde(default)]
    pub min_sequence_length: Option<usize>,

    /// Messages sampled by the content verifier.
    #[serde(default)]
    pub sample_size: Option<usize>,

    /// Bounded retries of the filter's border auto-fetch.
    #[serde(default)]
    pub border_max_retries: Option<u32>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("TG_CACHE"));
        if let Ok(path) = std::env::var("TG_CACHE_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        let mut cfg: Self = c.build()?.try_deserialize()?;
        // EXPORT_DELAY_MS is read directly (no prefix) so .env can use EXPORT_DELAY_MS=500
        if let Ok(s) = std::env::var("EXPORT_DELAY_MS") {
            if let Ok(ms) = s.parse::<u64>() {
                cfg.export_delay_ms = Some(ms);
            }
        }
        Ok(cfg)
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR))
    }

    pub fn verification_dir_or_default(&self) -> PathBuf {
        self.verification_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("verification"))
    }

    pub fn media_dir_or_default(&self) -> PathBuf {
        self.media_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("media"))
    }

    pub fn credentials_path_or_default(&self) -> PathBuf {
        PathBuf::from(self.credentials_path.as_deref().unwrap_or("./.env"))
    }

    /// The configured fixed offset. Out-of-range hours are a config error.
    pub fn tz_offset(&self) -> Result<FixedOffset, DomainError> {
        let hours = self.tz_offset_hours.unwrap_or(DEFAULT_TZ_OFFSET_HOURS);
        FixedOffset::east_opt(hours * 3600)
            .ok_or_else(|| DomainError::Config(format!("tz_offset_hours out of range: {}", hours)))
    }

    pub fn deletion_threshold_or_default(&self) -> i64 {
        self.deletion_threshold.unwrap_or(5)
    }

    pub fn max_gap_size_or_default(&self) -> i64 {
        self.max_gap_size.unwrap_or(100)
    }

    pub fn min_sequence_length_or_default(&self) -> usize {
        self.min_sequence_length.unwrap_or(10)
    }

    pub fn sample_size_or_default(&self) -> usize {
        self.sample_size.unwrap_or(10)
    }

    pub fn border_max_retries_or_default(&self) -> u32 {
        self.border_max_retries.unwrap_or(1)
    }

    pub fn export_delay_ms_or_default(&self) -> u64 {
        self.export_delay_ms.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.data_dir_or_default(), PathBuf::from("./telegram_cache"));
        assert_eq!(
            cfg.verification_dir_or_default(),
            PathBuf::from("./telegram_cache/verification")
        );
        assert_eq!(cfg.tz_offset().unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(cfg.deletion_threshold_or_default(), 5);
        assert_eq!(cfg.max_gap_size_or_default(), 100);
        assert_eq!(cfg.min_sequence_length_or_default(), 10);
        assert_eq!(cfg.sample_size_or_default(), 10);
        assert_eq!(cfg.border_max_retries_or_default(), 1);
    }

    #[test]
    fn test_tz_offset_out_of_range() {
        let cfg = AppConfig {
            tz_offset_hours: Some(30),
            ..Default::default()
        };
        assert!(cfg.tz_offset().is_err());
    }
}
