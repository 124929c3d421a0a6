//! Telegram API credentials from a flat `KEY=VALUE` file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: String,
    /// Path of the grammers session file.
    pub session_path: Option<PathBuf>,
}

/// Lines without `=` or starting with `#` are ignored. The `#` must be the
/// first character; an indented `#` is part of the key. Split on the first `=`,
/// trim both sides, strip one pair of surrounding double quotes.
pub fn parse_env_lines(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter(|line| line.contains('=') && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), strip_quotes(v.trim()).to_string()))
        .collect()
}

fn strip_quotes(v: &str) -> &str {
    v.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v)
}

impl Credentials {
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, DomainError> {
        let api_id = vars
            .get("TELEGRAM_API_ID")
            .ok_or_else(|| DomainError::Credentials("TELEGRAM_API_ID is missing".into()))?
            .parse::<i32>()
            .map_err(|e| DomainError::Credentials(format!("TELEGRAM_API_ID: {}", e)))?;
        let api_hash = vars
            .get("TELEGRAM_API_HASH")
            .filter(|h| !h.is_empty())
            .cloned()
            .ok_or_else(|| DomainError::Credentials("TELEGRAM_API_HASH is missing".into()))?;
        let session_path = vars
            .get("TELEGRAM_SESSION")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Ok(Self {
            api_id,
            api_hash,
            session_path,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, DomainError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DomainError::Credentials(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_map(&parse_env_lines(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_lines() {
        let vars = parse_env_lines(
            "# comment\nTELEGRAM_API_ID = 12345\nTELEGRAM_API_HASH=\"abc=def\"\nnoise line\n\n",
        );
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["TELEGRAM_API_ID"], "12345");
        assert_eq!(vars["TELEGRAM_API_HASH"], "abc=def");
    }

    #[test]
    fn test_only_unindented_hash_is_a_comment() {
        let vars = parse_env_lines("#A=1\n  #B=2\n\tC = 3 ");
        assert_eq!(vars.len(), 2);
        assert!(!vars.contains_key("#A"));
        assert_eq!(vars["#B"], "2");
        assert_eq!(vars["C"], "3");
    }

    #[test]
    fn test_only_one_quote_layer_is_stripped() {
        let vars = parse_env_lines("K=\"\"x\"\"");
        assert_eq!(vars["K"], "\"x\"");
    }

    #[test]
    fn test_from_map_requires_keys() {
        let vars = parse_env_lines("TELEGRAM_API_ID=1");
        assert!(matches!(
            Credentials::from_map(&vars),
            Err(DomainError::Credentials(_))
        ));

        let vars = parse_env_lines("TELEGRAM_API_ID=1\nTELEGRAM_API_HASH=h\nTELEGRAM_SESSION=s.db");
        let creds = Credentials::from_map(&vars).unwrap();
        assert_eq!(creds.api_id, 1);
        assert_eq!(creds.session_path, Some(PathBuf::from("s.db")));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Credentials::load(&dir.path().join("none.env")).await;
        assert!(err.is_err());
    }
}
