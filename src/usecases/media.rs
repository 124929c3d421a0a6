//! Media download and content hashing for verified messages.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::domain::{ChannelRef, DomainError, MediaInfo};
use crate::ports::ChatGateway;
use crate::shared::clock::LocalClock;

const READ_CHUNK: usize = 4096;

/// SHA-256 of a file as lowercase hex.
pub async fn hash_file(path: &Path) -> Result<String, DomainError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DomainError::Media(format!("open {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| DomainError::Media(e.to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Download the media of `message_id` under `media_dir` and describe it.
/// A failed download is logged and yields `None`.
pub async fn download_with_hash(
    gateway: &dyn ChatGateway,
    channel: &ChannelRef,
    message_id: i32,
    media_dir: &Path,
    clock: &LocalClock,
) -> Option<MediaInfo> {
    match try_download(gateway, channel, message_id, media_dir, clock).await {
        Ok(info) => info,
        Err(e) => {
            warn!(message_id, error = %e, "media download failed");
            None
        }
    }
}

async fn try_download(
    gateway: &dyn ChatGateway,
    channel: &ChannelRef,
    message_id: i32,
    media_dir: &Path,
    clock: &LocalClock,
) -> Result<Option<MediaInfo>, DomainError> {
    let Some(path) = gateway.download_media(channel, message_id, media_dir).await? else {
        return Ok(None);
    };
    let content_hash = hash_file(&path).await?;
    let file_size = tokio::fs::metadata(&path)
        .await
        .map_err(|e| DomainError::Media(e.to_string()))?
        .len();
    debug!(message_id, path = %path.display(), "media downloaded");
    Ok(Some(MediaInfo {
        file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        file_path: path.display().to_string(),
        file_size,
        content_hash,
        download_time: Some(clock.now()),
    }))
}
