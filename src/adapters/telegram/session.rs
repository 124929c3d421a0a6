//! Session management. Open the grammers session and build an authorized client.
//!
//! Uses grammers-session's SqliteSession for persistent file-based storage. The
//! session must already be authorized; this tool never runs a login flow.

use std::path::Path;
use std::sync::Arc;

use grammers_client::Client;
use grammers_session::storages::SqliteSession;
use tracing::info;

use crate::domain::DomainError;
use crate::shared::credentials::Credentials;

pub const DEFAULT_SESSION_PATH: &str = "./tg_cache.session";

/// Opens a persistent session storage at the given path.
///
/// The file is created if it does not exist. Parent directories are created as needed.
pub async fn open_file_session(path: impl AsRef<Path>) -> Result<SqliteSession, DomainError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DomainError::Credentials(format!("create session directory: {}", e)))?;
    }
    SqliteSession::open(path)
        .await
        .map_err(|e| DomainError::Credentials(format!("open session file: {}", e)))
}

/// Connect with the stored session and check it is authorized.
pub async fn connect(creds: &Credentials) -> Result<Client, DomainError> {
    let session_path = creds
        .session_path
        .clone()
        .unwrap_or_else(|| DEFAULT_SESSION_PATH.into());
    let session = Arc::new(open_file_session(&session_path).await?);
    let pool = grammers_client::SenderPool::new(session, creds.api_id);
    let handle = pool.handle.clone();
    tokio::spawn(async move {
        pool.runner.run().await;
    });
    let client = Client::new(handle);

    let authorized = client
        .is_authorized()
        .await
        .map_err(|e| DomainError::Gateway(e.to_string()))?;
    if !authorized {
        return Err(DomainError::Credentials(format!(
            "session {} is not authorized",
            session_path.display()
        )));
    }
    info!(session = %session_path.display(), "telegram session ready");
    Ok(client)
}
