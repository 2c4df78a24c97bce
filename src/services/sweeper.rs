//! Background task that fails extraction attempts left in flight.
//!
//! An attempt whose process died never settles its file. Once the attempt is
//! older than the configured window the file is marked `failed`, which makes
//! it eligible for a new attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::db::PipelineStore;
use crate::error::{AppError, AppResult};

/// Message stored on files failed by the sweeper.
pub const TIMED_OUT_MESSAGE: &str = "Extraction attempt timed out";

/// Configuration for the sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Attempts without progress for longer than this are failed
    pub stale_after: Duration,
    /// How often to sweep
    pub interval: Duration,
}

/// Start the sweeper background task.
pub fn start_sweeper_task(store: Arc<dyn PipelineStore>, config: SweeperConfig) {
    tokio::spawn(async move {
        info!(
            "Starting stale attempt sweeper (window: {}s, interval: {}s)",
            config.stale_after.as_secs(),
            config.interval.as_secs()
        );

        let mut ticker = interval(config.interval);

        loop {
            ticker.tick().await;

            if let Err(e) = sweep_once(store.as_ref(), config.stale_after).await {
                error!("Sweeper error: {}", e);
            }
        }
    });
}

/// Run a single sweep. Returns the number of attempts failed.
pub async fn sweep_once(store: &dyn PipelineStore, stale_after: Duration) -> AppResult<u64> {
    let window = chrono::Duration::from_std(stale_after)
        .map_err(|e| AppError::InvalidInput(format!("Invalid sweep window: {}", e)))?;
    let cutoff = Utc::now() - window;

    let failed = store.fail_stale_attempts(cutoff, TIMED_OUT_MESSAGE).await?;
    if failed > 0 {
        info!("Failed {} stale extraction attempt(s)", failed);
    }

    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{FileStatus, UploadedFile};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_fails_only_stale_attempts() {
        let store = MemoryStore::new();
        let tenant = Uuid::now_v7();
        let now = Utc::now();

        let mut ids = Vec::new();
        for _ in 0..2 {
            let file = UploadedFile {
                id: Uuid::now_v7(),
                tenant_id: tenant,
                uploaded_by: "user-1".to_string(),
                original_filename: "a.pdf".to_string(),
                storage_path: "k".to_string(),
                mime_type: "application/pdf".to_string(),
                size_bytes: 1,
                content_sha256: "00".to_string(),
                status: FileStatus::Uploaded,
                error_message: None,
                attempt: 0,
                progress: 0,
                progress_message: None,
                created_at: now,
                updated_at: now,
            };
            store.insert_file(&file).await.unwrap();
            store.begin_attempt(tenant, file.id).await.unwrap().unwrap();
            ids.push(file.id);
        }
        store.backdate_file(ids[0], now - chrono::Duration::minutes(30));

        let failed = sweep_once(&store, Duration::from_secs(15 * 60)).await.unwrap();
        assert_eq!(failed, 1);

        let stale = store.get_file(tenant, ids[0]).await.unwrap().unwrap();
        assert_eq!(stale.status, FileStatus::Failed);
        assert_eq!(stale.error_message.as_deref(), Some(TIMED_OUT_MESSAGE));
        assert!(stale.status.accepts_new_attempt());

        let fresh = store.get_file(tenant, ids[1]).await.unwrap().unwrap();
        assert_eq!(fresh.status, FileStatus::Parsed);
    }
}
