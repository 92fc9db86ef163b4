use chrono::Utc;
use library::IndexOutcome;
use tracing::{info, warn};

use crate::state::{AppState, IndexStatus};

/// Starts a reindex in the background and returns immediately.
pub fn start_reindex(state: AppState) {
    tokio::spawn(async move {
        run_reindex(state).await;
    });
}

/// Runs one reindex on the blocking pool, records the outcome and drops
/// cached listings once the index has changed.
pub async fn run_reindex(state: AppState) {
    let previous = {
        let mut guard = state.index_status.write();
        let previous = guard.clone();
        *guard = IndexStatus::Running {
            started: Utc::now(),
        };
        previous
    };

    let library = state.library.clone();
    let result = tokio::task::spawn_blocking(move || library.rebuild_index()).await;

    let status = match result {
        Ok(Ok(IndexOutcome::Completed(report))) => {
            state.cache.clear();
            info!(
                "Index ready: {} folders, {} audio files ({} skipped entries, {} failed writes)",
                report.folders, report.audio_files, report.skipped_entries, report.failed_writes
            );
            IndexStatus::Completed {
                finished: Utc::now(),
                report,
            }
        }
        Ok(Ok(IndexOutcome::Skipped { holder })) => {
            // Another process owns the walk; keep showing what we knew before.
            if matches!(previous, IndexStatus::Completed { .. }) {
                previous
            } else {
                IndexStatus::Skipped {
                    at: Utc::now(),
                    holder,
                }
            }
        }
        Ok(Err(err)) => {
            warn!("Reindex failed: {}", err);
            IndexStatus::Failed {
                at: Utc::now(),
                message: err.to_string(),
            }
        }
        Err(err) => {
            warn!("Reindex join error: {}", err);
            IndexStatus::Failed {
                at: Utc::now(),
                message: err.to_string(),
            }
        }
    };
    *state.index_status.write() = status;
}
