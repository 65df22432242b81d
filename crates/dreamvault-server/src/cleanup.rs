use std::time::Duration;

use tracing::{info, warn};

use dreamvault_api::AppState;

/// Background task that deletes expired share links.
pub async fn run_share_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db_state = state.clone();
        let pruned = tokio::task::spawn_blocking(move || {
            if !db_state.db.table_exists("dream_shares") {
                return Ok(0);
            }
            db_state.db.prune_expired_shares(chrono::Utc::now())
        })
        .await;

        match pruned {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => info!("Cleanup: pruned {} expired shares", count),
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
