use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use hal_api::auth::AppState;

/// Background task that deletes expired market reports and their images.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep_reports(&state).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: removed {} expired market reports", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

async fn sweep_reports(state: &AppState) -> anyhow::Result<usize> {
    let db = state.db.clone();
    let expired = tokio::task::spawn_blocking(move || db.sweep_expired_reports(Utc::now())).await??;
    for image in expired.iter().filter_map(|r| r.image.as_ref()) {
        state.uploads.delete_by_url(&image.url).await;
    }
    Ok(expired.len())
}
