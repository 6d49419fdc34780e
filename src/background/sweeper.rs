use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info};

use crate::state::SharedState;

pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// Periodically drop spent sign-in codes and idle rate-limiter keys.
pub async fn run(state: SharedState, every: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = interval(every);

    loop {
        tokio::select! {
            _ = ticker.tick() => sweep_once(&state),
            _ = shutdown_rx.recv() => {
                info!("sweeper: shutdown signal received");
                break;
            }
        }
    }
}

fn sweep_once(state: &SharedState) {
    state.otp_limiter.cleanup();
    match crate::auth::otp::purge_stale(&state.db) {
        Ok(0) => {}
        Ok(n) => tracing::debug!("sweeper: removed {} stale sign-in codes", n),
        Err(e) => error!("sweeper: failed to purge sign-in codes: {}", e),
    }
}
