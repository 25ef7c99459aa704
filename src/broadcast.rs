//! Background tasks that keep time-driven state moving.

use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Watch for countdown expiry once per second so `complete` fires close to
/// on-time even when no client traffic is flowing.
pub fn spawn_timer_watcher(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            state.check_timer_expiry().await;
        }
    });
}

/// Flip players to disconnected once their heartbeat goes quiet.
pub fn spawn_presence_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            state.sweep_presence().await;
        }
    });
}
