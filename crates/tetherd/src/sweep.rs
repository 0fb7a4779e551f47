//! Periodic eviction of stalled chunk sets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use tether_services::Bridge;

/// Run the reassembly sweep every `sweep_interval_ms` until shutdown.
pub async fn sweep_loop(bridge: Arc<Bridge>, mut shutdown: broadcast::Receiver<()>) {
    let period = Duration::from_millis(bridge.limits().sweep_interval_ms);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = bridge.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, open = bridge.store.len(), "evicted stale chunk sets");
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("sweep loop stopping");
                break;
            }
        }
    }
}
