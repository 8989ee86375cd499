//! Background sweep of expired leases.
//!
//! Leases expire on their own; the sweep only keeps the lock table small
//! and makes reclaimed counts visible in the logs.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::lock_manager::LockManager;

/// Spawn the lease sweeper, ticking every `interval` until `cancel` fires.
#[must_use]
pub fn spawn_lock_sweeper(
    locks: LockManager,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("lock sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = locks.cleanup_expired().await {
                        error!(%err, "lock sweep failed");
                    }
                }
            }
        }
    })
}
