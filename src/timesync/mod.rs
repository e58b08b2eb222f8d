use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};

use crate::bridge::handle::write_command;
use crate::protocol::Command;
use crate::serial::{ConnectionState, SerialInterface};

#[derive(Debug, thiserror::Error)]
pub enum TimeSyncError {
    #[error("Time source unavailable: {0}")]
    SourceUnavailable(String),
}

/// External clock the scheduler syncs the device against. Hosts plug in an
/// NTP-backed implementation; failures fall back to the local wall clock.
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn unix_time(&self) -> Result<i64, TimeSyncError>;
}

/// Local wall clock. Never fails; also the fallback for every other source.
pub struct SystemTimeSource;

#[async_trait]
impl TimeSource for SystemTimeSource {
    async fn unix_time(&self) -> Result<i64, TimeSyncError> {
        Ok(Utc::now().timestamp())
    }
}

/// Resolve the timestamp for the next clock sync. A failing source degrades
/// to local time rather than skipping the sync.
pub async fn resolve_sync_time(source: &dyn TimeSource, tz_offset_hours: i32) -> i64 {
    let base = match source.unix_time().await {
        Ok(t) => t,
        Err(e) => {
            log::warn!("{}, falling back to system clock", e);
            Utc::now().timestamp()
        }
    };
    base + i64::from(tz_offset_hours) * 3600
}

/// Periodic clock sync toward the device. A tick that cannot submit (dead
/// link) is logged and waits for the next tick; there is no inner retry.
pub(crate) async fn sync_task(
    interface: Arc<Mutex<SerialInterface>>,
    connection_tx: Arc<watch::Sender<ConnectionState>>,
    source: Arc<dyn TimeSource>,
    period: Duration,
    tz_offset_hours: i32,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first interval tick fires immediately: one sync at startup, then
    // one per period.
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = ticker.tick() => {
                let timestamp = resolve_sync_time(source.as_ref(), tz_offset_hours).await;
                match write_command(&interface, &connection_tx, Command::SetClock(timestamp)).await {
                    Ok(()) => log::info!("Synced device clock to {}", timestamp),
                    Err(e) => log::warn!("Time sync skipped: {}", e),
                }
            }
        }
    }
}
