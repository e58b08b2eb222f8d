use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex};

use super::{reader::reader_task, SubmitError};
use crate::config::BridgeConfig;
use crate::protocol::{BridgeEvent, Command, ThresholdKind, ThresholdState};
use crate::serial::{ConnectionState, SerialInterface};
use crate::timesync::{sync_task, SystemTimeSource, TimeSource};

/// Assembles a bridge and spawns its background tasks.
pub struct BridgeBuilder {
    config: BridgeConfig,
    time_source: Arc<dyn TimeSource>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            time_source: Arc::new(SystemTimeSource),
        }
    }

    /// Replace the default wall-clock source, e.g. with an NTP-backed one.
    pub fn with_time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.time_source = source;
        self
    }

    /// Open the port and start the read loop and time-sync scheduler.
    ///
    /// A failed initial open is not fatal: the bridge starts in degraded mode
    /// where `submit` fails fast and the read loop keeps retrying the port on
    /// its reconnect interval. Both background tasks stop when every handle
    /// is dropped or `shutdown` is called.
    pub fn spawn(self) -> BridgeHandle {
        let mut interface = SerialInterface::new(self.config.baud_rate);
        let initial_state = match interface.connect(&self.config.port) {
            Ok(()) => ConnectionState::opened(),
            Err(e) => {
                log::warn!(
                    "Could not open {} at startup, running degraded: {}",
                    self.config.port,
                    e
                );
                ConnectionState::closed(e.to_string())
            }
        };

        let interface = Arc::new(Mutex::new(interface));
        let (events_tx, _) = broadcast::channel(self.config.event_capacity);
        let (thresholds_tx, thresholds_rx) = watch::channel(ThresholdState::default());
        let (connection_tx, connection_rx) = watch::channel(initial_state);
        let connection_tx = Arc::new(connection_tx);
        let (reader_stop_tx, reader_stop_rx) = mpsc::channel(1);
        let (sync_stop_tx, sync_stop_rx) = mpsc::channel(1);

        tokio::spawn(reader_task(
            interface.clone(),
            self.config.clone(),
            events_tx.clone(),
            thresholds_tx,
            connection_tx.clone(),
            reader_stop_rx,
        ));

        // The scheduler gets the raw write path, not a handle clone, so the
        // stop senders live only in user-facing handles
        tokio::spawn(sync_task(
            interface.clone(),
            connection_tx.clone(),
            self.time_source,
            self.config.sync_period(),
            self.config.tz_offset_hours,
            sync_stop_rx,
        ));

        BridgeHandle {
            interface,
            events_tx,
            thresholds_rx,
            connection_rx,
            connection_tx,
            reader_stop_tx,
            sync_stop_tx,
        }
    }
}

/// Encode and write one command over the shared interface.
///
/// A write I/O failure marks the transport closed and publishes the state
/// change, so the read loop's reconnect branch takes over; the caller only
/// sees the typed error.
pub(crate) async fn write_command(
    interface: &Mutex<SerialInterface>,
    connection_tx: &watch::Sender<ConnectionState>,
    command: Command,
) -> Result<(), SubmitError> {
    let line = command.encode();
    let mut guard = interface.lock().await;
    if !guard.is_connected() {
        return Err(SubmitError::TransportUnavailable);
    }
    if let Err(e) = guard.send_data(line.as_bytes()).await {
        log::warn!("Serial write failed: {}", e);
        guard.disconnect();
        let _ = connection_tx.send(ConnectionState::closed(e.to_string()));
        return Err(SubmitError::Write(e));
    }
    Ok(())
}

/// Subscriber-facing surface of the bridge: event fan-out, threshold and
/// connection snapshots, and command submission.
///
/// Cheap to clone; all clones share the one serial endpoint.
#[derive(Clone)]
pub struct BridgeHandle {
    interface: Arc<Mutex<SerialInterface>>,
    events_tx: broadcast::Sender<BridgeEvent>,
    thresholds_rx: watch::Receiver<ThresholdState>,
    connection_rx: watch::Receiver<ConnectionState>,
    connection_tx: Arc<watch::Sender<ConnectionState>>,
    reader_stop_tx: mpsc::Sender<()>,
    sync_stop_tx: mpsc::Sender<()>,
}

impl BridgeHandle {
    /// Subscribe to the decoded event stream. Dispatch is bounded: a slow
    /// subscriber lags and drops old events instead of stalling the decoder.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events_tx.subscribe()
    }

    /// Last device-confirmed thresholds, for subscribers that connect between
    /// device reports.
    pub fn current_thresholds(&self) -> ThresholdState {
        *self.thresholds_rx.borrow()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_rx.borrow().clone()
    }

    /// Encode and write one command. No automatic retry; the error tells the
    /// caller whether the link was missing or the write itself failed.
    pub async fn submit(&self, command: Command) -> Result<(), SubmitError> {
        write_command(&self.interface, &self.connection_tx, command).await
    }

    pub async fn set_threshold(&self, kind: ThresholdKind, value: u16) -> Result<(), SubmitError> {
        let command = match kind {
            ThresholdKind::Moisture => Command::SetMoistureThreshold(value),
            ThresholdKind::Light => Command::SetLightThreshold(value),
        };
        self.submit(command).await
    }

    pub async fn request_threshold(&self, kind: ThresholdKind) -> Result<(), SubmitError> {
        self.submit(Command::RequestThreshold(kind)).await
    }

    pub async fn request_logs(&self) -> Result<(), SubmitError> {
        self.submit(Command::RequestLogs).await
    }

    pub async fn clear_logs(&self) -> Result<(), SubmitError> {
        self.submit(Command::ClearLogs).await
    }

    /// Stop the read loop and scheduler and close the port.
    pub async fn shutdown(&self) {
        let _ = self.sync_stop_tx.send(()).await;
        let _ = self.reader_stop_tx.send(()).await;
        self.interface.lock().await.disconnect();
    }
}
