use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::sleep;

use crate::config::BridgeConfig;
use crate::protocol::{BridgeEvent, LineDecoder, ThresholdState};
use crate::serial::{ConnectionState, SerialInterface};

// Cap on the partial-line buffer; a device spewing garbage without newlines
// must not grow it unbounded.
const PARTIAL_BUFFER_LIMIT: usize = 8192;

/// Read/decode loop. Feeds lines into the decoder, fans events out, owns the
/// threshold state, and supervises reconnection on a fixed interval.
pub(crate) async fn reader_task(
    interface: Arc<Mutex<SerialInterface>>,
    config: BridgeConfig,
    events_tx: broadcast::Sender<BridgeEvent>,
    thresholds_tx: watch::Sender<ThresholdState>,
    connection_tx: Arc<watch::Sender<ConnectionState>>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut decoder = LineDecoder::new(config.capture_timeout());
    let mut thresholds = ThresholdState::default();
    let mut partial = String::new();
    let mut was_connected = false;

    loop {
        let connected = { interface.lock().await.is_connected() };
        if !connected {
            if was_connected {
                // The writer closed the port under us; finish the decoder's
                // bookkeeping here since the read branch never saw the error
                was_connected = false;
                partial.clear();
                let reason = connection_tx
                    .borrow()
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "connection lost".to_string());
                for event in decoder.notify_transport_lost(&reason) {
                    apply_event(event, &events_tx, &thresholds_tx, &mut thresholds);
                }
            }
            // Degraded mode: keep retrying on the fixed interval, never busy-loop
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = sleep(config.reconnect_interval()) => {
                    let mut guard = interface.lock().await;
                    match guard.connect(&config.port) {
                        Ok(()) => {
                            partial.clear();
                            let _ = connection_tx.send(ConnectionState::opened());
                        }
                        Err(e) => {
                            log::debug!("Reconnect attempt on {} failed: {}", config.port, e);
                        }
                    }
                }
            }
            continue;
        }
        was_connected = true;

        tokio::select! {
            _ = stop_rx.recv() => break,
            read_res = async {
                let mut buf = [0u8; 512];
                let res = {
                    let mut guard = interface.lock().await;
                    guard.read_data(&mut buf, config.read_timeout_ms).await
                };
                res.map(|n| (buf, n))
            } => {
                match read_res {
                    Ok((buf, n)) if n > 0 => {
                        match std::str::from_utf8(&buf[..n]) {
                            Ok(chunk) => {
                                partial.push_str(chunk);
                                drain_lines(
                                    &mut partial,
                                    &mut decoder,
                                    &events_tx,
                                    &thresholds_tx,
                                    &mut thresholds,
                                );
                            }
                            Err(_) => {
                                // Undecodable bytes never reach the state
                                // machine; framing is suspect so the partial
                                // buffer goes too
                                partial.clear();
                                apply_event(
                                    BridgeEvent::DecodeError {
                                        line: String::from_utf8_lossy(&buf[..n]).into_owned(),
                                        reason: "invalid utf-8".to_string(),
                                    },
                                    &events_tx,
                                    &thresholds_tx,
                                    &mut thresholds,
                                );
                            }
                        }
                        for event in decoder.poll(Instant::now()) {
                            apply_event(event, &events_tx, &thresholds_tx, &mut thresholds);
                        }
                        if partial.len() > PARTIAL_BUFFER_LIMIT {
                            log::warn!("Partial line buffer overflow, trimming");
                            let mut keep = partial.len() - PARTIAL_BUFFER_LIMIT / 2;
                            while !partial.is_char_boundary(keep) {
                                keep += 1;
                            }
                            partial = partial.split_off(keep);
                        }
                    }
                    Ok(_) => {
                        // Quiet tick
                        for event in decoder.poll(Instant::now()) {
                            apply_event(event, &events_tx, &thresholds_tx, &mut thresholds);
                        }
                    }
                    Err(e) => {
                        let message = e.to_string();
                        log::warn!("Serial read failed: {}", message);
                        {
                            interface.lock().await.disconnect();
                        }
                        partial.clear();
                        for event in decoder.notify_transport_lost(&message) {
                            apply_event(event, &events_tx, &thresholds_tx, &mut thresholds);
                        }
                        let _ = connection_tx.send(ConnectionState::closed(message));
                        was_connected = false;
                    }
                }
            }
        }
    }

    log::info!("Bridge read loop stopped");
}

/// Pull every complete line out of the partial buffer and run it through the
/// decoder.
fn drain_lines(
    partial: &mut String,
    decoder: &mut LineDecoder,
    events_tx: &broadcast::Sender<BridgeEvent>,
    thresholds_tx: &watch::Sender<ThresholdState>,
    thresholds: &mut ThresholdState,
) {
    while let Some(pos) = partial.find(['\n', '\r']) {
        let line: String = partial.drain(..=pos).collect();
        for event in decoder.handle_line(&line, Instant::now()) {
            apply_event(event, events_tx, thresholds_tx, thresholds);
        }
    }
}

/// Publish one event, folding confirmed threshold reports into the owned
/// state and its watch snapshot first.
fn apply_event(
    event: BridgeEvent,
    events_tx: &broadcast::Sender<BridgeEvent>,
    thresholds_tx: &watch::Sender<ThresholdState>,
    thresholds: &mut ThresholdState,
) {
    if let BridgeEvent::ThresholdUpdated { kind, value } = &event {
        thresholds.set(*kind, *value);
        let _ = thresholds_tx.send(*thresholds);
    }
    // A send error only means nobody is subscribed right now
    let _ = events_tx.send(event);
}
