use plantlink::{BridgeBuilder, BridgeConfig, Command, SubmitError, ThresholdState};

fn unreachable_config() -> BridgeConfig {
    BridgeConfig {
        port: "/dev/plantlink-test-no-such-port".to_string(),
        reconnect_interval_secs: 60,
        sync_period_secs: 3600,
        ..BridgeConfig::default()
    }
}

/// With no device attached the bridge must still come up: commands fail fast
/// with `TransportUnavailable`, snapshots answer, subscriptions work.
#[tokio::test]
async fn test_degraded_mode_surface() {
    let handle = BridgeBuilder::new(unreachable_config()).spawn();

    let state = handle.connection_state();
    assert!(!state.open);
    assert!(state.last_error.is_some());

    assert_eq!(handle.current_thresholds(), ThresholdState::default());

    let result = handle.submit(Command::RequestLogs).await;
    assert!(matches!(result, Err(SubmitError::TransportUnavailable)));

    let mut events = handle.subscribe();
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    handle.shutdown().await;
}

/// Dropping the last handle must stop both background tasks; the broadcast
/// channel closing proves the read loop exited.
#[tokio::test]
async fn test_dropping_handles_stops_background_tasks() {
    let handle = BridgeBuilder::new(unreachable_config()).spawn();
    let mut events = handle.subscribe();
    drop(handle);

    let closed = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv()).await;
    assert!(matches!(
        closed,
        Ok(Err(tokio::sync::broadcast::error::RecvError::Closed))
    ));
}

#[tokio::test]
async fn test_convenience_commands_map_to_submit() {
    let handle = BridgeBuilder::new(unreachable_config()).spawn();

    for result in [
        handle
            .set_threshold(plantlink::ThresholdKind::Moisture, 512)
            .await,
        handle.request_logs().await,
        handle.clear_logs().await,
        handle
            .request_threshold(plantlink::ThresholdKind::Light)
            .await,
    ] {
        assert!(matches!(result, Err(SubmitError::TransportUnavailable)));
    }

    handle.shutdown().await;
}
