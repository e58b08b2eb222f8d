use std::time::{Duration, Instant};

use plantlink::protocol::{BridgeEvent, DecodeState, LineDecoder};

/// Full session against the public decoder surface: sensor traffic, a log
/// dump, a transport drop, and a clean restart.
#[test]
fn test_decode_session() {
    let mut decoder = LineDecoder::new(Duration::from_secs(3));
    let now = Instant::now();

    let events = decoder.handle_line("m300l700", now);
    assert!(matches!(events[0], BridgeEvent::SensorUpdated(_)));

    decoder.handle_line("LOGS_BEGIN", now);
    decoder.handle_line("1000,3,17", now);
    decoder.handle_line("1060,3,18", now);

    let events = decoder.notify_transport_lost("device unplugged");
    let mut log_flushes = 0;
    let mut transport_errors = 0;
    for event in &events {
        match event {
            BridgeEvent::LogDataReady { entries } => {
                log_flushes += 1;
                assert_eq!(entries.len(), 2);
            }
            BridgeEvent::TransportError { .. } => transport_errors += 1,
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(log_flushes, 1);
    assert_eq!(transport_errors, 1);

    // After reconnect the machine is back in Normal with no residue
    assert_eq!(decoder.state(), DecodeState::Normal);
    let events = decoder.handle_line("m1l2", now);
    assert!(matches!(events[0], BridgeEvent::SensorUpdated(_)));
}

#[test]
fn test_sensor_lines_do_not_report_thresholds() {
    let mut decoder = LineDecoder::new(Duration::from_secs(3));
    for line in ["m0l0", "m1023l1023", "m5l9"] {
        let events = decoder.handle_line(line, Instant::now());
        assert_eq!(events.len(), 1);
        assert!(
            matches!(events[0], BridgeEvent::SensorUpdated(_)),
            "line {} misclassified as {:?}",
            line,
            events[0]
        );
    }
}
