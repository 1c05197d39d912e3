//! Capture service driven end-to-end: a worker thread running
//! [`CaptureService`] over a loopback channel, observed through the
//! controller-side connector, with a scripted LED client.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lumo_capture::{settings, CaptureService, Frame, LedClient, LedEndpoint, LedFault, TestPattern};
use lumo_core::{SettingKey, SettingValue, SettingsSnapshot, SettingsStore, STATE_ERROR, STATE_OK};
use lumo_service::{ServiceChannel, ServiceConnector, ServiceError, ServiceRuntime};

// ---------------------------------------------------------------------------
// Scripted LED client
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockInner {
    endpoint: Option<LedEndpoint>,
    connected: bool,
    refuse_connections: bool,
    frames: Vec<(u32, u32, i64)>,
}

/// Shareable LED double: the worker thread owns one handle, the test keeps
/// another to script faults and inspect traffic.
#[derive(Clone, Default)]
struct MockLed(Arc<Mutex<MockInner>>);

impl MockLed {
    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.0.lock().expect("mock led")
    }
}

impl LedClient for MockLed {
    fn configure(&mut self, endpoint: LedEndpoint) {
        self.lock().endpoint = Some(endpoint);
    }

    fn connect(&mut self) -> Result<(), LedFault> {
        let mut inner = self.lock();
        if inner.refuse_connections {
            return Err(LedFault::new("connection refused"));
        }
        inner.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn send_frame(
        &mut self,
        frame: &Frame,
        priority: i64,
        _duration_ms: u64,
    ) -> Result<(), LedFault> {
        self.lock().frames.push((frame.width, frame.height, priority));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn spawn_capture_worker(port: u16, led: MockLed) -> JoinHandle<Result<(), ServiceError>> {
    thread::spawn(move || {
        let channel = ServiceChannel::connect(port)?;
        let store = SettingsStore::with_registry(settings::registry());
        let service = CaptureService::new(led, TestPattern::default());
        ServiceRuntime::with_store(channel, service, store)?
            .with_error_backoff(Duration::from_secs(2))
            .run()
    })
}

fn wait_until(what: &str, timeout: Duration, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

fn snapshot(entries: &[(&str, SettingValue)]) -> SettingsSnapshot {
    entries
        .iter()
        .map(|(key, value)| (SettingKey::from(*key), value.clone()))
        .collect()
}

fn default_snapshot() -> SettingsSnapshot {
    settings::registry().defaults()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn frames_flow_with_configured_geometry_and_priority() {
    let (mut connector, port) = ServiceConnector::bind().expect("bind");
    let led = MockLed::default();
    let worker = spawn_capture_worker(port, led.clone());

    connector.accept().expect("accept");
    connector.start_monitor().expect("monitor");
    assert!(connector.wait_for_update(Some(Duration::from_secs(5))));

    let mut config = default_snapshot();
    config.extend(snapshot(&[
        (settings::SCALE_WIDTH, SettingValue::Int(16)),
        (settings::SCALE_HEIGHT, SettingValue::Int(8)),
        (settings::PRIORITY, SettingValue::Int(50)),
        (settings::FRAME_RATE, SettingValue::Int(100)),
    ]));
    connector.send_settings(&config).expect("send settings");

    wait_until("healthy state", Duration::from_secs(5), || {
        connector.state().value() == Some(STATE_OK)
    });

    connector.send_enable(true).expect("send enable");
    wait_until("frames", Duration::from_secs(5), || {
        led.lock().frames.len() >= 3
    });
    assert!(led.lock().frames.iter().all(|f| *f == (16, 8, 50)));
    assert_eq!(
        led.lock().endpoint,
        Some(LedEndpoint {
            address: "127.0.0.1".into(),
            port: 19445,
        })
    );

    connector.shutdown().expect("shutdown");
    worker.join().expect("join").expect("clean exit");
    assert!(!led.lock().connected, "shutdown must disconnect the client");
}

#[test]
fn endpoint_change_reconnects_with_the_new_address() {
    let (mut connector, port) = ServiceConnector::bind().expect("bind");
    let led = MockLed::default();
    let worker = spawn_capture_worker(port, led.clone());

    connector.accept().expect("accept");
    connector.start_monitor().expect("monitor");
    assert!(connector.wait_for_update(Some(Duration::from_secs(5))));

    connector.send_settings(&default_snapshot()).expect("send settings");
    connector.send_enable(true).expect("send enable");
    wait_until("frames", Duration::from_secs(5), || {
        !led.lock().frames.is_empty()
    });

    let mut moved = default_snapshot();
    moved.extend(snapshot(&[
        (settings::LED_ADDRESS, SettingValue::from("10.0.0.9")),
        (settings::LED_PORT, SettingValue::Int(19446)),
    ]));
    connector.send_settings(&moved).expect("send settings");

    // The next cycle reconfigures: disconnect, new endpoint, reconnect.
    wait_until("new endpoint", Duration::from_secs(5), || {
        led.lock().endpoint
            == Some(LedEndpoint {
                address: "10.0.0.9".into(),
                port: 19446,
            })
    });
    wait_until("reconnected", Duration::from_secs(5), || {
        led.lock().connected
    });

    connector.shutdown().expect("shutdown");
    worker.join().expect("join").expect("clean exit");
}

#[test]
fn refused_connection_surfaces_error_state_then_recovers() {
    let (mut connector, port) = ServiceConnector::bind().expect("bind");
    let led = MockLed::default();
    led.lock().refuse_connections = true;
    let worker = spawn_capture_worker(port, led.clone());

    connector.accept().expect("accept");
    connector.start_monitor().expect("monitor");
    assert!(connector.wait_for_update(Some(Duration::from_secs(5))));

    connector.send_settings(&default_snapshot()).expect("send settings");
    connector.send_enable(true).expect("send enable");

    wait_until("error state", Duration::from_secs(5), || {
        connector.state().value() == Some(STATE_ERROR)
    });
    assert_eq!(connector.state().message(), Some("connection refused"));
    assert!(led.lock().frames.is_empty(), "no frames while disconnected");

    // Downstream comes back; the next retry after the backoff succeeds and
    // the worker reports healthy again.
    led.lock().refuse_connections = false;
    wait_until("recovered state", Duration::from_secs(10), || {
        connector.state().value() == Some(STATE_OK)
    });
    wait_until("frames after recovery", Duration::from_secs(5), || {
        !led.lock().frames.is_empty()
    });

    connector.shutdown().expect("shutdown");
    worker.join().expect("join").expect("clean exit");
}

#[test]
fn disable_stops_frames_and_disconnects() {
    let (mut connector, port) = ServiceConnector::bind().expect("bind");
    let led = MockLed::default();
    let worker = spawn_capture_worker(port, led.clone());

    connector.accept().expect("accept");
    connector.start_monitor().expect("monitor");
    assert!(connector.wait_for_update(Some(Duration::from_secs(5))));

    connector.send_settings(&default_snapshot()).expect("send settings");
    connector.send_enable(true).expect("send enable");
    wait_until("frames", Duration::from_secs(5), || {
        !led.lock().frames.is_empty()
    });

    connector.send_enable(false).expect("send disable");
    wait_until("disabled state", Duration::from_secs(5), || {
        !connector.state().is_enabled()
    });
    wait_until("disconnected", Duration::from_secs(5), || {
        !led.lock().connected
    });

    let settled = led.lock().frames.len();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(led.lock().frames.len(), settled, "frames sent while disabled");

    connector.shutdown().expect("shutdown");
    worker.join().expect("join").expect("clean exit");
}
