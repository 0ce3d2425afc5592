use async_trait::async_trait;
use bridge_core::{Bridge, BridgeConfig, BridgeError, ConnectionState};
use cloud_transport::{
    CloudClient, DeviceCommand, DeviceDef, DeviceSession, DiscoveredDevice, MockCloud, MockDevice,
    SessionEvent, TransportError,
};
use device_registry::PointValue;
use parking_lot::Mutex;
use serde_json::Value;
use state_store::{MemoryStore, PointAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Harness {
    bridge: Bridge,
    cloud: Arc<MockCloud>,
    store: Arc<MemoryStore>,
}

fn harness(cloud: MockCloud) -> Harness {
    let cloud = Arc::new(cloud);
    let store = Arc::new(MemoryStore::new());
    let bridge = Bridge::new(BridgeConfig::default(), cloud.clone(), store.clone()).unwrap();
    Harness {
        bridge,
        cloud,
        store,
    }
}

async fn settle_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn connection(store: &MemoryStore) -> Option<PointValue> {
    store.value(&PointAddress::new("info", "connection"))
}

#[tokio::test(start_paused = true)]
async fn devices_are_published_after_login() {
    let cloud = MockCloud::new();
    cloud.add_device(MockDevice::plug("plug"));
    cloud.add_device(MockDevice::power_strip("strip"));
    let mut h = harness(cloud);

    assert_eq!(h.bridge.start().await.unwrap(), 2);
    h.bridge.wait_initialized().await;

    let plug = h.bridge.snapshot("plug").await.unwrap();
    assert_eq!(plug.state, ConnectionState::Connected);
    assert_eq!(plug.name, "Smart plug");
    assert_eq!(plug.points["0-power"], PointValue::Number(27.84));
    assert_eq!(plug.points["online"], PointValue::Bool(true));
    assert!(plug.poll_pending);

    let strip = h.bridge.snapshot("strip").await.unwrap();
    assert_eq!(strip.points.len(), 6);
    assert!(!strip.poll_pending);

    assert_eq!(connection(&h.store), Some(PointValue::Bool(true)));
    assert_eq!(h.bridge.metrics().bridge.devices_connected.get(), 2);
    assert_eq!(h.bridge.metrics().bridge.devices_known.get(), 2);
    h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn external_write_reaches_device_and_triggers_repoll() {
    let cloud = MockCloud::new();
    let plug = cloud.add_device(MockDevice::plug("plug"));
    let mut h = harness(cloud);
    h.bridge.start().await.unwrap();
    h.bridge.wait_initialized().await;
    let store = h.store.clone();
    settle_until(|| store.has_subscriber()).await;
    assert_eq!(plug.electricity_queries(), 1);

    let switch = PointAddress::new("plug", "0-switch");
    assert!(h.store.write(&switch, PointValue::Bool(true)).await.unwrap());
    settle_until(|| !plug.commands().is_empty()).await;
    assert_eq!(plug.commands(), vec![DeviceCommand::Toggle { onoff: 1 }]);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(plug.electricity_queries(), 2);
    h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn garage_write_marks_door_as_working() {
    let cloud = MockCloud::new();
    let garage = cloud.add_device(MockDevice::garage_opener("garage"));
    let mut h = harness(cloud);
    h.bridge.start().await.unwrap();
    h.bridge.wait_initialized().await;

    let handle = h.bridge.registry().get("garage").unwrap();
    let outcome = handle.write("0-garageDoor", PointValue::Bool(true)).await.unwrap();
    assert_eq!(outcome.updated, ["0-garageDoorWorking"]);
    assert!(!outcome.repoll);
    assert_eq!(
        garage.commands(),
        vec![DeviceCommand::GarageDoor { channel: 0, open: 1 }]
    );

    let snap = h.bridge.snapshot("garage").await.unwrap();
    assert_eq!(snap.points["0-garageDoorWorking"], PointValue::Bool(true));
    assert!(!snap.points.contains_key("0-switch"));

    let err = handle.write("0-garageDoorWorking", PointValue::Bool(false)).await.unwrap_err();
    assert!(matches!(err, BridgeError::ReadOnlyPoint { .. }));
    h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn metering_is_polled_on_the_steady_interval() {
    let cloud = MockCloud::new();
    let plug = cloud.add_device(MockDevice::plug("plug"));
    let mut h = harness(cloud);
    h.bridge.start().await.unwrap();
    h.bridge.wait_initialized().await;

    plug.set_electricity(serde_json::json!({
        "electricity": { "channel": 0, "current": 500, "voltage": 2300, "power": 115000 }
    }));
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(plug.electricity_queries(), 2);
    let snap = h.bridge.snapshot("plug").await.unwrap();
    assert_eq!(snap.points["0-power"], PointValue::Number(115.0));
    assert_eq!(snap.points["0-current"], PointValue::Number(0.5));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(plug.electricity_queries(), 3);
    h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn closed_device_reconnects_after_backoff() {
    let cloud = MockCloud::new();
    let plug = cloud.add_device(MockDevice::plug("plug"));
    let mut h = harness(cloud);
    h.bridge.start().await.unwrap();
    h.bridge.wait_initialized().await;

    assert!(plug.emit(SessionEvent::Closed(Some("connection lost".into()))));
    let snap = loop {
        let snap = h.bridge.snapshot("plug").await.unwrap();
        if snap.state == ConnectionState::Disconnected {
            break snap;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert!(snap.reconnect_pending);
    assert!(!snap.poll_pending);
    assert_eq!(snap.points["online"], PointValue::Bool(false));
    assert_eq!(connection(&h.store), Some(PointValue::Bool(false)));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(plug.connect_calls(), 2);
    let snap = h.bridge.snapshot("plug").await.unwrap();
    assert_eq!(snap.state, ConnectionState::Connected);
    assert!(snap.poll_pending);
    assert_eq!(connection(&h.store), Some(PointValue::Bool(true)));
    h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unreachable_device_does_not_block_initialization() {
    let cloud = MockCloud::new();
    let broken = cloud.add_device(MockDevice::plug("broken"));
    broken.fail_connect(true);
    cloud.add_device(MockDevice::power_strip("strip"));
    let mut h = harness(cloud);
    h.bridge.start().await.unwrap();
    h.bridge.wait_initialized().await;

    let snap = h.bridge.snapshot("broken").await.unwrap();
    assert_eq!(snap.state, ConnectionState::Erroring);
    assert!(snap.reconnect_pending);
    assert!(snap.points.is_empty());
    assert_eq!(
        h.bridge.snapshot("strip").await.unwrap().state,
        ConnectionState::Connected
    );
    h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unsupported_device_initializes_without_points() {
    let cloud = MockCloud::new();
    cloud.add_device(MockDevice::new("odd").with_abilities(&["Appliance.Control.Spray"]));
    let mut h = harness(cloud);
    h.bridge.start().await.unwrap();
    h.bridge.wait_initialized().await;

    let snap = h.bridge.snapshot("odd").await.unwrap();
    assert_eq!(snap.state, ConnectionState::Connected);
    assert_eq!(snap.points.keys().collect::<Vec<_>>(), ["online"]);
    assert_eq!(h.store.device_name("odd").as_deref(), Some("Device odd"));
    h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_aborts_startup() {
    let mut h = harness(MockCloud::rejecting_credentials());
    let err = h.bridge.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::Authentication(_)));
    assert!(h.bridge.registry().is_empty());
    assert_eq!(connection(&h.store), Some(PointValue::Bool(false)));
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_and_never_reconnects() {
    let cloud = MockCloud::new();
    let plug = cloud.add_device(MockDevice::plug("plug"));
    let mut h = harness(cloud);
    h.bridge.start().await.unwrap();
    h.bridge.wait_initialized().await;

    h.bridge.shutdown().await;
    assert_eq!(plug.disconnect_calls(), 1);
    assert!(!plug.is_connected());
    assert_eq!(connection(&h.store), Some(PointValue::Bool(false)));
    assert!(h.bridge.context().is_stopped());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(plug.connect_calls(), 1);
    assert_eq!(h.bridge.metrics().bridge.reconnects_scheduled.get(), 0);
    assert!(h.cloud.session("plug").is_some());

    h.bridge.shutdown().await;
    assert_eq!(plug.disconnect_calls(), 1);
}

/// Session whose connect call panics, standing in for a transport bug.
struct PanickingSession {
    device_id: String,
}

#[async_trait]
impl DeviceSession for PanickingSession {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn connect(&self) -> cloud_transport::Result<()> {
        panic!("transport bug");
    }

    async fn disconnect(&self, _force: bool) -> cloud_transport::Result<()> {
        Ok(())
    }

    async fn system_abilities(&self) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }

    async fn system_all_data(&self) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }

    async fn online_status(&self) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }

    async fn control_electricity(&self) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }

    async fn control_toggle(&self, _onoff: u8) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }

    async fn control_togglex(&self, _channel: u32, _onoff: u8) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }

    async fn control_garage_door(&self, _channel: u32, _open: u8) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }

    async fn control_light(&self, _light: Value) -> cloud_transport::Result<Value> {
        Err(TransportError::NotConnected(self.device_id.clone()))
    }
}

/// Wraps the mock cloud: optionally adds extra devices to the login result
/// and optionally never finishes `disconnect_all`.
struct WrappedCloud {
    inner: Arc<MockCloud>,
    extra: Mutex<Vec<DiscoveredDevice>>,
    hang_on_disconnect: bool,
}

#[async_trait]
impl CloudClient for WrappedCloud {
    async fn login(&self) -> cloud_transport::Result<Vec<DiscoveredDevice>> {
        let mut devices = self.inner.login().await?;
        devices.append(&mut self.extra.lock());
        Ok(devices)
    }

    async fn disconnect_all(&self, force: bool) {
        if self.hang_on_disconnect {
            std::future::pending::<()>().await;
        }
        self.inner.disconnect_all(force).await;
    }
}

fn panicking_device(uuid: &str) -> DiscoveredDevice {
    let (_tx, events) = mpsc::channel(1);
    DiscoveredDevice {
        def: DeviceDef {
            uuid: uuid.to_string(),
            ..Default::default()
        },
        session: Arc::new(PanickingSession {
            device_id: uuid.to_string(),
        }),
        events,
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_device_task_does_not_block_initialization() {
    let inner = Arc::new(MockCloud::new());
    let plug = inner.add_device(MockDevice::plug("plug"));
    let cloud = Arc::new(WrappedCloud {
        inner,
        extra: Mutex::new(vec![panicking_device("faulty")]),
        hang_on_disconnect: false,
    });
    let store = Arc::new(MemoryStore::new());
    let mut bridge = Bridge::new(BridgeConfig::default(), cloud, store.clone()).unwrap();
    assert_eq!(bridge.start().await.unwrap(), 2);

    timeout(Duration::from_secs(60), bridge.wait_initialized())
        .await
        .unwrap();
    let err = timeout(Duration::from_secs(60), bridge.wait_fatal())
        .await
        .unwrap();
    assert!(matches!(err, BridgeError::TaskFailed(msg) if msg.contains("transport bug")));

    let writes = store.clone();
    settle_until(|| writes.has_subscriber()).await;
    let switch = PointAddress::new("plug", "0-switch");
    assert!(store.write(&switch, PointValue::Bool(true)).await.unwrap());
    settle_until(|| !plug.commands().is_empty()).await;

    bridge.shutdown().await;
    assert_eq!(plug.disconnect_calls(), 1);
    assert_eq!(connection(&store), Some(PointValue::Bool(false)));
}

#[tokio::test(start_paused = true)]
async fn shutdown_returns_when_transport_disconnect_hangs() {
    let inner = Arc::new(MockCloud::new());
    let plug = inner.add_device(MockDevice::plug("plug"));
    let cloud = Arc::new(WrappedCloud {
        inner,
        extra: Mutex::new(Vec::new()),
        hang_on_disconnect: true,
    });
    let store = Arc::new(MemoryStore::new());
    let mut bridge = Bridge::new(BridgeConfig::default(), cloud, store.clone()).unwrap();
    bridge.start().await.unwrap();
    bridge.wait_initialized().await;

    timeout(Duration::from_secs(30), bridge.shutdown())
        .await
        .unwrap();
    assert!(bridge.context().is_stopped());
    assert_eq!(plug.disconnect_calls(), 0);
    assert_eq!(connection(&store), Some(PointValue::Bool(false)));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(plug.connect_calls(), 1);
    assert_eq!(bridge.metrics().bridge.reconnects_scheduled.get(), 0);
}
