use crate::{
    namespace, ChannelDef, CloudClient, DeviceCommand, DeviceDef, DeviceSession,
    DiscoveredDevice, Result, SessionEvent, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

/// Canned responses for one simulated device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub def: DeviceDef,
    pub abilities: Vec<String>,
    pub all_data: Value,
    pub electricity: Value,
    pub online_status: i64,
}

impl MockDevice {
    pub fn new(uuid: &str) -> Self {
        Self {
            def: DeviceDef {
                uuid: uuid.to_string(),
                ..Default::default()
            },
            abilities: Vec::new(),
            all_data: json!({ "all": { "system": {}, "digest": {} } }),
            electricity: json!({
                "electricity": { "channel": 0, "current": 0, "voltage": 0, "power": 0 }
            }),
            online_status: 1,
        }
    }

    /// Single-relay plug with metering.
    pub fn plug(uuid: &str) -> Self {
        Self::new(uuid)
            .named("Smart plug")
            .with_abilities(&[namespace::TOGGLE, namespace::ELECTRICITY])
            .with_all_data(json!({
                "all": {
                    "system": { "firmware": { "innerIp": "192.168.1.40" } },
                    "control": { "toggle": { "onoff": 0, "lmTime": 1542311107 } }
                }
            }))
            .with_electricity(json!({
                "electricity": { "channel": 0, "current": 120, "voltage": 2331, "power": 27840 }
            }))
    }

    /// Five-channel power strip without metering.
    pub fn power_strip(uuid: &str) -> Self {
        let togglex: Vec<Value> = (0..5)
            .map(|ch| json!({ "channel": ch, "onoff": 0, "lmTime": 1542037296 }))
            .collect();
        Self::new(uuid)
            .named("Power strip")
            .with_channels(&["", "Socket 1", "Socket 2", "Socket 3", "USB"])
            .with_abilities(&[namespace::TOGGLEX])
            .with_all_data(json!({ "all": { "system": {}, "digest": { "togglex": togglex } } }))
    }

    pub fn garage_opener(uuid: &str) -> Self {
        Self::new(uuid)
            .named("Garage")
            .with_abilities(&[namespace::TOGGLEX, namespace::GARAGE_DOOR_STATE])
            .with_all_data(json!({
                "all": {
                    "system": {},
                    "digest": {
                        "togglex": [{ "channel": 0, "onoff": 0 }],
                        "garageDoor": [{ "channel": 0, "open": 0, "lmTime": 1559850976 }]
                    }
                }
            }))
    }

    pub fn bulb(uuid: &str) -> Self {
        Self::new(uuid)
            .named("Bulb")
            .with_abilities(&[namespace::LIGHT])
            .with_all_data(json!({
                "all": {
                    "system": {},
                    "digest": {
                        "light": {
                            "capacity": 6, "channel": 0, "rgb": 127,
                            "temperature": 80, "luminance": 100
                        }
                    }
                }
            }))
    }

    pub fn named(mut self, name: &str) -> Self {
        self.def.dev_name = name.to_string();
        self
    }

    pub fn with_channels(mut self, names: &[&str]) -> Self {
        self.def.channels = names
            .iter()
            .map(|n| ChannelDef {
                dev_name: (!n.is_empty()).then(|| n.to_string()),
                kind: None,
            })
            .collect();
        self
    }

    pub fn with_abilities(mut self, abilities: &[&str]) -> Self {
        self.abilities = abilities.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_all_data(mut self, all_data: Value) -> Self {
        self.all_data = all_data;
        self
    }

    pub fn with_electricity(mut self, electricity: Value) -> Self {
        self.electricity = electricity;
        self
    }

    fn abilities_payload(&self) -> Value {
        let ability: Map<String, Value> = self
            .abilities
            .iter()
            .map(|a| (a.clone(), json!({})))
            .collect();
        json!({ "ability": ability })
    }
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    connect_calls: u32,
    disconnect_calls: u32,
    electricity_queries: u32,
    commands: Vec<DeviceCommand>,
    fail_connect: bool,
    fail_commands: bool,
    fail_electricity: bool,
    fail_abilities: bool,
}

/// In-process device session. Records every command and request it receives.
pub struct MockSession {
    device_id: String,
    fixture: Mutex<MockDevice>,
    state: Mutex<MockState>,
    events: mpsc::Sender<SessionEvent>,
}

impl MockSession {
    pub fn new(device: MockDevice) -> (Arc<Self>, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let session = Arc::new(Self {
            device_id: device.def.uuid.clone(),
            fixture: Mutex::new(device),
            state: Mutex::new(MockState::default()),
            events: tx,
        });
        (session, rx)
    }

    /// Push an event as if it came from the cloud. Returns false if nobody listens.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.events.try_send(event).is_ok()
    }

    pub fn emit_data(&self, namespace: &str, payload: Value) -> bool {
        self.emit(SessionEvent::Data {
            namespace: namespace.to_string(),
            payload,
        })
    }

    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.state.lock().commands.clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().disconnect_calls
    }

    pub fn electricity_queries(&self) -> u32 {
        self.state.lock().electricity_queries
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn fail_commands(&self, fail: bool) {
        self.state.lock().fail_commands = fail;
    }

    pub fn fail_electricity(&self, fail: bool) {
        self.state.lock().fail_electricity = fail;
    }

    pub fn fail_abilities(&self, fail: bool) {
        self.state.lock().fail_abilities = fail;
    }

    pub fn set_electricity(&self, electricity: Value) {
        self.fixture.lock().electricity = electricity;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected(self.device_id.clone()))
        }
    }

    fn record(&self, command: DeviceCommand) -> Result<()> {
        self.ensure_connected()?;
        let mut state = self.state.lock();
        if state.fail_commands {
            return Err(TransportError::Rejected(format!(
                "{} refused {}",
                self.device_id,
                command.namespace()
            )));
        }
        tracing::trace!(device = %self.device_id, payload = %command.payload(), "mock command");
        state.commands.push(command);
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            if state.fail_connect {
                return Err(TransportError::Io("connection refused".into()));
            }
            state.connected = true;
        }
        self.emit(SessionEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self, _force: bool) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.disconnect_calls += 1;
            state.connected = false;
        }
        self.emit(SessionEvent::Closed(Some("disconnected".into())));
        Ok(())
    }

    async fn system_abilities(&self) -> Result<Value> {
        self.ensure_connected()?;
        if self.state.lock().fail_abilities {
            return Err(TransportError::Timeout);
        }
        Ok(self.fixture.lock().abilities_payload())
    }

    async fn system_all_data(&self) -> Result<Value> {
        self.ensure_connected()?;
        Ok(self.fixture.lock().all_data.clone())
    }

    async fn online_status(&self) -> Result<Value> {
        self.ensure_connected()?;
        let status = self.fixture.lock().online_status;
        Ok(json!({ "online": { "status": status } }))
    }

    async fn control_electricity(&self) -> Result<Value> {
        self.ensure_connected()?;
        let mut state = self.state.lock();
        state.electricity_queries += 1;
        if state.fail_electricity {
            return Err(TransportError::Timeout);
        }
        Ok(self.fixture.lock().electricity.clone())
    }

    async fn control_toggle(&self, onoff: u8) -> Result<Value> {
        self.record(DeviceCommand::Toggle { onoff })?;
        Ok(json!({}))
    }

    async fn control_togglex(&self, channel: u32, onoff: u8) -> Result<Value> {
        self.record(DeviceCommand::ToggleX { channel, onoff })?;
        Ok(json!({}))
    }

    async fn control_garage_door(&self, channel: u32, open: u8) -> Result<Value> {
        self.record(DeviceCommand::GarageDoor { channel, open })?;
        let lm_time = OffsetDateTime::now_utc().unix_timestamp();
        Ok(json!({
            "state": { "channel": channel, "open": open, "execute": 1, "lmTime": lm_time }
        }))
    }

    async fn control_light(&self, light: Value) -> Result<Value> {
        let field = |name: &str| light.get(name).and_then(Value::as_u64);
        let command = DeviceCommand::Light {
            channel: field("channel").unwrap_or(0) as u32,
            capacity: field("capacity").unwrap_or(0) as u8,
            rgb: field("rgb").map(|v| v as u32),
            temperature: field("temperature").map(|v| v as u8),
            luminance: field("luminance").map(|v| v as u8),
        };
        self.record(command)?;
        Ok(json!({}))
    }
}

/// In-process cloud account holding a fixed set of mock devices.
pub struct MockCloud {
    accept_credentials: bool,
    pending: Mutex<Vec<DiscoveredDevice>>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            accept_credentials: true,
            pending: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// A cloud whose login always fails authentication.
    pub fn rejecting_credentials() -> Self {
        Self {
            accept_credentials: false,
            ..Self::new()
        }
    }

    pub fn add_device(&self, device: MockDevice) -> Arc<MockSession> {
        let def = device.def.clone();
        let (session, events) = MockSession::new(device);
        self.pending.lock().push(DiscoveredDevice {
            def,
            session: session.clone(),
            events,
        });
        self.sessions.lock().push(session.clone());
        session
    }

    pub fn session(&self, device_id: &str) -> Option<Arc<MockSession>> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.device_id == device_id)
            .cloned()
    }
}

#[async_trait]
impl CloudClient for MockCloud {
    async fn login(&self) -> Result<Vec<DiscoveredDevice>> {
        if !self.accept_credentials {
            return Err(TransportError::Authentication(
                "invalid email or password".into(),
            ));
        }
        Ok(std::mem::take(&mut *self.pending.lock()))
    }

    async fn disconnect_all(&self, force: bool) {
        let sessions = self.sessions.lock().clone();
        for session in sessions {
            if let Err(e) = session.disconnect(force).await {
                tracing::debug!(device = %session.device_id, error = %e, "mock disconnect failed");
            }
        }
    }
}
