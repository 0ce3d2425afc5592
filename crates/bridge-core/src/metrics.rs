use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct BridgeMetrics {
    pub devices_connected: IntGauge,
    pub devices_known: IntGauge,
    pub events_received: IntCounter,
    pub events_unknown: IntCounter,
    pub commands_sent: IntCounter,
    pub command_failures: IntCounter,
    pub polls_executed: IntCounter,
    pub poll_failures: IntCounter,
    pub reconnects_scheduled: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub bridge: BridgeMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let bridge = BridgeMetrics {
            devices_connected: IntGauge::new(
                "bridge_devices_connected",
                "Devices with an open cloud session",
            )?,
            devices_known: IntGauge::new("bridge_devices_known", "Devices listed at login")?,
            events_received: IntCounter::new(
                "bridge_events_received",
                "Push events received from devices",
            )?,
            events_unknown: IntCounter::new(
                "bridge_events_unknown",
                "Push events with an unrecognized namespace",
            )?,
            commands_sent: IntCounter::new("bridge_commands_sent", "Control commands acknowledged")?,
            command_failures: IntCounter::new(
                "bridge_command_failures",
                "Control commands that failed",
            )?,
            polls_executed: IntCounter::new("bridge_polls_executed", "Metering polls fired")?,
            poll_failures: IntCounter::new("bridge_poll_failures", "Metering polls that failed")?,
            reconnects_scheduled: IntCounter::new(
                "bridge_reconnects_scheduled",
                "Reconnect attempts scheduled",
            )?,
        };
        registry.register(Box::new(bridge.devices_connected.clone()))?;
        registry.register(Box::new(bridge.devices_known.clone()))?;
        registry.register(Box::new(bridge.events_received.clone()))?;
        registry.register(Box::new(bridge.events_unknown.clone()))?;
        registry.register(Box::new(bridge.commands_sent.clone()))?;
        registry.register(Box::new(bridge.command_failures.clone()))?;
        registry.register(Box::new(bridge.polls_executed.clone()))?;
        registry.register(Box::new(bridge.poll_failures.clone()))?;
        registry.register(Box::new(bridge.reconnects_scheduled.clone()))?;
        Ok(Self { registry, bridge })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_lists_bridge_metrics() {
        let hub = MetricsHub::new().unwrap();
        hub.bridge.commands_sent.inc();
        hub.bridge.devices_connected.set(2);
        let text = hub.encode_text();
        assert!(text.contains("bridge_commands_sent 1"));
        assert!(text.contains("bridge_devices_connected 2"));
        assert!(text.contains("bridge_reconnects_scheduled 0"));
    }
}
