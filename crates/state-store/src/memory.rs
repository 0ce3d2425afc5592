use crate::{ExternalWrite, PointAddress, Result, StateStore, StoreError, StoredState};
use async_trait::async_trait;
use device_registry::{PointMeta, PointValue};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, trace};

const WRITE_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    meta: PointMeta,
    state: Option<StoredState>,
    sets: usize,
}

#[derive(Default)]
struct Inner {
    devices: BTreeMap<String, String>,
    points: BTreeMap<PointAddress, Entry>,
    writes: Option<mpsc::Sender<ExternalWrite>>,
}

/// In-memory store. `write` plays the part of a user changing a point.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an external write. Returns whether a subscriber received it.
    pub async fn write(&self, address: &PointAddress, value: PointValue) -> Result<bool> {
        let subscriber = {
            let mut inner = self.inner.lock();
            let entry = inner
                .points
                .get_mut(address)
                .ok_or_else(|| StoreError::UnknownPoint(address.to_string()))?;
            if !entry.meta.write {
                return Err(StoreError::ReadOnly(address.to_string()));
            }
            check_type(address, &entry.meta, &value)?;
            entry.state = Some(StoredState {
                value: value.clone(),
                ack: false,
                ts: OffsetDateTime::now_utc(),
            });
            inner.writes.clone()
        };
        let Some(tx) = subscriber else {
            debug!(point = %address, "external write without subscriber");
            return Ok(false);
        };
        tx.send(ExternalWrite {
            address: address.clone(),
            value,
        })
        .await
        .map_err(|_| StoreError::Closed)?;
        Ok(true)
    }

    pub fn device_name(&self, device_id: &str) -> Option<String> {
        self.inner.lock().devices.get(device_id).cloned()
    }

    pub fn value(&self, address: &PointAddress) -> Option<PointValue> {
        self.state(address).map(|s| s.value)
    }

    pub fn state(&self, address: &PointAddress) -> Option<StoredState> {
        self.inner
            .lock()
            .points
            .get(address)
            .and_then(|e| e.state.clone())
    }

    pub fn meta(&self, address: &PointAddress) -> Option<PointMeta> {
        self.inner.lock().points.get(address).map(|e| e.meta.clone())
    }

    /// Point ids of one device, sorted.
    pub fn point_ids(&self, device_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .points
            .keys()
            .filter(|a| a.device_id == device_id)
            .map(|a| a.point_id.clone())
            .collect()
    }

    /// Number of `set_value` calls seen for a point.
    pub fn set_count(&self, address: &PointAddress) -> usize {
        self.inner
            .lock()
            .points
            .get(address)
            .map_or(0, |e| e.sets)
    }

    pub fn has_subscriber(&self) -> bool {
        self.inner.lock().writes.is_some()
    }
}

fn check_type(address: &PointAddress, meta: &PointMeta, value: &PointValue) -> Result<()> {
    if value.value_type() == meta.value_type {
        Ok(())
    } else {
        Err(StoreError::TypeMismatch {
            address: address.to_string(),
            expected: meta.value_type,
            got: value.value_type(),
        })
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn ensure_device(&self, device_id: &str, name: &str) -> Result<()> {
        self.inner
            .lock()
            .devices
            .insert(device_id.to_string(), name.to_string());
        Ok(())
    }

    async fn create_or_update_point(
        &self,
        address: &PointAddress,
        meta: PointMeta,
        initial: Option<PointValue>,
    ) -> Result<()> {
        if let Some(value) = &initial {
            check_type(address, &meta, value)?;
        }
        let mut inner = self.inner.lock();
        let entry = inner
            .points
            .entry(address.clone())
            .and_modify(|e| e.meta = meta.clone())
            .or_insert_with(|| Entry {
                meta,
                state: None,
                sets: 0,
            });
        if let Some(value) = initial {
            entry.state = Some(StoredState {
                value,
                ack: true,
                ts: OffsetDateTime::now_utc(),
            });
        }
        Ok(())
    }

    async fn set_value(&self, address: &PointAddress, value: PointValue, ack: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .points
            .get_mut(address)
            .ok_or_else(|| StoreError::UnknownPoint(address.to_string()))?;
        check_type(address, &entry.meta, &value)?;
        trace!(point = %address, %value, ack, "set value");
        entry.sets += 1;
        entry.state = Some(StoredState {
            value,
            ack,
            ts: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    fn subscribe_writes(&self) -> mpsc::Receiver<ExternalWrite> {
        let (tx, rx) = mpsc::channel(WRITE_BUFFER);
        self.inner.lock().writes = Some(tx);
        rx
    }
}
