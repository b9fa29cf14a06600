//! Device inventory
//!
//! Snapshots are immutable values published by swap through a watch
//! channel. Readers (the inventory stream, allocation) either see the old
//! snapshot or the new one, never a partially updated device set, and a
//! new subscriber always observes the current snapshot before any change.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Health of a single device as reported to the node agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    Healthy,
    Unhealthy,
}

impl Health {
    /// Wire value expected by the node agent.
    pub fn as_str(self) -> &'static str {
        match self {
            Health::Healthy => mydevice_proto::HEALTHY,
            Health::Unhealthy => mydevice_proto::UNHEALTHY,
        }
    }
}

/// One allocatable instance of the resource.
///
/// The id is stable for as long as the device is reported healthy; the
/// node agent hands the same id back in Allocate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub health: Health,
}

impl Device {
    pub fn healthy(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            health: Health::Healthy,
        }
    }
}

/// Immutable view of the advertised device set at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub revision: u64,
    pub devices: Vec<Device>,
}

impl DeviceSnapshot {
    pub fn contains(&self, id: &str) -> bool {
        self.devices.iter().any(|d| d.id == id)
    }

    /// Proto form sent on the inventory stream.
    pub fn to_wire(&self) -> Vec<mydevice_proto::Device> {
        self.devices
            .iter()
            .map(|d| mydevice_proto::Device {
                id: d.id.clone(),
                health: d.health.as_str().to_string(),
            })
            .collect()
    }
}

/// Source of device snapshots.
///
/// The streaming and allocation logic only ever talk to this trait, so a
/// real detector can replace [`StaticDeviceSource`] without touching them.
pub trait DeviceSource: Send + Sync {
    /// The snapshot the node agent should currently believe in.
    fn current(&self) -> DeviceSnapshot;

    /// Receiver that holds the current snapshot and is notified on every
    /// replacement. Late subscribers see the full inventory first.
    fn subscribe(&self) -> watch::Receiver<DeviceSnapshot>;
}

/// Device source with a fixed set, replaced only wholesale.
pub struct StaticDeviceSource {
    tx: watch::Sender<DeviceSnapshot>,
}

impl StaticDeviceSource {
    pub fn new(devices: Vec<Device>) -> Self {
        let (tx, _rx) = watch::channel(DeviceSnapshot {
            revision: 0,
            devices,
        });
        Self { tx }
    }

    /// The reference inventory: a single healthy `dev1`.
    pub fn single_default() -> Self {
        Self::new(vec![Device::healthy("dev1")])
    }

    /// Publish a new device set, replacing the previous snapshot.
    pub fn replace(&self, devices: Vec<Device>) {
        let revision = self.tx.borrow().revision + 1;
        self.tx.send_replace(DeviceSnapshot { revision, devices });
    }
}

impl DeviceSource for StaticDeviceSource {
    fn current(&self) -> DeviceSnapshot {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.tx.subscribe()
    }
}
