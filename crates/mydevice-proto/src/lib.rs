//! Device-Plugin Protocol Definitions
//!
//! This crate contains the Protocol Buffer definitions for the device-plugin
//! protocol spoken between the node agent and resource plugins, plus the
//! well-known constants of that protocol (API version, socket locations,
//! device health strings).

pub mod pb {
    tonic::include_proto!("deviceplugin");
}

pub use pb::{
    AllocateRequest, AllocateResponse, ContainerAllocateRequest, ContainerAllocateResponse,
    ContainerPreferredAllocationRequest, ContainerPreferredAllocationResponse, Device, DeviceSpec,
    DevicePluginOptions, Empty, ListAndWatchResponse, Mount, PreStartContainerRequest,
    PreStartContainerResponse, PreferredAllocationRequest, PreferredAllocationResponse,
    RegisterRequest,
};

pub use pb::device_plugin_client::DevicePluginClient;
pub use pb::device_plugin_server::{DevicePlugin, DevicePluginServer};
pub use pb::registration_client::RegistrationClient;
pub use pb::registration_server::{Registration, RegistrationServer};

/// API version sent in [`RegisterRequest`]; the node agent rejects any other.
pub const API_VERSION: &str = "v1beta1";

/// Directory the node agent scans for plugin endpoints.
pub const DEVICE_PLUGIN_PATH: &str = "/var/lib/kubelet/device-plugins";

/// The node agent's own registration socket.
pub const KUBELET_SOCKET: &str = "/var/lib/kubelet/device-plugins/kubelet.sock";

/// Wire value for a device that can be allocated.
pub const HEALTHY: &str = "Healthy";

/// Wire value for a device that must not be allocated.
pub const UNHEALTHY: &str = "Unhealthy";
